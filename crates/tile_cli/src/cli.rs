//! The command-line surface, modeled directly on `EarthCli` in the earth
//! preprocessing binary: a `clap::Parser` struct with required positional
//! paths and `#[arg(short, long, default_value_t = ...)]` flags.

use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tile_core::prelude::ImageFormat;

/// Falls back to 1 if the platform can't report available parallelism.
fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[derive(Parser, Debug)]
#[command(version, about = "Builds a zoomable tile pyramid from a world directory")]
pub struct Cli {
    /// Directory containing `r.<rx>.<ry>/c.<chunkx>.<chunky>.png` chunk images.
    #[arg(required = true)]
    pub world_dir: PathBuf,
    /// Site root the tile tree (and `config.js`) is written under.
    #[arg(required = true)]
    pub dest_dir: PathBuf,

    /// Force a specific quadtree depth instead of deriving it from the world bounds.
    #[arg(long)]
    pub depth: Option<u32>,
    /// Tile image format.
    #[arg(long, default_value_t = ImageFormat::Png)]
    pub format: ImageFormat,
    /// External optimizer binary run on each saved tile (e.g. `pngcrush`), best-effort.
    #[arg(long)]
    pub optimize: Option<String>,
    /// Worker thread count; `1` runs the pipeline inline with no thread pool.
    #[arg(short, long, default_value_t = default_workers())]
    pub workers: usize,
    /// Tiles grouped into one dispatched job.
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, default_value_t = false)]
    pub lighting: bool,
    #[arg(long, default_value_t = false)]
    pub night: bool,
    #[arg(long, default_value_t = false)]
    pub spawn: bool,
}

const BAR_SIZE: u64 = 10_000;

/// Wraps an `indicatif::ProgressBar` the way `PreprocessBar` does in the
/// earth-preprocessing binary, driven here by one call per drained batch
/// instead of a fractional-completion callback.
pub(crate) struct RenderBar {
    name: String,
    bar: ProgressBar,
}

impl RenderBar {
    pub(crate) fn new(name: String) -> Self {
        let bar = ProgressBar::new(BAR_SIZE).with_style(
            ProgressStyle::with_template(&(name.clone() + " {bar} {percent}% [{elapsed}/{duration}]"))
                .unwrap(),
        );
        Self { name, bar }
    }

    pub(crate) fn update(&self, complete: u64, total: u64) {
        let position = if total == 0 { BAR_SIZE } else { complete * BAR_SIZE / total };
        self.bar.set_position(position.min(BAR_SIZE));
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
        log::info!("{} took {:?}", self.name, self.bar.elapsed());
    }
}
