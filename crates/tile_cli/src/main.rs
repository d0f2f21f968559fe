mod cli;
mod fsworld;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use cli::{Cli, RenderBar};
use fsworld::{FsChunkRenderer, FsWorld};
use tile_core::prelude::*;

fn main() -> ExitCode {
    env_logger::init();

    let args = Cli::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("opening world directory: {0}")]
    World(#[from] fsworld::FsWorldError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("writing depth artifact {path:?}: {source}")]
    ConfigWrite { path: std::path::PathBuf, source: std::io::Error },
}

fn run(args: Cli) -> Result<(), CliError> {
    let world = Arc::new(FsWorld::open(args.world_dir.clone())?);
    let renderer = Arc::new(FsChunkRenderer::new(args.world_dir.clone()));

    let layout = TileLayout {
        dest_dir: args.dest_dir,
        tile_dir_name: "tiles".to_string(),
        ext: args.format.extension().to_string(),
    };

    let engine = Engine {
        world,
        renderer,
        render_ctx: RenderContext {
            lighting: args.lighting,
            night: args.night,
            spawn: args.spawn,
        },
        layout,
        depth_override: args.depth,
        format: args.format,
        optimize: args.optimize,
        batch_size: args.batch_size,
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = Arc::clone(&interrupt);
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, finishing in-flight work and stopping");
            interrupt.store(true, Ordering::SeqCst);
        })
        .expect("installing Ctrl-C handler");
    }

    let bar = RenderBar::new("Rendering tiles".to_string());

    let pool: Box<dyn Pool> = if args.workers <= 1 {
        Box::new(InlinePool)
    } else {
        Box::new(RayonPool::new(args.workers)?)
    };

    let depth = engine.render(pool.as_ref(), &interrupt, |event| {
        bar.update(event.complete, event.total);
    })?;

    bar.finish();
    log::info!("rendered tile tree at depth {depth}");

    // tile_core only reads the maxZoom artifact (topology::detect_depth);
    // writing the full viewer page is out of scope, but this binary still
    // needs *something* on disk for reconcile_depth to see on the next run.
    write_depth_artifact(&engine.layout, depth)?;

    Ok(())
}

fn write_depth_artifact(layout: &TileLayout, depth: u32) -> Result<(), CliError> {
    std::fs::write(layout.config_path(), format!("var config = {{ maxZoom: {depth} }};\n"))
        .map_err(|source| CliError::ConfigWrite {
            path: layout.config_path(),
            source,
        })
}
