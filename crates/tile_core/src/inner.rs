//! Given a tile path and its four children, decides whether to rebuild,
//! stitches four quadrants at half resolution, writes or deletes the tile
//! file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::{imageops::FilterType, RgbaImage};

use crate::error::RenderError;
use crate::format::ImageFormat;
use crate::leaf::CANVAS_BACKGROUND;

/// Paste offsets for children 0, 1, 2, 3 on the 384x384 canvas.
const QUAD_OFFSETS: [(u32, u32); 4] = [(0, 0), (192, 0), (0, 192), (192, 192)];

fn stat_mtime(path: &Path) -> Result<Option<SystemTime>, RenderError> {
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        }),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RenderError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_if_exists(path: &Path) -> Result<(), RenderError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RenderError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Renders (or deletes) the inner tile `<dest>/<name>.<ext>` from its four
/// children at `<dest>/<name>/{0,1,2,3}.<ext>` (or, for `name == "base"`,
/// directly under `dest`).
pub fn render_inner_tile(
    dest: &Path,
    name: &str,
    format: ImageFormat,
    optimize: Option<&str>,
) -> Result<(), RenderError> {
    let imgpath = dest.join(format!("{name}.{}", format.extension()));

    let children_dir = if name == "base" {
        dest.to_path_buf()
    } else {
        dest.join(name)
    };

    let child_paths: [PathBuf; 4] =
        std::array::from_fn(|i| children_dir.join(format!("{i}.{}", format.extension())));

    // Step 1: stat the target.
    let tile_mtime = stat_mtime(&imgpath)?;

    // Step 2: stat each child; filter to existing ones, tracking freshness.
    let mut needs_rerender = tile_mtime.is_none();
    let mut present: Vec<(usize, PathBuf)> = Vec::with_capacity(4);
    for (i, child_path) in child_paths.iter().enumerate() {
        let Some(child_mtime) = stat_mtime(child_path)? else {
            continue;
        };
        present.push((i, child_path.clone()));
        if let Some(tile_mtime) = tile_mtime {
            if child_mtime > tile_mtime {
                needs_rerender = true;
            }
        }
    }

    // Step 3: no children at all.
    if present.is_empty() {
        remove_if_exists(&imgpath)?;
        return Ok(());
    }

    // Step 4: up to date.
    if !needs_rerender {
        return Ok(());
    }

    // Step 5: composite.
    let mut canvas = RgbaImage::from_pixel(384, 384, CANVAS_BACKGROUND);
    for (i, child_path) in &present {
        match image::open(child_path) {
            Ok(child_img) => {
                let resized = child_img.resize_exact(192, 192, FilterType::Lanczos3);
                let (x, y) = QUAD_OFFSETS[*i];
                image::imageops::overlay(&mut canvas, &resized.to_rgba8(), x as i64, y as i64);
            }
            Err(err) => {
                log::warn!(
                    "couldn't open {}, it may be corrupt, you may need to delete it: {err}",
                    child_path.display()
                );
            }
        }
    }

    save_image(&imgpath, &canvas, format)?;

    if let Some(optimizer) = optimize {
        run_optimizer(&imgpath, format, optimizer);
    }

    Ok(())
}

fn save_image(path: &Path, img: &RgbaImage, format: ImageFormat) -> Result<(), RenderError> {
    let to_err = |source: image::ImageError| RenderError::Image {
        path: path.to_path_buf(),
        source,
    };

    match format {
        ImageFormat::Png => img.save(path).map_err(to_err),
        ImageFormat::Jpeg => {
            use image::ImageEncoder;
            let file = fs::File::create(path).map_err(|source| RenderError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let writer = std::io::BufWriter::new(file);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, 95);
            let rgb = image::DynamicImage::ImageRgba8(img.clone()).into_rgb8();
            encoder
                .write_image(&rgb, rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
                .map_err(to_err)
        }
    }
}

/// Invokes an external image optimizer on the saved tile. The optimizer
/// itself is a separate binary this just shells out to; failures are logged
/// rather than treated as fatal, since optimization is best-effort polish
/// on an already-saved tile.
fn run_optimizer(path: &Path, format: ImageFormat, optimizer: &str) {
    if format != ImageFormat::Png {
        return;
    }
    match std::process::Command::new(optimizer).arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => log::warn!("optimizer {optimizer} exited with {status} on {}", path.display()),
        Err(err) => log::warn!("failed to run optimizer {optimizer} on {}: {err}", path.display()),
    }
}
