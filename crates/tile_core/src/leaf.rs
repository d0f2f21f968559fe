//! Given a tile's chunk-coordinate window and the subset of chunks touching
//! it, decides whether to rebuild, composites chunks with staggered offsets,
//! and writes or deletes the tile file.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::{ImageEncoder, Rgba, RgbaImage};

use crate::coords::ChunkRef;
use crate::error::RenderError;
use crate::format::ImageFormat;
use crate::world::{ChunkRenderer, RenderContext, WorldSource};

/// Transparent background used for every freshly constructed canvas:
/// identity-transparent blue, alpha 0.
pub const CANVAS_BACKGROUND: Rgba<u8> = Rgba([38, 92, 255, 0]);

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

fn ensure_parent_dir(path: &Path) -> Result<(), RenderError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match fs::create_dir_all(parent) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(RenderError::Io {
            path: parent.to_path_buf(),
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

/// Saves a tiny placeholder image with the same format rules as a rendered
/// tile. Used once, at startup, to write `blank.<ext>`.
pub(crate) fn save_placeholder(path: &Path, img: &RgbaImage, format: ImageFormat) -> Result<(), RenderError> {
    save_image(path, img, format)
}

fn save_image(path: &Path, img: &RgbaImage, format: ImageFormat) -> Result<(), RenderError> {
    let to_err = |source: image::ImageError| RenderError::Image {
        path: path.to_path_buf(),
        source,
    };

    match format {
        ImageFormat::Png => img.save(path).map_err(to_err),
        ImageFormat::Jpeg => {
            let file = fs::File::create(path).map_err(|source| RenderError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let writer = std::io::BufWriter::new(file);
            // Quality 95, matching the reference tileset's JPEG output.
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, 95);
            let rgb = image::DynamicImage::ImageRgba8(img.clone()).into_rgb8();
            encoder
                .write_image(&rgb, rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
                .map_err(to_err)
        }
    }
}

/// Renders (or deletes) the leaf tile at `dest` from `chunks` within the
/// chunk-coordinate window `[colstart, colend) x [rowstart, rowend)`.
#[allow(clippy::too_many_arguments)]
pub fn render_leaf_tile(
    world: &dyn WorldSource,
    renderer: &dyn ChunkRenderer,
    ctx: &RenderContext,
    chunks: &[ChunkRef],
    colstart: i64,
    colend: i64,
    rowstart: i64,
    rowend: i64,
    dest: &Path,
    format: ImageFormat,
) -> Result<(), RenderError> {
    let imgpath = dest.with_extension(format.extension());

    // Step 1: existence filter.
    let mut live_chunks = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let region = world.load_region(&chunk.region)?;
        if region.chunk_exists(chunk.chunkx, chunk.chunky) {
            live_chunks.push(chunk);
        }
    }

    // Step 2: tile-file mtime.
    let tile_mtime = stat_mtime(&imgpath)?;

    // Step 3: empty-handling.
    if live_chunks.is_empty() {
        remove_if_exists(&imgpath)?;
        return Ok(());
    }

    // Step 4: parent-directory creation.
    ensure_parent_dir(&imgpath)?;

    // Step 5: freshness check.
    let mut needs_rerender = tile_mtime.is_none();
    let mut region_mtimes: HashMap<PathBuf, SystemTime> = HashMap::new();
    if !needs_rerender {
        let tile_mtime = tile_mtime.expect("checked above");
        'outer: for chunk in &live_chunks {
            let region_mtime = match region_mtimes.get(&chunk.region) {
                Some(&t) => t,
                None => {
                    let t = stat_mtime(&chunk.region)?.unwrap_or(SystemTime::UNIX_EPOCH);
                    region_mtimes.insert(chunk.region.clone(), t);
                    t
                }
            };
            if region_mtime <= tile_mtime {
                continue;
            }

            let region = world.load_region(&chunk.region)?;
            let chunk_mtime = region.chunk_timestamp(chunk.chunkx, chunk.chunky)?;
            if chunk_mtime > tile_mtime {
                needs_rerender = true;
                break 'outer;
            }
        }
    }

    if !needs_rerender {
        return Ok(());
    }

    // Step 6: render.
    let width = 192 * (colend - colstart) as u32;
    let height = 96 * (rowend - rowstart) as u32;
    let mut tileimg = RgbaImage::from_pixel(width, height, CANVAS_BACKGROUND);

    for chunk in &live_chunks {
        let xpos = -192 + (chunk.col - colstart) * 192;
        let ypos = -96 + (chunk.row - rowstart) * 96;
        renderer
            .render_chunk((chunk.chunkx, chunk.chunky), &mut tileimg, (xpos, ypos), ctx)
            .map_err(|source| RenderError::Chunk {
                chunkx: chunk.chunkx,
                chunky: chunk.chunky,
                source,
            })?;
    }

    save_image(&imgpath, &tileimg, format)
}
