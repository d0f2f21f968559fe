//! A minimal filesystem-backed [`WorldSource`]/[`ChunkRenderer`] pair, just
//! enough to drive the engine end to end against a directory of
//! pre-rendered chunk PNGs. Not a reproduction of any real world format:
//! regions are plain directories, `r.<rx>.<ry>/`, each holding
//! `c.<chunkx>.<chunky>.png` files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use image::GenericImageView;
use tile_core::prelude::*;

#[derive(thiserror::Error, Debug)]
pub enum FsWorldError {
    #[error("reading world directory {path:?}: {source}")]
    ReadDir { path: PathBuf, source: std::io::Error },
}

fn region_dir_name(rx: i64, ry: i64) -> String {
    format!("r.{rx}.{ry}")
}

fn chunk_file_name(chunkx: i64, chunky: i64) -> String {
    format!("c.{chunkx}.{chunky}.png")
}

fn parse_chunk_coords(name: &str) -> Option<(i64, i64)> {
    let rest = name.strip_prefix("c.")?;
    let rest = rest.strip_suffix(".png")?;
    let (x, y) = rest.split_once('.')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

/// Scans `world_dir/r.*.*/c.*.*.png` once at startup to learn the bounding
/// box of placed chunks, then answers coordinate/region queries from that
/// directory structure directly (no caching beyond the bounds scan; chunk
/// existence and timestamps are always read fresh from disk).
pub struct FsWorld {
    world_dir: PathBuf,
    bounds: Bounds,
}

impl FsWorld {
    pub fn open(world_dir: PathBuf) -> Result<Self, FsWorldError> {
        let mut bounds = Bounds {
            mincol: 0,
            maxcol: 0,
            minrow: 0,
            maxrow: 0,
        };
        let mut any = false;

        for entry in fs::read_dir(&world_dir).map_err(|source| FsWorldError::ReadDir {
            path: world_dir.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| FsWorldError::ReadDir {
                path: world_dir.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            for chunk_entry in fs::read_dir(entry.path()).map_err(|source| FsWorldError::ReadDir {
                path: entry.path(),
                source,
            })? {
                let chunk_entry = chunk_entry.map_err(|source| FsWorldError::ReadDir {
                    path: entry.path(),
                    source,
                })?;
                let name = chunk_entry.file_name();
                let name = name.to_string_lossy();
                let Some((chunkx, chunky)) = parse_chunk_coords(&name) else {
                    continue;
                };
                let (col, row) = (chunkx, chunky);
                if !any {
                    bounds = Bounds {
                        mincol: col,
                        maxcol: col,
                        minrow: row,
                        maxrow: row,
                    };
                    any = true;
                } else {
                    bounds.mincol = bounds.mincol.min(col);
                    bounds.maxcol = bounds.maxcol.max(col);
                    bounds.minrow = bounds.minrow.min(row);
                    bounds.maxrow = bounds.maxrow.max(row);
                }
            }
        }

        Ok(Self { world_dir, bounds })
    }
}

impl WorldSource for FsWorld {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn unconvert_coords(&self, col: i64, row: i64) -> (i64, i64) {
        (col, row)
    }

    fn region_path(&self, rx: i64, ry: i64) -> Option<PathBuf> {
        let dir = self.world_dir.join(region_dir_name(rx, ry));
        dir.is_dir().then_some(dir)
    }

    fn load_region(&self, path: &Path) -> Result<Box<dyn RegionHandle>, WorldError> {
        Ok(Box::new(FsRegion {
            dir: path.to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }))
    }
}

struct FsRegion {
    dir: PathBuf,
    cache: Mutex<HashMap<(i64, i64), Option<SystemTime>>>,
}

impl FsRegion {
    fn stat(&self, chunkx: i64, chunky: i64) -> Option<SystemTime> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(cached) = cache.get(&(chunkx, chunky)) {
            return *cached;
        }
        let path = self.dir.join(chunk_file_name(chunkx, chunky));
        let mtime = fs::metadata(&path).ok().and_then(|meta| meta.modified().ok());
        cache.insert((chunkx, chunky), mtime);
        mtime
    }
}

impl RegionHandle for FsRegion {
    fn chunk_exists(&self, chunkx: i64, chunky: i64) -> bool {
        self.stat(chunkx, chunky).is_some()
    }

    fn chunk_timestamp(&self, chunkx: i64, chunky: i64) -> Result<SystemTime, WorldError> {
        self.stat(chunkx, chunky).ok_or_else(|| WorldError::Timestamp {
            chunkx,
            chunky,
            message: "chunk file vanished between exists() and timestamp()".to_string(),
        })
    }
}

/// Renders a chunk by loading its PNG and overlaying it at the given offset.
/// `ctx.lighting`/`ctx.night`/`ctx.spawn` are accepted for interface
/// completeness but have no effect here -- applying them is a concrete
/// renderer's job, not this throwaway fixture's.
pub struct FsChunkRenderer {
    world_dir: PathBuf,
}

impl FsChunkRenderer {
    pub fn new(world_dir: PathBuf) -> Self {
        Self { world_dir }
    }
}

impl ChunkRenderer for FsChunkRenderer {
    fn render_chunk(
        &self,
        chunk: (i64, i64),
        target: &mut image::RgbaImage,
        offset: (i64, i64),
        _ctx: &RenderContext,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (chunkx, chunky) = chunk;
        let rx = chunkx.div_euclid(32);
        let ry = chunky.div_euclid(32);
        let path = self
            .world_dir
            .join(region_dir_name(rx, ry))
            .join(chunk_file_name(chunkx, chunky));

        let chunk_img = image::open(&path)?;
        let (ox, oy) = offset;
        for (x, y, pixel) in chunk_img.pixels() {
            let (px, py) = (ox + x as i64, oy + y as i64);
            if px >= 0 && py >= 0 && (px as u32) < target.width() && (py as u32) < target.height() {
                target.put_pixel(px as u32, py as u32, pixel);
            }
        }
        Ok(())
    }
}
