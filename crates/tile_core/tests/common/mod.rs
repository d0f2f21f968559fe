//! Fakes standing in for the world-model and chunk-renderer collaborators,
//! used to validate the engine's incremental-rebuild and concurrency
//! properties. Not a reproduction of any real world/chunk format -- just
//! enough to drive the pipeline end to end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use image::Rgba;
use tile_core::prelude::*;

#[derive(Debug, Clone, Default)]
struct ChunkState {
    exists: bool,
    timestamp: SystemTime,
}

/// An in-memory world: chunks are placed at `(chunkx, chunky) == (col, row)`
/// (the identity mapping is fine here since coordinate conversion is the
/// world collaborator's business, not the engine's).
pub struct FakeWorld {
    bounds: Bounds,
    regions_dir: PathBuf,
    chunks: Mutex<HashMap<(i64, i64), ChunkState>>,
}

impl FakeWorld {
    pub fn new(regions_dir: PathBuf, bounds: Bounds) -> Arc<Self> {
        std::fs::create_dir_all(&regions_dir).unwrap();
        Arc::new(Self {
            bounds,
            regions_dir,
            chunks: Mutex::new(HashMap::new()),
        })
    }

    fn region_file(&self, rx: i64, ry: i64) -> PathBuf {
        self.regions_dir.join(format!("r.{rx}.{ry}.region"))
    }

    /// Places a chunk at `(chunkx, chunky)` with the given timestamp, creating
    /// (or touching) its region file on disk so mtime-based short-circuiting
    /// has something real to stat.
    pub fn put_chunk(&self, chunkx: i64, chunky: i64, timestamp: SystemTime) {
        let region_path = self.region_file(chunkx.div_euclid(32), chunky.div_euclid(32));
        if !region_path.exists() {
            std::fs::write(&region_path, b"region").unwrap();
        }
        filetime::set_file_mtime(&region_path, filetime::FileTime::from_system_time(timestamp)).unwrap();

        self.chunks.lock().unwrap().insert(
            (chunkx, chunky),
            ChunkState {
                exists: true,
                timestamp,
            },
        );
    }

    pub fn remove_chunk(&self, chunkx: i64, chunky: i64) {
        self.chunks.lock().unwrap().remove(&(chunkx, chunky));
    }

    pub fn touch_chunk(&self, chunkx: i64, chunky: i64, timestamp: SystemTime) {
        let region_path = self.region_file(chunkx.div_euclid(32), chunky.div_euclid(32));
        filetime::set_file_mtime(&region_path, filetime::FileTime::from_system_time(timestamp)).unwrap();
        let mut chunks = self.chunks.lock().unwrap();
        if let Some(state) = chunks.get_mut(&(chunkx, chunky)) {
            state.timestamp = timestamp;
        }
    }
}

impl WorldSource for FakeWorld {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn unconvert_coords(&self, col: i64, row: i64) -> (i64, i64) {
        (col, row)
    }

    fn region_path(&self, rx: i64, ry: i64) -> Option<PathBuf> {
        let path = self.region_file(rx, ry);
        path.exists().then_some(path)
    }

    fn load_region(&self, path: &Path) -> Result<Box<dyn RegionHandle>, WorldError> {
        Ok(Box::new(FakeRegion {
            path: path.to_path_buf(),
            chunks: self.chunks.lock().unwrap().clone(),
        }))
    }
}

struct FakeRegion {
    #[allow(dead_code)]
    path: PathBuf,
    chunks: HashMap<(i64, i64), ChunkState>,
}

impl RegionHandle for FakeRegion {
    fn chunk_exists(&self, chunkx: i64, chunky: i64) -> bool {
        self.chunks.get(&(chunkx, chunky)).is_some_and(|c| c.exists)
    }

    fn chunk_timestamp(&self, chunkx: i64, chunky: i64) -> Result<SystemTime, WorldError> {
        self.chunks
            .get(&(chunkx, chunky))
            .map(|c| c.timestamp)
            .ok_or_else(|| WorldError::Timestamp {
                chunkx,
                chunky,
                message: "chunk not found".to_string(),
            })
    }
}

/// Paints a solid, chunk-position-dependent color into the chunk's cell so
/// tests can tell tiles with different chunk content apart.
pub struct FakeRenderer;

impl ChunkRenderer for FakeRenderer {
    fn render_chunk(
        &self,
        chunk: (i64, i64),
        target: &mut image::RgbaImage,
        offset: (i64, i64),
        _ctx: &RenderContext,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (chunkx, chunky) = chunk;
        let color = Rgba([
            (chunkx.rem_euclid(256)) as u8,
            (chunky.rem_euclid(256)) as u8,
            200,
            255,
        ]);
        let (ox, oy) = offset;
        for y in 0..384i64 {
            for x in 0..384i64 {
                let (px, py) = (ox + x, oy + y);
                if px >= 0 && py >= 0 && (px as u32) < target.width() && (py as u32) < target.height() {
                    target.put_pixel(px as u32, py as u32, color);
                }
            }
        }
        Ok(())
    }
}
