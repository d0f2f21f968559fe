//! Integration surface: the typed contract between the engine and its
//! external collaborators. `tile_core` ships no production implementation
//! of these traits -- the world model and chunk renderer are owned by
//! whatever binary embeds the engine.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::coords::Bounds;
use crate::error::WorldError;

/// Required of the world collaborator.
pub trait WorldSource: Send + Sync {
    /// Integer bounds of the world in chunk-grid coordinates.
    fn bounds(&self) -> Bounds;

    /// Translates a (col, row) grid cell to a (chunkx, chunky) chunk coordinate.
    fn unconvert_coords(&self, col: i64, row: i64) -> (i64, i64);

    /// Looks up the region file path for the region containing `(rx, ry)`
    /// (region coordinates, i.e. `chunkx div 32, chunky div 32`), or `None`
    /// if no region is on disk for that slot.
    fn region_path(&self, rx: i64, ry: i64) -> Option<PathBuf>;

    /// Opens the region file at `path` for chunk-existence and timestamp queries.
    fn load_region(&self, path: &Path) -> Result<Box<dyn RegionHandle>, WorldError>;
}

/// Required of a loaded region.
pub trait RegionHandle {
    fn chunk_exists(&self, chunkx: i64, chunky: i64) -> bool;
    fn chunk_timestamp(&self, chunkx: i64, chunky: i64) -> Result<SystemTime, WorldError>;
}

/// Lighting/night/spawn context forwarded to the chunk renderer collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext {
    pub lighting: bool,
    pub night: bool,
    pub spawn: bool,
}

/// Required of the chunk renderer collaborator: draws a chunk onto `target`
/// at pixel offset `offset`.
pub trait ChunkRenderer: Send + Sync {
    fn render_chunk(
        &self,
        chunk: (i64, i64),
        target: &mut image::RgbaImage,
        offset: (i64, i64),
        ctx: &RenderContext,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
