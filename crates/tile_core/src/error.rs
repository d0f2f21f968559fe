use std::path::PathBuf;

use thiserror::Error;

/// Depth computation and path/window errors.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("map is too large: required depth exceeds the cap of {cap} (bounds would need {needed})")]
    MapTooLarge { needed: u32, cap: u32 },
}

/// Errors raised while growing or shrinking the on-disk tree.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("io error rearranging {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the `WorldSource`/`RegionHandle` collaborators.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("failed to load region {path:?}: {message}")]
    RegionLoad { path: PathBuf, message: String },
    #[error("failed to read timestamp for chunk ({chunkx}, {chunky}): {message}")]
    Timestamp {
        chunkx: i64,
        chunky: i64,
        message: String,
    },
}

/// Errors raised while rendering a leaf or inner tile.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error on tile {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode/decode image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("chunk renderer failed for chunk ({chunkx}, {chunky}): {source}")]
    Chunk {
        chunkx: i64,
        chunky: i64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Top-level pipeline error, the only thing the dispatcher ever propagates.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Coord(#[from] CoordError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("a worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("interrupted by user")]
    Interrupted,
}
