//! The quadtree tile pyramid engine: depth selection, in-place tree
//! rebalancing, path-to-region mapping, leaf/inner tile (re)rendering, and
//! the parallel task pipeline that orchestrates all of it under a bounded
//! in-flight window.

pub mod coords;
pub mod error;
pub mod format;
pub mod inner;
pub mod layout;
pub mod leaf;
pub mod pipeline;
pub mod pool;
pub mod topology;
pub mod world;

pub mod prelude {
    pub use crate::coords::{Bounds, ChunkRef, TilePath};
    pub use crate::error::{CoordError, PipelineError, RenderError, TopologyError, WorldError};
    pub use crate::format::ImageFormat;
    pub use crate::layout::TileLayout;
    pub use crate::pipeline::{Engine, ProgressEvent};
    pub use crate::pool::{Handle, InlinePool, Pool, RayonPool};
    pub use crate::world::{ChunkRenderer, RegionHandle, RenderContext, WorldSource};
}
