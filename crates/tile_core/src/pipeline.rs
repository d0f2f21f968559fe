//! Enumerates all leaf tiles and all inner tiles level-by-level, batches
//! them, dispatches to a worker pool, and enforces a bounded in-flight
//! window.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::coords::{self, Bounds, TilePath};
use crate::error::PipelineError;
use crate::format::ImageFormat;
use crate::inner::render_inner_tile;
use crate::layout::TileLayout;
use crate::leaf::render_leaf_tile;
use crate::pool::Pool;
use crate::topology;
use crate::world::{ChunkRenderer, RenderContext, WorldSource};

/// A progress update emitted at most once per drained batch, plus one
/// unconditional line per phase.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: u32,
    pub max_level: u32,
    pub complete: u64,
    pub total: u64,
}

/// Ensures the tile directory and its `blank.<ext>` placeholder exist.
/// `blank.<ext>` is a 1x1 fully-transparent image the viewer falls back to
/// for coordinates with no tile; it's written once, on whichever run first
/// finds it missing, and never touched again.
fn ensure_blank_placeholder(layout: &TileLayout, format: ImageFormat) -> Result<(), PipelineError> {
    let tile_dir = layout.tile_dir();
    match std::fs::create_dir_all(&tile_dir) {
        Ok(()) => {}
        Err(source) => {
            return Err(crate::error::RenderError::Io {
                path: tile_dir.clone(),
                source,
            }
            .into())
        }
    }

    let blank_path = layout.blank_path();
    if blank_path.exists() {
        return Ok(());
    }

    let placeholder = image::RgbaImage::from_pixel(1, 1, crate::leaf::CANVAS_BACKGROUND);
    crate::leaf::save_placeholder(&blank_path, &placeholder, format)
        .map_err(PipelineError::from)
}

/// `print_statusline`'s throttling rule: report at every 25 up to 100, every
/// 100 up to 1000, every 1000 after that.
fn should_report(complete: u64) -> bool {
    if complete < 100 {
        complete % 25 == 0
    } else if complete < 1000 {
        complete % 100 == 0
    } else {
        complete % 1000 == 0
    }
}

/// Pulls leaf paths off `paths` one batch at a time, computing each path's
/// chunk window and relevant chunks only as that batch is produced.
struct LeafJobIter {
    paths: Box<dyn Iterator<Item = TilePath> + Send>,
    world: Arc<dyn WorldSource>,
    renderer: Arc<dyn ChunkRenderer>,
    ctx: RenderContext,
    format: ImageFormat,
    layout: TileLayout,
    bounds: Bounds,
    batch_size: usize,
}

impl Iterator for LeafJobIter {
    type Item = Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch: Vec<(Vec<crate::coords::ChunkRef>, i64, i64, i64, i64, PathBuf)> =
            Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            let Some(path) = self.paths.next() else { break };
            let (colstart, rowstart) = coords::window_of_path(self.bounds, &path);
            let colend = colstart + 2;
            let rowend = rowstart + 4;
            let dest = self.layout.leaf_dest(&path);
            let chunks = coords::chunks_in_window(self.world.as_ref(), colstart, colend, rowstart, rowend);
            batch.push((chunks, colstart, colend, rowstart, rowend, dest));
        }

        if batch.is_empty() {
            return None;
        }

        let world = Arc::clone(&self.world);
        let renderer = Arc::clone(&self.renderer);
        let ctx = self.ctx;
        let format = self.format;

        Some(Box::new(move || {
            let count = batch.len() as u64;
            for (chunks, colstart, colend, rowstart, rowend, dest) in batch {
                render_leaf_tile(
                    world.as_ref(),
                    renderer.as_ref(),
                    &ctx,
                    &chunks,
                    colstart,
                    colend,
                    rowstart,
                    rowend,
                    &dest,
                    format,
                )?;
            }
            Ok(count)
        }))
    }
}

/// Pulls inner-tile paths off `paths` one batch at a time; each item is just
/// a `(PathBuf, String)` pair, so batches here are cheap regardless.
struct InnerJobIter {
    paths: Box<dyn Iterator<Item = TilePath> + Send>,
    layout: TileLayout,
    format: ImageFormat,
    optimize: Option<String>,
    batch_size: usize,
}

impl Iterator for InnerJobIter {
    type Item = Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch: Vec<(PathBuf, String)> = Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            let Some(path) = self.paths.next() else { break };
            let last = *path.last().expect("zoom >= 1");
            let rest = &path[..path.len() - 1];
            let dest = self.layout.subtree_dir(rest);
            batch.push((dest, last.to_string()));
        }

        if batch.is_empty() {
            return None;
        }

        let format = self.format;
        let optimize = self.optimize.clone();

        Some(Box::new(move || {
            let count = batch.len() as u64;
            for (dest, name) in batch {
                render_inner_tile(&dest, &name, format, optimize.as_deref())?;
            }
            Ok(count)
        }))
    }
}

/// Everything the engine needs to render (or re-render) a tile tree.
pub struct Engine {
    pub world: Arc<dyn WorldSource>,
    pub renderer: Arc<dyn ChunkRenderer>,
    pub render_ctx: RenderContext,
    pub layout: TileLayout,
    pub depth_override: Option<u32>,
    pub format: ImageFormat,
    pub optimize: Option<String>,
    pub batch_size: usize,
}

impl Engine {
    fn depth(&self) -> Result<u32, PipelineError> {
        match self.depth_override {
            Some(p) if p > coords::MAX_DEPTH => Err(crate::error::CoordError::MapTooLarge {
                needed: p,
                cap: coords::MAX_DEPTH,
            }
            .into()),
            Some(p) => Ok(p),
            None => Ok(coords::depth_for_bounds(self.world.bounds())?),
        }
    }

    /// Renders the whole tree: topology reconciliation, leaf level, inner
    /// levels from `p-1` down to `1`, then the root. Returns the depth `p`
    /// that was rendered to.
    pub fn render(
        &self,
        pool: &dyn Pool,
        interrupt: &AtomicBool,
        mut progress: impl FnMut(ProgressEvent),
    ) -> Result<u32, PipelineError> {
        let p = self.depth()?;
        let bounds = coords::effective_bounds(p);

        ensure_blank_placeholder(&self.layout, self.format)?;

        // Phase 0: topology reconciliation.
        topology::reconcile_depth(&self.layout, p)?;

        let batch_size = self.batch_size.max(1);

        // Phase 1: leaf render.
        self.drain_all(
            pool,
            interrupt,
            self.leaf_jobs(bounds, p, batch_size),
            1,
            p,
            4u64.pow(p),
            &mut progress,
        )?;

        // Phase 2: inner render, deepest level first.
        for zoom in (1..p).rev() {
            let level = p - zoom + 1;
            self.drain_all(
                pool,
                interrupt,
                self.inner_jobs(zoom, batch_size),
                level,
                p,
                4u64.pow(zoom),
                &mut progress,
            )?;
        }

        // Phase 3: root, rendered inline.
        if interrupt.load(Ordering::SeqCst) {
            return Err(PipelineError::Interrupted);
        }
        render_inner_tile(&self.layout.tile_dir(), "base", self.format, self.optimize.as_deref())?;

        Ok(p)
    }

    /// Lazily produces one leaf batch job per call to `next()`, computing a
    /// batch's chunk windows only when it's pulled -- so at most one
    /// un-submitted batch's worth of chunk lists is resident alongside
    /// whatever's already in flight, rather than all `4^p` of them at once.
    fn leaf_jobs(&self, bounds: Bounds, p: u32, batch_size: usize) -> LeafJobIter {
        LeafJobIter {
            paths: Box::new(coords::iterate_base4(p)),
            world: Arc::clone(&self.world),
            renderer: Arc::clone(&self.renderer),
            ctx: self.render_ctx,
            format: self.format,
            layout: self.layout.clone(),
            bounds,
            batch_size,
        }
    }

    /// Same laziness as `leaf_jobs`, though each batch only ever holds cheap
    /// `(PathBuf, String)` pairs so the eagerness wasn't the severe half of
    /// the problem here.
    fn inner_jobs(&self, zoom: u32, batch_size: usize) -> InnerJobIter {
        InnerJobIter {
            paths: Box::new(coords::iterate_base4(zoom)),
            layout: self.layout.clone(),
            format: self.format,
            optimize: self.optimize.clone(),
            batch_size,
        }
    }

    /// Submits jobs pulled one at a time from `jobs`, keeping at most
    /// `ceil(10000/batch_size)` results in flight and draining down to
    /// `ceil(500/batch_size)` when that bound is exceeded; drains fully
    /// before returning.
    fn drain_all(
        &self,
        pool: &dyn Pool,
        interrupt: &AtomicBool,
        jobs: impl Iterator<Item = Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>>,
        level: u32,
        max_level: u32,
        total: u64,
        progress: &mut impl FnMut(ProgressEvent),
    ) -> Result<(), PipelineError> {
        let batch_size = self.batch_size.max(1);
        let high_water = 10_000usize.div_ceil(batch_size);
        let low_water = 500usize.div_ceil(batch_size);

        let mut results: VecDeque<Box<dyn crate::pool::Handle<u64>>> = VecDeque::new();
        let mut complete = 0u64;

        let mut drain_to = |results: &mut VecDeque<Box<dyn crate::pool::Handle<u64>>>,
                             complete: &mut u64,
                             target: usize|
         -> Result<(), PipelineError> {
            while results.len() > target {
                if interrupt.load(Ordering::SeqCst) {
                    return Err(PipelineError::Interrupted);
                }
                let handle = results.pop_front().expect("len > target >= 0");
                *complete += handle.get()?;
                if should_report(*complete) {
                    progress(ProgressEvent {
                        level,
                        max_level,
                        complete: *complete,
                        total,
                    });
                }
            }
            Ok(())
        };

        for job in jobs {
            if interrupt.load(Ordering::SeqCst) {
                return Err(PipelineError::Interrupted);
            }
            results.push_back(pool.apply_async_count(job));
            if results.len() > high_water {
                drain_to(&mut results, &mut complete, low_water)?;
            }
        }

        drain_to(&mut results, &mut complete, 0)?;

        progress(ProgressEvent {
            level,
            max_level,
            complete,
            total,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statusline_throttling() {
        assert!(should_report(0));
        assert!(should_report(25));
        assert!(!should_report(30));
        assert!(should_report(100));
        assert!(should_report(200));
        assert!(!should_report(250));
        assert!(should_report(1000));
        assert!(should_report(2000));
        assert!(!should_report(2500));
    }

    /// Property 8: the in-flight FIFO never exceeds `ceil(10000/B) + 1`
    /// (the `+1` accounts for the job just pushed before the high-water
    /// check runs).
    #[test]
    fn bounded_memory_window() {
        let batch_size = 50usize;
        let high_water = 10_000usize.div_ceil(batch_size);
        let low_water = 500usize.div_ceil(batch_size);

        let mut queue_len = 0usize;
        let mut max_seen = 0usize;
        for _ in 0..5000 {
            queue_len += 1;
            max_seen = max_seen.max(queue_len);
            if queue_len > high_water {
                queue_len = low_water;
            }
        }
        assert!(max_seen <= high_water + 1);
    }
}
