mod common;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime};

use common::{FakeRenderer, FakeWorld};
use tile_core::prelude::*;

// Deep enough that two chunks placed far apart in the row axis cannot share
// a leaf window even with the `rowstart - 16` extension: a window only
// reaches 16 chunks above itself, not across the whole map.
const DEPTH: u32 = 5;

fn engine(dest_dir: PathBuf, world: std::sync::Arc<FakeWorld>) -> Engine {
    Engine {
        world,
        renderer: std::sync::Arc::new(FakeRenderer),
        render_ctx: RenderContext::default(),
        layout: TileLayout {
            dest_dir,
            tile_dir_name: "tiles".to_string(),
            ext: "png".to_string(),
        },
        depth_override: Some(DEPTH),
        format: ImageFormat::Png,
        optimize: None,
        batch_size: 50,
    }
}

/// Every leaf path (at `DEPTH`) whose window would include `(chunkx, chunky)`,
/// computed with the engine's own pure coordinate functions -- this is the
/// ground truth for "which tiles should this chunk touch".
fn leaves_touching(chunkx: i64, chunky: i64) -> Vec<Vec<u8>> {
    let bounds = tile_core::coords::effective_bounds(DEPTH);
    let mut hits = Vec::new();
    for path in tile_core::coords::iterate_base4(DEPTH) {
        let (colstart, rowstart) = tile_core::coords::window_of_path(bounds, &path);
        let colend = colstart + 2;
        let rowend = rowstart + 4;
        if (rowstart - 16..=rowend).contains(&chunky) && (colstart..=colend).contains(&chunkx) {
            hits.push(path);
        }
    }
    hits
}

fn leaf_file(layout: &TileLayout, path: &[u8]) -> PathBuf {
    layout.leaf_dest(path).with_extension("png")
}

fn run(engine: &Engine) -> u32 {
    let pool = InlinePool;
    let interrupt = AtomicBool::new(false);
    engine.render(&pool, &interrupt, |_| {}).unwrap()
}

#[test]
fn scenario_s3_single_chunk_produces_exactly_its_leaves_and_root() {
    let tmp = tempfile::tempdir().unwrap();
    let world = FakeWorld::new(tmp.path().join("regions"), tile_core::coords::effective_bounds(DEPTH));
    world.put_chunk(0, 0, SystemTime::now());

    let eng = engine(tmp.path().join("site"), world);
    run(&eng);

    let touched = leaves_touching(0, 0);
    assert!(!touched.is_empty());
    for path in &touched {
        assert!(leaf_file(&eng.layout, path).exists(), "expected leaf {path:?} to exist");
    }

    for path in tile_core::coords::iterate_base4(DEPTH) {
        if !touched.contains(&path) {
            assert!(!leaf_file(&eng.layout, &path).exists(), "unexpected leaf {path:?}");
        }
    }

    assert!(eng.layout.base_path().exists());
}

#[test]
fn scenario_s4_touching_a_chunk_rewrites_only_its_ancestry() {
    let tmp = tempfile::tempdir().unwrap();
    let world = FakeWorld::new(tmp.path().join("regions"), tile_core::coords::effective_bounds(DEPTH));
    world.put_chunk(0, 0, SystemTime::now());
    world.put_chunk(0, 50, SystemTime::now());

    let eng = engine(tmp.path().join("site"), world.clone());
    run(&eng);

    let touched = leaves_touching(0, 0);
    let other_touched = leaves_touching(0, 50);
    assert!(
        touched.iter().all(|p| !other_touched.contains(p)),
        "test fixture chunks must not share a leaf window"
    );

    let mtimes_before: Vec<_> = touched
        .iter()
        .map(|p| std::fs::metadata(leaf_file(&eng.layout, p)).unwrap().modified().unwrap())
        .collect();
    let other_mtimes_before: Vec<_> = other_touched
        .iter()
        .map(|p| std::fs::metadata(leaf_file(&eng.layout, p)).unwrap().modified().unwrap())
        .collect();
    let base_before = std::fs::metadata(eng.layout.base_path()).unwrap().modified().unwrap();

    std::thread::sleep(Duration::from_millis(10));
    world.touch_chunk(0, 0, SystemTime::now() + Duration::from_secs(5));
    run(&eng);

    for (path, before) in touched.iter().zip(mtimes_before) {
        let after = std::fs::metadata(leaf_file(&eng.layout, path)).unwrap().modified().unwrap();
        assert!(after > before, "leaf {path:?} should have been rewritten");
    }
    for (path, before) in other_touched.iter().zip(other_mtimes_before) {
        let after = std::fs::metadata(leaf_file(&eng.layout, path)).unwrap().modified().unwrap();
        assert_eq!(after, before, "sibling leaf {path:?} should not be rewritten");
    }

    let base_after = std::fs::metadata(eng.layout.base_path()).unwrap().modified().unwrap();
    assert!(base_after > base_before, "root should have been rewritten");
}

#[test]
fn incremental_idempotence_second_run_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let world = FakeWorld::new(tmp.path().join("regions"), tile_core::coords::effective_bounds(DEPTH));
    world.put_chunk(0, 0, SystemTime::now());

    let eng = engine(tmp.path().join("site"), world);
    run(&eng);

    let touched = leaves_touching(0, 0);
    let mtimes_before: Vec<_> = touched
        .iter()
        .map(|p| std::fs::metadata(leaf_file(&eng.layout, p)).unwrap().modified().unwrap())
        .collect();
    let base_before = std::fs::metadata(eng.layout.base_path()).unwrap().modified().unwrap();

    std::thread::sleep(Duration::from_millis(10));
    run(&eng);

    for (path, before) in touched.iter().zip(mtimes_before) {
        let after = std::fs::metadata(leaf_file(&eng.layout, path)).unwrap().modified().unwrap();
        assert_eq!(after, before, "leaf {path:?} should not have been rewritten");
    }
    let base_after = std::fs::metadata(eng.layout.base_path()).unwrap().modified().unwrap();
    assert_eq!(base_after, base_before, "root should not have been rewritten");
}

#[test]
fn zero_chunk_world_leaves_only_the_blank_placeholder() {
    let tmp = tempfile::tempdir().unwrap();
    let world = FakeWorld::new(tmp.path().join("regions"), tile_core::coords::effective_bounds(DEPTH));

    let eng = engine(tmp.path().join("site"), world);
    run(&eng);

    assert!(eng.layout.blank_path().exists());
    assert!(!eng.layout.base_path().exists());
    for path in tile_core::coords::iterate_base4(DEPTH) {
        assert!(!leaf_file(&eng.layout, &path).exists());
    }
}

#[test]
fn empty_window_deletes_leaf_and_root() {
    let tmp = tempfile::tempdir().unwrap();
    let world = FakeWorld::new(tmp.path().join("regions"), tile_core::coords::effective_bounds(DEPTH));
    world.put_chunk(0, 0, SystemTime::now());

    let eng = engine(tmp.path().join("site"), world.clone());
    run(&eng);

    let touched = leaves_touching(0, 0);
    assert!(touched.iter().all(|p| leaf_file(&eng.layout, p).exists()));
    assert!(eng.layout.base_path().exists());

    world.remove_chunk(0, 0);
    run(&eng);

    for path in &touched {
        assert!(!leaf_file(&eng.layout, path).exists(), "leaf {path:?} should have been deleted");
    }
    assert!(!eng.layout.base_path().exists(), "root should have been deleted (S6)");
}
