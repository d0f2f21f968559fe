//! Computes the required tree depth from world bounds and rebalances an
//! existing on-disk tree when that depth changes.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::TopologyError;
use crate::layout::TileLayout;

/// How deep the on-disk tree currently is, per the `maxZoom:\s*(\d+)` artifact
/// in `config.js`. Missing file or no match returns `-1`, matching
/// `_get_cur_depth` in the original source.
pub fn detect_depth(layout: &TileLayout) -> i64 {
    let Ok(contents) = fs::read_to_string(layout.config_path()) else {
        return -1;
    };

    let re = Regex::new(r"maxZoom:\s*(\d+)").expect("static regex is valid");
    for line in contents.lines() {
        if let Some(caps) = re.captures(line) {
            if let Ok(p) = caps[1].parse::<i64>() {
                return p;
            }
        }
    }
    -1
}

/// Quadrant digit remap used by both grow and shrink; self-inverse (0<->3, 1<->2).
fn mirror(digit: u8) -> u8 {
    3 - digit
}

fn rename(from: &Path, to: &Path) -> Result<(), TopologyError> {
    fs::rename(from, to).map_err(|source| TopologyError::Io {
        path: from.to_path_buf(),
        source,
    })
}

fn remove_dir_all(path: &Path) -> Result<(), TopologyError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TopologyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn create_dir(path: &Path) -> Result<(), TopologyError> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(TopologyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Grows the tree by one level: for each top-level quadrant `d`, its previous
/// contents become child `mirror(d)` of a new quadrant `d`. The newly
/// recreated top two levels are regenerated by the pipeline.
pub fn increase_depth(layout: &TileLayout) -> Result<(), TopologyError> {
    let tile_dir = layout.tile_dir();

    for d in 0u8..4 {
        let new_dir = tile_dir.join(format!("new{d}"));
        create_dir(&new_dir)?;

        let old_file = tile_dir.join(format!("{d}.{}", layout.ext));
        let old_subtree = tile_dir.join(d.to_string());
        let mirrored = mirror(d);

        if old_file.exists() {
            rename(&old_file, &new_dir.join(format!("{mirrored}.{}", layout.ext)))?;
        }
        if old_subtree.exists() {
            rename(&old_subtree, &new_dir.join(mirrored.to_string()))?;
        }

        rename(&new_dir, &tile_dir.join(d.to_string()))?;
    }

    Ok(())
}

/// Shrinks the tree by one level: for each top-level quadrant `d`, if
/// `d/mirror(d)/` exists, it becomes the new contents of `d`; the rest of the
/// old subtree under `d` is discarded. The now-missing top-two-level tiles
/// are regenerated by the pipeline.
pub fn decrease_depth(layout: &TileLayout) -> Result<(), TopologyError> {
    let tile_dir = layout.tile_dir();

    for d in 0u8..4 {
        let mirrored = mirror(d);
        let inner = tile_dir.join(d.to_string()).join(mirrored.to_string());
        if !inner.exists() {
            continue;
        }

        let new_dir = tile_dir.join(format!("new{d}"));
        rename(&inner, &new_dir)?;
        remove_dir_all(&tile_dir.join(d.to_string()))?;
        rename(&new_dir, &tile_dir.join(d.to_string()))?;
    }

    Ok(())
}

/// Reconciles the on-disk tree with the required depth `p`, looping
/// single-level grows or shrinks as needed to get there (a multi-level
/// change walks through every depth in between rather than jumping).
///
/// Returns the previously-detected depth (`-1` if none was detected).
pub fn reconcile_depth(layout: &TileLayout, p: u32) -> Result<i64, TopologyError> {
    let current = detect_depth(layout);
    let p = p as i64;

    if current != -1 {
        if p > current {
            log::warn!("map has expanded beyond its previous bounds; rearranging tiles");
            for _ in 0..(p - current) {
                increase_depth(layout)?;
            }
        } else if p < current {
            log::warn!("map has shrunk; rearranging tiles");
            for _ in 0..(current - p) {
                decrease_depth(layout)?;
            }
        }
    }

    Ok(current)
}
