//! Pure functions translating between quadtree paths and world chunk-coordinate windows.

use std::path::PathBuf;

use crate::error::CoordError;
use crate::world::WorldSource;

/// The cap on quadtree depth; exceeding it is a fatal configuration error.
pub const MAX_DEPTH: u32 = 15;

/// World bounds in chunk-grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub mincol: i64,
    pub maxcol: i64,
    pub minrow: i64,
    pub maxrow: i64,
}

/// A fully resolved tile path: a sequence of base-4 digits, length 0..=depth.
pub type TilePath = Vec<u8>;

/// A chunk relevant to some tile, with its originating region path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub col: i64,
    pub row: i64,
    pub chunkx: i64,
    pub chunky: i64,
    pub region: PathBuf,
}

/// Smallest non-negative integer `p` such that `2^p >= max(|mincol|, |maxcol|)`
/// and `2*2^p >= max(|minrow|, |maxrow|)`, capped at `MAX_DEPTH`.
pub fn depth_for_bounds(bounds: Bounds) -> Result<u32, CoordError> {
    let colmag = bounds.mincol.unsigned_abs().max(bounds.maxcol.unsigned_abs());
    let rowmag = bounds.minrow.unsigned_abs().max(bounds.maxrow.unsigned_abs());

    for p in 0..=MAX_DEPTH {
        let xradius = 1u64 << p;
        let yradius = 2u64 << p;
        if xradius >= colmag && yradius >= rowmag {
            return Ok(p);
        }
    }

    Err(CoordError::MapTooLarge {
        needed: {
            let mut needed = 0;
            while (1u64 << needed) < colmag || (2u64 << needed) < rowmag {
                needed += 1;
            }
            needed
        },
        cap: MAX_DEPTH,
    })
}

/// The always-symmetric effective window for a given depth.
pub fn effective_bounds(depth: u32) -> Bounds {
    let xradius = (1i64 << depth) as i64;
    let yradius = (2i64 << depth) as i64;
    Bounds {
        mincol: -xradius,
        maxcol: xradius,
        minrow: -yradius,
        maxrow: yradius,
    }
}

/// Starting chunk coordinates of the window addressed by `path`, within `bounds`.
///
/// Each digit selects a quadrant of the space remaining *after* halving: the
/// low bit picks the right/left half on the column axis, the high bit picks
/// the bottom/top half on the row axis. Halving before adding keeps every
/// prefix's window inside `bounds` (adding the pre-halved size would walk
/// the cursor clean out of the map after the second digit).
pub fn window_of_path(bounds: Bounds, path: &[u8]) -> (i64, i64) {
    let mut col = bounds.mincol;
    let mut row = bounds.minrow;
    let mut xsize = bounds.maxcol - bounds.mincol;
    let mut ysize = bounds.maxrow - bounds.minrow;

    for &digit in path {
        xsize /= 2;
        ysize /= 2;
        if digit == 1 || digit == 3 {
            col += xsize;
        }
        if digit == 2 || digit == 3 {
            row += ysize;
        }
    }

    (col, row)
}

/// Iterates over every base-4 number with `len` digits, each digit in `0..4`,
/// in ascending numeric order. Mirrors `iterate_base4` in the original source
/// (`itertools.product(xrange(4), repeat=d)`); `len == 0` yields a single
/// empty path (the root), matching Python's `product(..., repeat=0)`.
pub fn iterate_base4(len: u32) -> impl Iterator<Item = TilePath> {
    let total = 4u64.pow(len);
    (0..total).map(move |mut n| {
        let mut digits = vec![0u8; len as usize];
        for slot in digits.iter_mut().rev() {
            *slot = (n % 4) as u8;
            n /= 4;
        }
        digits
    })
}

/// All chunks relevant to the rectangle `[colstart, colend] x [rowstart-16, rowend]`.
/// The inclusive column range and the flat 16-row backward extension are both
/// intentional: the extension exists to catch tall builds bleeding upward
/// into the tile above, and is left unscaled by depth so that margin doesn't
/// shrink at shallow zoom levels.
pub fn chunks_in_window(
    world: &dyn WorldSource,
    colstart: i64,
    colend: i64,
    rowstart: i64,
    rowend: i64,
) -> Vec<ChunkRef> {
    let mut chunks = Vec::new();

    for row in (rowstart - 16)..=rowend {
        for col in colstart..=colend {
            // Chunks only occupy cells where col and row share parity.
            if row.rem_euclid(2) != col.rem_euclid(2) {
                continue;
            }

            let (chunkx, chunky) = world.unconvert_coords(col, row);
            if let Some(region) = world.region_path(chunkx.div_euclid(32), chunky.div_euclid(32)) {
                chunks.push(ChunkRef {
                    col,
                    row,
                    chunkx,
                    chunky,
                    region,
                });
            }
        }
    }

    chunks
}
