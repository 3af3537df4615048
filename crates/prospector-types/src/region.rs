//! Rectangular regions of the coordinate space.
//!
//! A [`Region`] starts life as an unexplored tile of the world. After an
//! explore call its `treasure_count` is set once, and from then on it moves
//! by value: producer -> queue -> digger. It is never shared.

use serde::{Deserialize, Serialize};

use crate::wire::Area;

/// A rectangular tile of the world together with its explored treasure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Left edge (inclusive).
    pub x: i64,
    /// Top edge (inclusive).
    pub y: i64,
    /// Width in cells.
    pub w: i64,
    /// Height in cells.
    pub h: i64,
    /// Treasures reported by the last explore of this region.
    pub treasure_count: u64,
}

/// A single 1x1 cell and how many treasures an explore reported there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Column.
    pub x: i64,
    /// Row.
    pub y: i64,
    /// Treasures reported at this cell.
    pub treasures: u64,
}

impl Region {
    /// Create an unexplored region.
    pub const fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            treasure_count: 0,
        }
    }

    /// Return a copy of this region carrying the given explored count.
    #[must_use]
    pub const fn with_treasures(mut self, treasure_count: u64) -> Self {
        self.treasure_count = treasure_count;
        self
    }

    /// The wire representation used by the explore call.
    pub const fn area(&self) -> Area {
        Area {
            pos_x: self.x,
            pos_y: self.y,
            size_x: self.w,
            size_y: self.h,
        }
    }

    /// Number of cells covered by the region.
    pub const fn cell_count(&self) -> i64 {
        self.w.saturating_mul(self.h)
    }

    /// Cell coordinates in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (i64, i64)> + use<> {
        let (x0, y0) = (self.x, self.y);
        let (x1, y1) = (self.x.saturating_add(self.w), self.y.saturating_add(self.h));
        (y0..y1).flat_map(move |y| (x0..x1).map(move |x| (x, y)))
    }

    /// Tile the rectangle `[x, x + width) x [y, y + height)` into blocks of
    /// `block_w x block_h`. Blocks on the far edges are clipped to the world.
    ///
    /// Returns an empty list when any dimension is not positive.
    pub fn tile(x: i64, y: i64, width: i64, height: i64, block_w: i64, block_h: i64) -> Vec<Self> {
        if width <= 0 || height <= 0 || block_w <= 0 || block_h <= 0 {
            return Vec::new();
        }
        let x_end = x.saturating_add(width);
        let y_end = y.saturating_add(height);

        let mut regions = Vec::new();
        let mut bx = x;
        while bx < x_end {
            let w = block_w.min(x_end.saturating_sub(bx));
            let mut by = y;
            while by < y_end {
                let h = block_h.min(y_end.saturating_sub(by));
                regions.push(Self::new(bx, by, w, h));
                by = by.saturating_add(block_h);
            }
            bx = bx.saturating_add(block_w);
        }
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_row_major() {
        let region = Region::new(0, 0, 2, 2);
        let cells: Vec<_> = region.cells().collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn tile_covers_world_exactly() {
        let tiles = Region::tile(0, 0, 10, 7, 4, 4);
        // 3 columns (4, 4, 2) x 2 rows (4, 3)
        assert_eq!(tiles.len(), 6);
        let covered: i64 = tiles.iter().map(Region::cell_count).sum();
        assert_eq!(covered, 70);
        assert!(tiles.iter().all(|r| r.treasure_count == 0));
        assert!(tiles.iter().any(|r| r.x == 8 && r.w == 2));
        assert!(tiles.iter().any(|r| r.y == 4 && r.h == 3));
    }

    #[test]
    fn tile_with_offset_origin() {
        let tiles = Region::tile(100, 200, 4, 4, 2, 2);
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|r| r.x >= 100 && r.y >= 200));
    }

    #[test]
    fn tile_rejects_empty_dimensions() {
        assert!(Region::tile(0, 0, 0, 10, 2, 2).is_empty());
        assert!(Region::tile(0, 0, 10, 10, 0, 2).is_empty());
    }

    #[test]
    fn area_mirrors_region() {
        let area = Region::new(3, 4, 5, 6).area();
        assert_eq!((area.pos_x, area.pos_y, area.size_x, area.size_y), (3, 4, 5, 6));
    }
}
