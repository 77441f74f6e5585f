//! Coordinate algebra (§4.4): conversions between a sample's N-D coordinate, its linear
//! sample index, the `(tile, in_tile)` selector that addresses its tile, and the
//! per-axis tile coordinate.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::math::{ceil_div, exclusive_prefix_product};

/// An N-D coordinate, either in sample space or in tile/in-tile space.
/// `SmallVec` avoids heap allocation for the common case of a handful of axes.
pub type Coord = SmallVec<[usize; 4]>;

/// One axis of a layer's shape (§3 "Dimension").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    /// Human-readable axis name, e.g. `"x"` or `"time"`.
    pub name: String,
    /// Logical extent along this axis.
    pub size: usize,
    /// Tile extent along this axis. Need not divide `size`.
    pub tile_size: usize,
}

impl Dimension {
    /// Construct a dimension, rejecting zero-sized axes or tiles.
    pub fn new(name: impl Into<String>, size: usize, tile_size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::range("dimension size must be positive"));
        }
        if tile_size == 0 {
            return Err(Error::range("dimension tile_size must be positive"));
        }

        Ok(Self { name: name.into(), size, tile_size })
    }

    /// `ceil(size / tile_size)` (§3 "DimensionSet").
    pub fn tiles_along(&self) -> usize {
        ceil_div(self.size, self.tile_size)
    }
}

/// An ordered sequence of [`Dimension`]s describing a layer's shape (§3 "DimensionSet").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionSet {
    dimensions: SmallVec<[Dimension; 4]>,
    tiles_along: Vec<usize>,
    tile_sizes: Vec<usize>,
    sizes: Vec<usize>,
    tile_weight: Vec<usize>,
    in_tile_weight: Vec<usize>,
    sample_weight: Vec<usize>,
}

impl DimensionSet {
    /// Build a dimension set, precomputing the prefix-product weights used by every
    /// coordinate conversion so that `to_tile_selector`/`to_sample_index` are O(k).
    pub fn new(dimensions: impl IntoIterator<Item = Dimension>) -> Result<Self> {
        let dimensions: SmallVec<[Dimension; 4]> = dimensions.into_iter().collect();
        if dimensions.is_empty() {
            return Err(Error::range("a dimension set needs at least one axis"));
        }

        let tiles_along: Vec<usize> = dimensions.iter().map(Dimension::tiles_along).collect();
        let tile_sizes: Vec<usize> = dimensions.iter().map(|d| d.tile_size).collect();
        let sizes: Vec<usize> = dimensions.iter().map(|d| d.size).collect();

        let tile_weight = exclusive_prefix_product(&tiles_along);
        let in_tile_weight = exclusive_prefix_product(&tile_sizes);
        let sample_weight = exclusive_prefix_product(&sizes);

        Ok(Self { dimensions, tiles_along, tile_sizes, sizes, tile_weight, in_tile_weight, sample_weight })
    }

    /// Number of axes.
    pub fn len(&self) -> usize { self.dimensions.len() }

    /// Whether this dimension set has no axes (never true for a validly constructed set).
    pub fn is_empty(&self) -> bool { self.dimensions.is_empty() }

    /// The dimension records in axis order.
    pub fn dimensions(&self) -> &[Dimension] { &self.dimensions }

    /// `ceil(size/tile_size)` for axis `i`.
    pub fn tiles_along(&self, axis: usize) -> usize { self.tiles_along[axis] }

    /// `Π_i tiles_along(i)`.
    pub fn total_tiles(&self) -> usize { self.tiles_along.iter().product() }

    /// `Π_i tile_size(i)`.
    pub fn tile_samples(&self) -> usize { self.tile_sizes.iter().product() }

    /// `Π_i size(i)`.
    pub fn total_samples(&self) -> usize { self.sizes.iter().product() }

    /// True iff `0 ≤ coord[i] < size[i]` for every axis and `coord` has exactly `len()` entries.
    pub fn contains_coordinate(&self, coord: &[usize]) -> bool {
        coord.len() == self.len() && coord.iter().zip(&self.sizes).all(|(c, size)| c < size)
    }

    fn check_len(&self, coord: &[usize]) -> Result<()> {
        if coord.len() != self.len() {
            return Err(Error::range(format!(
                "coordinate has {} axes, expected {}", coord.len(), self.len()
            )));
        }
        Ok(())
    }

    /// `SampleCoord → TileSelector` (§4.4).
    pub fn sample_to_tile_selector(&self, coord: &[usize]) -> Result<TileSelector> {
        self.check_len(coord)?;

        let mut tile = 0usize;
        let mut in_tile = 0usize;

        for axis in 0..self.len() {
            if coord[axis] >= self.sizes[axis] {
                return Err(Error::range(format!(
                    "coordinate axis {} is {}, valid range is [0, {})", axis, coord[axis], self.sizes[axis]
                )));
            }

            tile += (coord[axis] / self.tile_sizes[axis]) * self.tile_weight[axis];
            in_tile += (coord[axis] % self.tile_sizes[axis]) * self.in_tile_weight[axis];
        }

        Ok(TileSelector { tile, in_tile })
    }

    /// `SampleCoord → SampleIndex`, axis 0 fastest (§4.4).
    pub fn sample_to_index(&self, coord: &[usize]) -> Result<usize> {
        self.check_len(coord)?;

        let mut index = 0usize;
        for axis in 0..self.len() {
            if coord[axis] >= self.sizes[axis] {
                return Err(Error::range(format!(
                    "coordinate axis {} is {}, valid range is [0, {})", axis, coord[axis], self.sizes[axis]
                )));
            }
            index += coord[axis] * self.sample_weight[axis];
        }

        Ok(index)
    }

    /// `SampleIndex → SampleCoord`, the inverse of [`Self::sample_to_index`]; peels the
    /// highest-weight axis down first (§4.4).
    pub fn index_to_sample(&self, mut index: usize) -> Result<Coord> {
        let total = self.total_samples();
        if index >= total {
            return Err(Error::range(format!("sample index {index} is out of range [0, {total})")));
        }

        let mut coord = Coord::from_elem(0, self.len());
        for axis in (0..self.len()).rev() {
            coord[axis] = index / self.sample_weight[axis];
            index %= self.sample_weight[axis];
        }

        Ok(coord)
    }

    /// `TileCoord → TileSelector` (§4.4), same prefix-product formula as the sample conversion.
    pub fn tile_coord_to_selector(&self, coord: &TileCoord) -> Result<TileSelector> {
        self.check_len(&coord.tile)?;
        self.check_len(&coord.in_tile)?;

        let mut tile = 0usize;
        let mut in_tile = 0usize;

        for axis in 0..self.len() {
            tile += coord.tile[axis] * self.tile_weight[axis];
            in_tile += coord.in_tile[axis] * self.in_tile_weight[axis];
        }

        Ok(TileSelector { tile, in_tile })
    }

    /// `TileSelector → TileCoord` (§4.4), the inverse of [`Self::tile_coord_to_selector`].
    pub fn selector_to_tile_coord(&self, selector: &TileSelector) -> Result<TileCoord> {
        let total_tiles = self.total_tiles();
        if selector.tile >= total_tiles {
            return Err(Error::range(format!("tile {} is out of range [0, {total_tiles})", selector.tile)));
        }

        let tile_samples = self.tile_samples();
        if selector.in_tile >= tile_samples {
            return Err(Error::range(format!("in-tile index {} is out of range [0, {tile_samples})", selector.in_tile)));
        }

        let mut tile = Coord::from_elem(0, self.len());
        let mut remaining_tile = selector.tile;
        for axis in (0..self.len()).rev() {
            tile[axis] = remaining_tile / self.tile_weight[axis];
            remaining_tile %= self.tile_weight[axis];
        }

        let mut in_tile = Coord::from_elem(0, self.len());
        let mut remaining_in_tile = selector.in_tile;
        for axis in (0..self.len()).rev() {
            in_tile[axis] = remaining_in_tile / self.in_tile_weight[axis];
            remaining_in_tile %= self.in_tile_weight[axis];
        }

        Ok(TileCoord { tile, in_tile })
    }

    /// Reassemble the sample coordinate a `TileCoord` addresses (may fall in the
    /// padding of a truncated last tile; callers should check [`Self::contains_coordinate`]).
    pub fn tile_coord_to_sample(&self, coord: &TileCoord) -> Coord {
        let mut sample = Coord::from_elem(0, self.len());
        for axis in 0..self.len() {
            sample[axis] = coord.tile[axis] * self.tile_sizes[axis] + coord.in_tile[axis];
        }
        sample
    }

    /// Iterate every valid sample coordinate in sample-major order (axis 0 fastest).
    /// Finite and non-restartable; clone the returned iterator's state to restart.
    pub fn sample_coordinates(&self) -> SampleCoordinates<'_> {
        SampleCoordinates { dimensions: self, next_index: 0, total: self.total_samples() }
    }

    /// Iterate every `(tile, in_tile)` cell of the full storage footprint (including
    /// padding past a truncated last tile) in tile-major order.
    pub fn tile_coordinates(&self) -> TileCoordinates<'_> {
        TileCoordinates {
            dimensions: self,
            next_selector: 0,
            total: self.total_tiles() * self.tile_samples(),
        }
    }
}

/// A tile index plus a linear within-tile sample index (§4.4 "TileSelector").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSelector {
    /// Index of the tile, in `[0, total_tiles)`.
    pub tile: usize,
    /// Linear index of the sample within that tile, in `[0, tile_samples)`.
    pub in_tile: usize,
}

/// Per-axis tile index and per-axis within-tile index (§4.4 "TileCoord").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCoord {
    /// Per-axis tile index.
    pub tile: Coord,
    /// Per-axis within-tile index.
    pub in_tile: Coord,
}

/// Iterator over every valid sample coordinate, sample-major (axis 0 fastest).
#[derive(Debug, Clone)]
pub struct SampleCoordinates<'d> {
    dimensions: &'d DimensionSet,
    next_index: usize,
    total: usize,
}

impl<'d> Iterator for SampleCoordinates<'d> {
    type Item = Coord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.total { return None; }

        let coord = self.dimensions.index_to_sample(self.next_index)
            .expect("index_to_sample must succeed for indices below total_samples");
        self.next_index += 1;
        Some(coord)
    }
}

/// Iterator over every `(tile, in_tile)` cell, tile-major: all cells of tile 0 before tile 1.
#[derive(Debug, Clone)]
pub struct TileCoordinates<'d> {
    dimensions: &'d DimensionSet,
    next_selector: usize,
    total: usize,
}

impl<'d> Iterator for TileCoordinates<'d> {
    type Item = TileSelector;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_selector >= self.total { return None; }

        let tile_samples = self.dimensions.tile_samples();
        let selector = TileSelector {
            tile: self.next_selector / tile_samples,
            in_tile: self.next_selector % tile_samples,
        };

        self.next_selector += 1;
        Some(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: usize, tile: usize) -> DimensionSet {
        DimensionSet::new(vec![
            Dimension::new("x", size, tile).unwrap(),
            Dimension::new("y", size, tile).unwrap(),
        ]).unwrap()
    }

    #[test]
    fn exact_tiling_has_no_padding() {
        let dims = square(4, 2);
        assert_eq!(dims.total_tiles(), 4);
        assert_eq!(dims.tile_samples(), 4);
        assert_eq!(dims.total_samples(), 16);
    }

    #[test]
    fn non_divisible_tile_size_rounds_up() {
        let dims = DimensionSet::new(vec![Dimension::new("x", 10, 4).unwrap()]).unwrap();
        assert_eq!(dims.tiles_along(0), 3);
    }

    #[test]
    fn coordinate_tile_round_trip_is_identity() {
        let dims = square(4, 2);

        for coord in dims.sample_coordinates() {
            let selector = dims.sample_to_tile_selector(&coord).unwrap();
            let tile_coord = dims.selector_to_tile_coord(&selector).unwrap();
            let selector_again = dims.tile_coord_to_selector(&tile_coord).unwrap();
            let round_tripped = dims.tile_coord_to_sample(&tile_coord);

            assert_eq!(selector, selector_again);
            assert_eq!(round_tripped, coord);
        }
    }

    #[test]
    fn sample_index_round_trip_is_identity() {
        let dims = square(4, 2);

        for index in 0..dims.total_samples() {
            let coord = dims.index_to_sample(index).unwrap();
            let index_again = dims.sample_to_index(&coord).unwrap();
            assert_eq!(index, index_again);
        }
    }

    #[test]
    fn tile_coordinates_cover_full_storage_footprint() {
        let dims = DimensionSet::new(vec![Dimension::new("x", 10, 4).unwrap()]).unwrap();
        let all: Vec<_> = dims.tile_coordinates().collect();
        assert_eq!(all.len(), dims.total_tiles() * dims.tile_samples());
        assert_eq!(all.len(), 3 * 4);
    }

    #[test]
    fn sample_coordinates_only_visit_logical_extent() {
        let dims = DimensionSet::new(vec![Dimension::new("x", 10, 4).unwrap()]).unwrap();
        let all: Vec<_> = dims.sample_coordinates().collect();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn contains_coordinate_respects_bounds() {
        let dims = square(4, 2);
        assert!(dims.contains_coordinate(&[0, 0]));
        assert!(dims.contains_coordinate(&[3, 3]));
        assert!(!dims.contains_coordinate(&[4, 0]));
        assert!(!dims.contains_coordinate(&[0]));
    }
}
