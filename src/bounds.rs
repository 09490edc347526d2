use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;

use crate::{errors::Result, intersection::Intersection};

/// Integer pixel rectangle of a raster, origin at the top left pixel.
///
/// `offset` is the top left pixel of the rectangle and `shape` is
/// `(width, height)`. The maximum corner is exclusive.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region(Rect<usize>);

impl Region {
    pub fn new(offset: (usize, usize), shape: (usize, usize)) -> Self {
        let offset = Coord::from(offset);
        let max = offset + Coord::from(shape);
        Self(Rect::new(offset, max))
    }

    pub fn x(&self) -> usize {
        self.0.min().x
    }

    pub fn y(&self) -> usize {
        self.0.min().y
    }

    /// Coords of the top left pixel of the region.
    pub fn offset(&self) -> Coord<usize> {
        self.0.min()
    }

    /// (width, height)
    pub fn shape(&self) -> (usize, usize) {
        (self.0.width(), self.0.height())
    }

    /// Pixel area of the region.
    pub fn size(&self) -> usize {
        self.0.width() * self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        let (min, max) = (self.0.min(), self.0.max());
        x >= min.x && x < max.x && y >= min.y && y < max.y
    }

    /// Splits the region into row-major tiles of at most `tile_shape`.
    pub fn tiles(&self, tile_shape: (usize, usize)) -> Vec<Region> {
        let (tile_width, tile_height) = (tile_shape.0.max(1), tile_shape.1.max(1));
        let (width, height) = self.shape();
        let mut tiles = Vec::with_capacity(width.div_ceil(tile_width) * height.div_ceil(tile_height));
        for y in (0..height).step_by(tile_height) {
            for x in (0..width).step_by(tile_width) {
                tiles.push(Region::new(
                    (self.x() + x, self.y() + y),
                    (tile_width.min(width - x), tile_height.min(height - y)),
                ));
            }
        }
        tiles
    }
}

impl Intersection for Region {
    type Output = Region;
    fn intersection(&self, rhs: &Self) -> Result<Self::Output> {
        Ok(Region(self.0.intersection(&rhs.0)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DataModelError;
    use rstest::rstest;

    #[rstest]
    fn tiles_cover_region_without_overlap() {
        let region = Region::new((3, 2), (10, 7));
        let tiles = region.tiles((4, 3));
        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles.iter().map(Region::size).sum::<usize>(), region.size());
        assert_eq!(tiles[2], Region::new((11, 2), (2, 3)));
        assert_eq!(tiles[8], Region::new((11, 8), (2, 1)));
    }

    #[rstest]
    fn intersects_overlapping_regions() {
        let lhs = Region::new((0, 0), (10, 10));
        let rhs = Region::new((5, 8), (10, 10));
        assert_eq!(lhs.intersection(&rhs), Ok(Region::new((5, 8), (5, 2))));
    }

    #[rstest]
    fn touching_regions_do_not_intersect() {
        let lhs = Region::new((0, 0), (10, 10));
        let rhs = Region::new((10, 0), (10, 10));
        assert_eq!(lhs.intersection(&rhs), Err(DataModelError::NoIntersection));
    }
}
