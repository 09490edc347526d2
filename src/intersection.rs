use geo::{Coord, CoordNum, Rect};

use crate::errors::{DataModelError, Result};

pub trait Intersection {
    type Output;
    fn intersection(&self, rhs: &Self) -> Result<Self::Output>;
}

impl<T: CoordNum> Intersection for Rect<T> {
    type Output = Rect<T>;
    /// Rectangles that only touch do not intersect.
    fn intersection(&self, rhs: &Self) -> Result<Rect<T>> {
        let lhs_max = self.max();
        let rhs_min = rhs.min();
        if (lhs_max.x <= rhs_min.x) | (lhs_max.y <= rhs_min.y) {
            return Err(DataModelError::NoIntersection);
        }

        let lhs_min = self.min();
        let rhs_max = rhs.max();
        if (lhs_min.x >= rhs_max.x) | (lhs_min.y >= rhs_max.y) {
            return Err(DataModelError::NoIntersection);
        }

        let min = operate(lhs_min, rhs_min, |x, y| if x > y { x } else { y });
        let max = operate(lhs_max, rhs_max, |x, y| if x < y { x } else { y });

        Ok(Self::new(min, max))
    }
}

fn operate<T: CoordNum>(lhs: Coord<T>, rhs: Coord<T>, op: impl Fn(T, T) -> T) -> Coord<T> {
    Coord {
        x: op(lhs.x, rhs.x),
        y: op(lhs.y, rhs.y),
    }
}
