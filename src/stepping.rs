use serde::{Deserialize, Serialize};

use crate::{
    bounds::Region,
    errors::{DataModelError, Result},
};

/// Subsampling plan over a region visiting at most a given number of points.
///
/// Uses the same step along both axes: the smallest one that keeps
/// `num_x * num_y` within budget. The sampled grid is centred in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stepping {
    start_x: usize,
    start_y: usize,
    step_x: usize,
    step_y: usize,
    num_x: usize,
    num_y: usize,
}

impl Stepping {
    pub fn new(region: &Region, max_points: usize) -> Result<Self> {
        if region.is_empty() {
            return Err(DataModelError::invalid("stepping over an empty region"));
        }
        if max_points == 0 {
            return Err(DataModelError::invalid("stepping needs at least one point"));
        }
        let (width, height) = region.shape();
        let num_points = |step: usize| width.div_ceil(step) * height.div_ceil(step);

        // num_points is non-increasing in step, and 1 at max(width, height).
        let (mut low, mut high) = (1, width.max(height));
        while low < high {
            let mid = low + (high - low) / 2;
            if num_points(mid) <= max_points {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        let step = low;
        let (num_x, num_y) = (width.div_ceil(step), height.div_ceil(step));
        Ok(Self {
            start_x: region.x() + (width - 1 - (num_x - 1) * step) / 2,
            start_y: region.y() + (height - 1 - (num_y - 1) * step) / 2,
            step_x: step,
            step_y: step,
            num_x,
            num_y,
        })
    }

    pub fn start(&self) -> (usize, usize) {
        (self.start_x, self.start_y)
    }

    pub fn step(&self) -> (usize, usize) {
        (self.step_x, self.step_y)
    }

    pub fn num(&self) -> (usize, usize) {
        (self.num_x, self.num_y)
    }

    pub fn num_points(&self) -> usize {
        self.num_x * self.num_y
    }

    /// Sampled pixel coordinates, row by row.
    pub fn points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.num_y).flat_map(move |j| {
            (0..self.num_x).map(move |i| {
                (
                    self.start_x + i * self.step_x,
                    self.start_y + j * self.step_y,
                )
            })
        })
    }
}
