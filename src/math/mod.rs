pub mod fxy_sum;

pub use fxy_sum::{best_polynomial, FxySum, PolynomialKind};

use crate::bounds::Region;

/// Bilinear interpolation inside a cell with corner values `v00, v10, v01, v11`.
pub fn interpolate_2d(wi: f64, wj: f64, v00: f64, v10: f64, v01: f64, v11: f64) -> f64 {
    v00 + wi * (v10 - v00) + wj * (v01 - v00) + wi * wj * (v11 + v00 - v01 - v10)
}

pub fn floor_and_crop(value: f64, min: usize, max: usize) -> usize {
    let floored = value.floor();
    if floored.is_nan() || floored < min as f64 {
        min
    } else if floored > max as f64 {
        max
    } else {
        floored as usize
    }
}

/// Splits `n` into a `(w, h)` grid roughly following the aspect ratio `a / b`.
pub fn fit_dimension(n: usize, a: f64, b: f64) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let width = ((n as f64 * a / b).sqrt().round() as usize).clamp(1, n);
    let height = n.div_ceil(width).max(1);
    (width, height)
}

/// Grid of `tiles_x * tiles_y` row-major regions covering `width * height`,
/// each grown by `border` on every side, cropped to the area.
pub fn subdivide_rectangle(
    width: usize,
    height: usize,
    tiles_x: usize,
    tiles_y: usize,
    border: usize,
) -> Vec<Region> {
    let mut regions = Vec::with_capacity(tiles_x * tiles_y);
    for j in 0..tiles_y {
        let y0 = (j * height / tiles_y).saturating_sub(border);
        let y1 = ((j + 1) * height / tiles_y + border).min(height);
        for i in 0..tiles_x {
            let x0 = (i * width / tiles_x).saturating_sub(border);
            let x1 = ((i + 1) * width / tiles_x + border).min(width);
            regions.push(Region::new((x0, y0), (x1 - x0, y1 - y0)));
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    fn interpolates_cell_corners_and_centre() {
        assert_abs_diff_eq!(interpolate_2d(0., 0., 1., 2., 3., 4.), 1.);
        assert_abs_diff_eq!(interpolate_2d(1., 1., 1., 2., 3., 4.), 4.);
        assert_abs_diff_eq!(interpolate_2d(0.5, 0.5, 1., 2., 3., 4.), 2.5);
    }

    #[rstest]
    #[case(-3.2, 0)]
    #[case(2.7, 2)]
    #[case(99., 5)]
    #[case(f64::NAN, 0)]
    fn floors_and_crops(#[case] value: f64, #[case] expected: usize) {
        assert_eq!(floor_and_crop(value, 0, 5), expected);
    }

    #[rstest]
    fn subdivision_covers_area() {
        let regions = subdivide_rectangle(10, 7, 2, 2, 1);
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[0], Region::new((0, 0), (6, 4)));
        assert_eq!(regions[3], Region::new((4, 2), (6, 5)));
    }
}
