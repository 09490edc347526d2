use std::{fmt::Debug, sync::Arc};

use geo::{AffineTransform, Coord};

/// Point transform between two 2D coordinate spaces.
///
/// Points outside the domain map to NaN coordinates.
pub trait Transform2D: Send + Sync + Debug {
    fn transform(&self, coord: Coord) -> Coord;
}

impl Transform2D for AffineTransform {
    fn transform(&self, coord: Coord) -> Coord {
        self.apply(coord)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform2D for IdentityTransform {
    fn transform(&self, coord: Coord) -> Coord {
        coord
    }
}

/// Applies `first`, then `second`.
#[derive(Debug, Clone)]
pub struct ConcatenatedTransform {
    first: Arc<dyn Transform2D>,
    second: Arc<dyn Transform2D>,
}

impl ConcatenatedTransform {
    pub fn new(first: Arc<dyn Transform2D>, second: Arc<dyn Transform2D>) -> Self {
        Self { first, second }
    }
}

impl Transform2D for ConcatenatedTransform {
    fn transform(&self, coord: Coord) -> Coord {
        let intermediate = self.first.transform(coord);
        if intermediate.x.is_nan() || intermediate.y.is_nan() {
            return intermediate;
        }
        self.second.transform(intermediate)
    }
}

/// Affine transform from a GDAL style geo transform
/// `[xoff, a, b, yoff, d, e]`.
pub fn affine_from_gdal(gdal_transform: [f64; 6]) -> AffineTransform {
    AffineTransform::new(
        gdal_transform[1],
        gdal_transform[2],
        gdal_transform[0],
        gdal_transform[4],
        gdal_transform[5],
        gdal_transform[3],
    )
}

/// Affine transform that first maps subset pixels at `offset` sampled every
/// `step` pixels back to source pixels and then applies `transform`.
pub fn subset_affine(transform: &AffineTransform, offset: (f64, f64), step: (f64, f64)) -> AffineTransform {
    let (rx, ry) = offset;
    let (sx, sy) = step;
    AffineTransform::new(
        transform.a() * sx,
        transform.b() * sy,
        transform.a() * rx + transform.b() * ry + transform.xoff(),
        transform.d() * sx,
        transform.e() * sy,
        transform.d() * rx + transform.e() * ry + transform.yoff(),
    )
}
