use std::{
    fmt::Debug,
    sync::{Arc, OnceLock},
};

use geo::{AffineTransform, Coord};
use serde::{Deserialize, Serialize};

use crate::{
    bounds::Region,
    errors::{DataModelError, Result},
    geocoding::GeoCoding,
    intersection::Intersection,
    positions::PixelPos,
    transforms::{ConcatenatedTransform, IdentityTransform, Transform2D},
};

/// Forward (raster to scene grid) and inverse transforms of a raster.
///
/// Either leg may be absent; callers get [`DataModelError::TransformUnavailable`]
/// and can fall back to a coarser registration.
#[derive(Debug, Clone)]
pub struct SceneRasterTransform {
    forward: Option<Arc<dyn Transform2D>>,
    inverse: Option<Arc<dyn Transform2D>>,
}

impl SceneRasterTransform {
    pub fn new(forward: Option<Arc<dyn Transform2D>>, inverse: Option<Arc<dyn Transform2D>>) -> Self {
        Self { forward, inverse }
    }

    pub fn identity() -> &'static SceneRasterTransform {
        static IDENTITY: OnceLock<SceneRasterTransform> = OnceLock::new();
        IDENTITY.get_or_init(|| {
            let identity: Arc<dyn Transform2D> = Arc::new(IdentityTransform);
            SceneRasterTransform::new(Some(Arc::clone(&identity)), Some(identity))
        })
    }

    /// Inverse present only if `transform` is invertible.
    pub fn from_affine(transform: AffineTransform) -> Self {
        let inverse = transform
            .inverse()
            .map(|inverse| Arc::new(inverse) as Arc<dyn Transform2D>);
        Self::new(Some(Arc::new(transform)), inverse)
    }

    /// True for the singleton and its clones.
    pub fn is_identity(&self) -> bool {
        match (&self.forward, &Self::identity().forward) {
            (Some(forward), Some(identity)) => Arc::ptr_eq(forward, identity),
            _ => false,
        }
    }

    pub fn forward(&self) -> Option<&Arc<dyn Transform2D>> {
        self.forward.as_ref()
    }

    pub fn inverse(&self) -> Option<&Arc<dyn Transform2D>> {
        self.inverse.as_ref()
    }

    pub fn forward_transform(&self, pixel_pos: &PixelPos) -> Result<PixelPos> {
        let forward = self
            .forward
            .as_ref()
            .ok_or(DataModelError::TransformUnavailable("forward"))?;
        Ok(PixelPos::from(forward.transform(Coord::from(*pixel_pos))))
    }

    pub fn inverse_transform(&self, pixel_pos: &PixelPos) -> Result<PixelPos> {
        let inverse = self
            .inverse
            .as_ref()
            .ok_or(DataModelError::TransformUnavailable("inverse"))?;
        Ok(PixelPos::from(inverse.transform(Coord::from(*pixel_pos))))
    }

    /// `self` followed by `next`. A leg exists only if it exists in both.
    pub fn then(&self, next: &SceneRasterTransform) -> SceneRasterTransform {
        if self.is_identity() {
            return next.clone();
        }
        if next.is_identity() {
            return self.clone();
        }
        let forward = self
            .forward
            .as_ref()
            .zip(next.forward.as_ref())
            .map(|(first, second)| {
                Arc::new(ConcatenatedTransform::new(Arc::clone(first), Arc::clone(second)))
                    as Arc<dyn Transform2D>
            });
        let inverse = next
            .inverse
            .as_ref()
            .zip(self.inverse.as_ref())
            .map(|(first, second)| {
                Arc::new(ConcatenatedTransform::new(Arc::clone(first), Arc::clone(second)))
                    as Arc<dyn Transform2D>
            });
        Self::new(forward, inverse)
    }
}

/// Region and sub-sampling used to derive a smaller or coarser scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetDef {
    region: Option<Region>,
    sub_sampling_x: usize,
    sub_sampling_y: usize,
}

impl SubsetDef {
    pub fn new(region: Option<Region>, sub_sampling_x: usize, sub_sampling_y: usize) -> Result<Self> {
        if sub_sampling_x == 0 || sub_sampling_y == 0 {
            return Err(DataModelError::invalid("sub-sampling factors must be at least 1"));
        }
        if region.is_some_and(|region| region.is_empty()) {
            return Err(DataModelError::invalid("subset region is empty"));
        }
        Ok(Self {
            region,
            sub_sampling_x,
            sub_sampling_y,
        })
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn sub_sampling(&self) -> (usize, usize) {
        (self.sub_sampling_x, self.sub_sampling_y)
    }

    /// Subset region cropped to a `width * height` scene.
    pub fn effective_region(&self, width: usize, height: usize) -> Result<Region> {
        let scene = Region::new((0, 0), (width, height));
        match self.region {
            Some(region) => region.intersection(&scene),
            None => Ok(scene),
        }
    }

    /// Size of the scene derived from a `width * height` source.
    pub fn scene_size(&self, width: usize, height: usize) -> Result<(usize, usize)> {
        let (region_width, region_height) = self.effective_region(width, height)?.shape();
        Ok((
            (region_width - 1) / self.sub_sampling_x + 1,
            (region_height - 1) / self.sub_sampling_y + 1,
        ))
    }
}

/// Raster scene a geo-coding is attached to.
#[derive(Debug, Clone)]
pub struct Scene {
    width: usize,
    height: usize,
    geo_coding: Option<Arc<dyn GeoCoding>>,
    scene_raster_transform: SceneRasterTransform,
}

impl Scene {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            geo_coding: None,
            scene_raster_transform: SceneRasterTransform::identity().clone(),
        }
    }

    /// Scene for `subset` of `source`, without geo-coding.
    pub fn subset_of(source: &Scene, subset: Option<&SubsetDef>) -> Result<Self> {
        match subset {
            Some(subset) => {
                let (width, height) = subset.scene_size(source.width, source.height)?;
                Ok(Self::new(width, height))
            }
            None => Ok(Self::new(source.width, source.height)),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn geo_coding(&self) -> Option<&Arc<dyn GeoCoding>> {
        self.geo_coding.as_ref()
    }

    pub fn set_geo_coding(&mut self, geo_coding: Arc<dyn GeoCoding>) {
        self.geo_coding = Some(geo_coding);
    }

    pub fn scene_raster_transform(&self) -> &SceneRasterTransform {
        &self.scene_raster_transform
    }

    pub fn set_scene_raster_transform(&mut self, transform: SceneRasterTransform) {
        self.scene_raster_transform = transform;
    }

    /// Copies the source geo-coding restricted to `subset` onto `self`.
    pub fn transfer_geo_coding_from(&mut self, source: &Scene, subset: Option<&SubsetDef>) -> bool {
        match source.geo_coding() {
            Some(geo_coding) => Arc::clone(geo_coding).transfer_geo_coding(source, self, subset),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    fn identity_is_a_singleton() {
        let identity = SceneRasterTransform::identity();
        assert!(identity.is_identity());
        assert!(identity.clone().is_identity());
        assert!(!SceneRasterTransform::from_affine(AffineTransform::identity()).is_identity());
        let pos = identity.forward_transform(&PixelPos::new(3., 4.)).unwrap();
        assert_eq!(pos, PixelPos::new(3., 4.));
    }

    #[rstest]
    fn missing_legs_are_reported() {
        let transform = SceneRasterTransform::new(Some(Arc::new(IdentityTransform)), None);
        assert!(transform.forward_transform(&PixelPos::new(1., 1.)).is_ok());
        assert_eq!(
            transform.inverse_transform(&PixelPos::new(1., 1.)),
            Err(DataModelError::TransformUnavailable("inverse"))
        );
    }

    #[rstest]
    fn non_invertible_affine_has_no_inverse() {
        let transform = SceneRasterTransform::from_affine(AffineTransform::new(1., 1., 0., 1., 1., 0.));
        assert!(transform.forward().is_some());
        assert!(transform.inverse().is_none());
    }

    #[rstest]
    fn composition_keeps_shared_legs() {
        let halve = SceneRasterTransform::from_affine(AffineTransform::new(0.5, 0., 0., 0., 0.5, 0.));
        let shift = SceneRasterTransform::from_affine(AffineTransform::new(1., 0., 3., 0., 1., -1.));
        let chained = halve.then(&shift);
        let forward = chained.forward_transform(&PixelPos::new(4., 8.)).unwrap();
        assert_abs_diff_eq!(forward.x, 5.);
        assert_abs_diff_eq!(forward.y, 3.);
        let back = chained.inverse_transform(&forward).unwrap();
        assert_abs_diff_eq!(back.x, 4.);
        assert_abs_diff_eq!(back.y, 8.);

        let one_way = SceneRasterTransform::new(halve.forward().cloned(), None);
        assert!(one_way.then(&shift).inverse().is_none());
    }

    #[rstest]
    #[case(None, 1, 1, (100, 50))]
    #[case(None, 3, 2, (34, 25))]
    #[case(Some(Region::new((10, 10), (20, 20))), 1, 1, (20, 20))]
    #[case(Some(Region::new((90, 40), (20, 20))), 2, 2, (5, 5))]
    fn subset_scene_size(
        #[case] region: Option<Region>,
        #[case] sub_x: usize,
        #[case] sub_y: usize,
        #[case] expected: (usize, usize),
    ) {
        let subset = SubsetDef::new(region, sub_x, sub_y).unwrap();
        assert_eq!(subset.scene_size(100, 50).unwrap(), expected);
    }

    #[rstest]
    fn rejects_zero_sub_sampling() {
        assert!(SubsetDef::new(None, 0, 1).is_err());
    }
}
