use std::{
    f64::consts::FRAC_PI_4,
    fmt::Debug,
    sync::{Arc, OnceLock},
};

use geo::Coord;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{DataModelError, Result},
    transforms::{ConcatenatedTransform, IdentityTransform, Transform2D},
};

pub const WGS84_ID: &str = "EPSG:4326";
pub const WEB_MERCATOR_ID: &str = "EPSG:3857";
const WGS84_SEMI_MAJOR: f64 = 6_378_137.0;

/// Identifier of a coordinate reference system, e.g. `EPSG:4326`.
///
/// Geographic coordinates use the traditional GIS axis order, `x = lon`, `y = lat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(Arc<str>);

impl Crs {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn wgs84() -> Self {
        Self::new(WGS84_ID)
    }

    pub fn id(&self) -> &str {
        self.0.as_ref()
    }
}

/// Pixel space of a raster, derived from `base` through the
/// pixel transform of the geo-coding owning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCrs {
    pub name: String,
    pub base: Crs,
}

/// Coordinate transform lookup service.
pub trait TransformLookup: Send + Sync + Debug {
    /// Fails with [`DataModelError::NoTransformFound`] when there is no path.
    fn find_transform(&self, source: &Crs, target: &Crs) -> Result<Arc<dyn Transform2D>>;
}

/// Resolves identities and WGS-84 <-> Web Mercator without external libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLookup;

impl TransformLookup for BuiltinLookup {
    fn find_transform(&self, source: &Crs, target: &Crs) -> Result<Arc<dyn Transform2D>> {
        match (source.id(), target.id()) {
            (source, target) if source.eq_ignore_ascii_case(target) => Ok(Arc::new(IdentityTransform)),
            (WGS84_ID, WEB_MERCATOR_ID) => Ok(Arc::new(GeographicToMercator)),
            (WEB_MERCATOR_ID, WGS84_ID) => Ok(Arc::new(MercatorToGeographic)),
            (source, target) => Err(DataModelError::NoTransformFound {
                from: source.to_string(),
                to: target.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GeographicToMercator;

impl Transform2D for GeographicToMercator {
    fn transform(&self, coord: Coord) -> Coord {
        if coord.y.abs() >= 90. {
            return Coord {
                x: f64::NAN,
                y: f64::NAN,
            };
        }
        Coord {
            x: WGS84_SEMI_MAJOR * coord.x.to_radians(),
            y: WGS84_SEMI_MAJOR * (FRAC_PI_4 + coord.y.to_radians() / 2.).tan().ln(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MercatorToGeographic;

impl Transform2D for MercatorToGeographic {
    fn transform(&self, coord: Coord) -> Coord {
        Coord {
            x: (coord.x / WGS84_SEMI_MAJOR).to_degrees(),
            y: (2. * (coord.y / WGS84_SEMI_MAJOR).exp().atan() - 2. * FRAC_PI_4).to_degrees(),
        }
    }
}

#[cfg(feature = "proj")]
pub use proj_lookup::ProjLookup;

#[cfg(feature = "proj")]
mod proj_lookup {
    use std::sync::Mutex;

    use proj::Proj;

    use super::*;

    /// Any pair PROJ knows about.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ProjLookup;

    impl TransformLookup for ProjLookup {
        fn find_transform(&self, source: &Crs, target: &Crs) -> Result<Arc<dyn Transform2D>> {
            if source == target {
                return Ok(Arc::new(IdentityTransform));
            }
            let proj = Proj::new_known_crs(source.id(), target.id(), None).map_err(|_| {
                DataModelError::NoTransformFound {
                    from: source.id().to_string(),
                    to: target.id().to_string(),
                }
            })?;
            Ok(Arc::new(ProjTransform(Mutex::new(proj))))
        }
    }

    struct ProjTransform(Mutex<Proj>);

    impl Debug for ProjTransform {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ProjTransform").finish()
        }
    }

    impl Transform2D for ProjTransform {
        fn transform(&self, coord: Coord) -> Coord {
            let converted = self
                .0
                .lock()
                .ok()
                .and_then(|proj| proj.convert((coord.x, coord.y)).ok());
            match converted {
                Some((x, y)) => Coord { x, y },
                None => Coord {
                    x: f64::NAN,
                    y: f64::NAN,
                },
            }
        }
    }
}

/// Reference systems of a geo-coding and its lazily resolved image to map transform.
pub struct GeoCodingCrs {
    image_crs: ImageCrs,
    map_crs: Crs,
    geo_crs: Crs,
    lookup: Arc<dyn TransformLookup>,
    image_to_map: OnceLock<Result<Arc<dyn Transform2D>>>,
}

impl Debug for GeoCodingCrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoCodingCrs")
            .field("image_crs", &self.image_crs)
            .field("map_crs", &self.map_crs)
            .field("geo_crs", &self.geo_crs)
            .field("resolved", &self.image_to_map.get().is_some())
            .finish()
    }
}

impl Clone for GeoCodingCrs {
    /// The clone resolves its own transform.
    fn clone(&self) -> Self {
        Self {
            image_crs: self.image_crs.clone(),
            map_crs: self.map_crs.clone(),
            geo_crs: self.geo_crs.clone(),
            lookup: Arc::clone(&self.lookup),
            image_to_map: OnceLock::new(),
        }
    }
}

impl GeoCodingCrs {
    pub fn new(image_base: Crs, map_crs: Crs, geo_crs: Crs, lookup: Arc<dyn TransformLookup>) -> Self {
        Self {
            image_crs: ImageCrs {
                name: String::from("Image CS"),
                base: image_base,
            },
            map_crs,
            geo_crs,
            lookup,
            image_to_map: OnceLock::new(),
        }
    }

    /// Image derived from, and mapped onto, the geographic CRS.
    pub fn geographic(geo_crs: Crs, lookup: Arc<dyn TransformLookup>) -> Self {
        Self::new(geo_crs.clone(), geo_crs.clone(), geo_crs, lookup)
    }

    /// WGS-84 with the builtin lookup.
    pub fn wgs84() -> Self {
        Self::geographic(Crs::wgs84(), Arc::new(BuiltinLookup))
    }

    /// Meant for initialization, before the transform is first used.
    pub fn with_image_crs(mut self, image_crs: ImageCrs) -> Self {
        self.image_crs = image_crs;
        self.image_to_map = OnceLock::new();
        self
    }

    /// Meant for initialization, before the transform is first used.
    pub fn with_geo_crs(mut self, geo_crs: Crs) -> Self {
        self.geo_crs = geo_crs;
        self.image_to_map = OnceLock::new();
        self
    }

    pub fn image_crs(&self) -> &ImageCrs {
        &self.image_crs
    }

    pub fn map_crs(&self) -> &Crs {
        &self.map_crs
    }

    pub fn geo_crs(&self) -> &Crs {
        &self.geo_crs
    }

    pub fn lookup(&self) -> &Arc<dyn TransformLookup> {
        &self.lookup
    }

    /// Image to map transform, resolved at most once: `pixel_to_base`
    /// followed by the looked up base to map transform.
    ///
    /// A failed lookup is cached as well.
    pub fn image_to_map(
        &self,
        pixel_to_base: impl FnOnce() -> Arc<dyn Transform2D>,
    ) -> Result<Arc<dyn Transform2D>> {
        self.image_to_map
            .get_or_init(|| {
                let base_to_map = self
                    .lookup
                    .find_transform(&self.image_crs.base, &self.map_crs)?;
                info!(
                    "resolved image to map transform {} -> {}",
                    self.image_crs.base.id(),
                    self.map_crs.id()
                );
                let transform: Arc<dyn Transform2D> =
                    Arc::new(ConcatenatedTransform::new(pixel_to_base(), base_to_map));
                Ok(transform)
            })
            .clone()
    }
}
