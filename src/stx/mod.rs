//! Streaming statistics over tiled, optionally masked rasters.
//!
//! Accumulators consume one [`Tile`] at a time and never reset their running
//! state. They take `&mut self` and do no locking: to use several threads,
//! give each its own accumulator and [`Merge`] the shards afterwards, the
//! way [`StxFactory`] does.

mod factory;
mod histogram;
mod qualitative;
mod summary;
mod tile;

pub use factory::{MaskedTile, Stx, StxConfig, StxFactory};
pub use histogram::{Histogram, HistogramStxOp};
pub use qualitative::{CodingKind, QualitativeStxOp, SampleCoding};
pub use summary::{MomentKind, SummaryStxOp};
pub use tile::{Layout, MaskTile, SampleType, Samples, Tile};

use std::{fmt, str::FromStr};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::errors::{DataModelError, Result};

#[ambassador::delegatable_trait]
pub trait StxOp {
    fn name(&self) -> &str;

    /// Adds the valid samples of `tile`. Fails only if `mask` covers a
    /// different rectangle.
    fn accumulate_data(&mut self, tile: &Tile<'_>, mask: Option<&MaskTile<'_>>) -> Result<()>;
}

/// Combines two partial aggregates of the same kind.
pub trait Merge {
    fn merge(&mut self, other: &Self) -> Result<()>;
}

/// Calls `f` with the tile-relative coordinates of every unmasked pixel.
pub(crate) fn for_each_valid(
    tile: &Tile<'_>,
    mask: Option<&MaskTile<'_>>,
    mut f: impl FnMut(usize, usize),
) -> Result<()> {
    if let Some(mask) = mask {
        if mask.region() != tile.region() {
            return Err(DataModelError::invalid(format!(
                "mask region {:?} differs from tile region {:?}",
                mask.region(),
                tile.region()
            )));
        }
    }
    let (width, height) = tile.region().shape();
    trace!(
        "accumulating {width} x {height} tile at ({}, {}), masked: {}",
        tile.region().x(),
        tile.region().y(),
        mask.is_some()
    );
    for y in 0..height {
        for x in 0..width {
            if mask.map_or(true, |mask| mask.is_valid(x, y)) {
                f(x, y);
            }
        }
    }
    Ok(())
}

/// The closed set of statistics operations, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StxOpType {
    Summary,
    Histogram,
    Qualitative,
}

impl FromStr for StxOpType {
    type Err = DataModelError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "summary" => Ok(Self::Summary),
            "histogram" => Ok(Self::Histogram),
            "qualitative" => Ok(Self::Qualitative),
            other => Err(DataModelError::UnsupportedOperation(format!(
                "unknown statistics operation '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StxOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Summary => "summary",
            Self::Histogram => "histogram",
            Self::Qualitative => "qualitative",
        };
        f.write_str(name)
    }
}

#[derive(ambassador::Delegate, Debug, Clone, PartialEq)]
#[delegate(StxOp)]
pub enum StxOpKind {
    Summary(SummaryStxOp),
    Histogram(HistogramStxOp),
    Qualitative(QualitativeStxOp),
}

impl StxOpKind {
    pub fn op_type(&self) -> StxOpType {
        match self {
            Self::Summary(_) => StxOpType::Summary,
            Self::Histogram(_) => StxOpType::Histogram,
            Self::Qualitative(_) => StxOpType::Qualitative,
        }
    }
}

impl Merge for StxOpKind {
    fn merge(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Self::Summary(lhs), Self::Summary(rhs)) => lhs.merge(rhs),
            (Self::Histogram(lhs), Self::Histogram(rhs)) => lhs.merge(rhs),
            (Self::Qualitative(lhs), Self::Qualitative(rhs)) => lhs.merge(rhs),
            (lhs, rhs) => Err(DataModelError::IncompatibleMerge(format!(
                "{} with {}",
                lhs.op_type(),
                rhs.op_type()
            ))),
        }
    }
}

impl From<SummaryStxOp> for StxOpKind {
    fn from(value: SummaryStxOp) -> Self {
        Self::Summary(value)
    }
}

impl From<HistogramStxOp> for StxOpKind {
    fn from(value: HistogramStxOp) -> Self {
        Self::Histogram(value)
    }
}

impl From<QualitativeStxOp> for StxOpKind {
    fn from(value: QualitativeStxOp) -> Self {
        Self::Qualitative(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Region;
    use rstest::rstest;

    #[rstest]
    #[case("summary", StxOpType::Summary)]
    #[case("histogram", StxOpType::Histogram)]
    #[case("qualitative", StxOpType::Qualitative)]
    fn parses_operation_names(#[case] name: &str, #[case] op_type: StxOpType) {
        assert_eq!(name.parse::<StxOpType>(), Ok(op_type));
        assert_eq!(op_type.to_string(), name);
    }

    #[rstest]
    #[case("median")]
    #[case("Summary")]
    #[case("")]
    fn unknown_operation_is_unsupported(#[case] name: &str) {
        assert!(matches!(
            name.parse::<StxOpType>(),
            Err(DataModelError::UnsupportedOperation(_))
        ));
    }

    #[rstest]
    fn mask_must_cover_the_tile() {
        let data = [1u8; 4];
        let tile = Tile::contiguous(Region::new((0, 0), (2, 2)), data.as_slice()).unwrap();
        let mask = MaskTile::contiguous(Region::new((1, 0), (2, 2)), &data).unwrap();
        let mut op = SummaryStxOp::new(MomentKind::Amplitude);
        assert!(op.accumulate_data(&tile, Some(&mask)).is_err());
        assert_eq!(op.count(), 0);
    }

    #[rstest]
    fn merging_different_kinds_fails() {
        let mut summary = StxOpKind::from(SummaryStxOp::new(MomentKind::Amplitude));
        let histogram = StxOpKind::from(HistogramStxOp::new(8, 0., 1., false, false).unwrap());
        assert!(matches!(
            summary.merge(&histogram),
            Err(DataModelError::IncompatibleMerge(_))
        ));
        assert_eq!(summary.name(), "summary");
        assert_eq!(histogram.name(), "histogram");
    }
}
