use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{DataModelError, Result},
    scaling::{Scaling, ScalingKind},
    stepping::Stepping,
    stx::{
        Histogram, HistogramStxOp, MaskTile, Merge, MomentKind, QualitativeStxOp, SampleCoding, StxOp, StxOpKind,
        StxOpType, SummaryStxOp, Tile,
    },
};

/// Bins of a histogram unless configured otherwise.
pub const DEFAULT_BIN_COUNT: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StxConfig {
    pub bin_count: usize,
    pub int_histogram: bool,
    pub log_histogram: bool,
    pub moment_kind: MomentKind,
    /// Visit at most about this many pixels, for quick previews.
    pub max_points: Option<usize>,
}

impl Default for StxConfig {
    fn default() -> Self {
        Self {
            bin_count: DEFAULT_BIN_COUNT,
            int_histogram: false,
            log_histogram: false,
            moment_kind: MomentKind::default(),
            max_points: None,
        }
    }
}

/// A tile with its optional validity mask.
#[derive(Debug, Clone, Copy)]
pub struct MaskedTile<'a> {
    pub tile: Tile<'a>,
    pub mask: Option<MaskTile<'a>>,
}

impl<'a> MaskedTile<'a> {
    pub fn new(tile: Tile<'a>, mask: Option<MaskTile<'a>>) -> Self {
        Self { tile, mask }
    }
}

/// Final statistics of one raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stx {
    pub sample_count: u64,
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
    pub standard_deviation: f64,
    pub coefficient_of_variation: f64,
    pub equivalent_number_of_looks: f64,
    pub median: f64,
    pub range_95: Option<(f64, f64)>,
    pub int_histogram: bool,
    pub log_histogram: bool,
    pub histogram: Option<Histogram>,
}

/// Drives the accumulators over the tiles of a raster.
///
/// Tiles are accumulated in parallel into one accumulator per rayon job,
/// then merged.
#[derive(Debug, Clone, Default)]
pub struct StxFactory {
    config: StxConfig,
    coding: Option<SampleCoding>,
}

impl StxFactory {
    pub fn new(config: StxConfig) -> Self {
        Self { config, coding: None }
    }

    pub fn with_coding(mut self, coding: SampleCoding) -> Self {
        self.coding = Some(coding);
        self
    }

    pub fn config(&self) -> &StxConfig {
        &self.config
    }

    fn accumulate<O>(&self, tiles: &[MaskedTile<'_>], create: impl Fn() -> O + Sync + Send) -> Result<O>
    where
        O: StxOp + Merge + Send,
    {
        let tiles = self.preview(tiles);
        tiles
            .par_iter()
            .try_fold(&create, |mut op, masked| {
                op.accumulate_data(&masked.tile, masked.mask.as_ref())?;
                Ok::<O, DataModelError>(op)
            })
            .try_reduce(&create, |mut lhs, rhs| {
                lhs.merge(&rhs)?;
                Ok(lhs)
            })
    }

    /// Tiles to visit, subsampled evenly per tile when a point budget is set.
    fn preview<'a>(&self, tiles: &[MaskedTile<'a>]) -> Vec<MaskedTile<'a>> {
        let Some(max_points) = self.config.max_points else {
            return tiles.to_vec();
        };
        let total: usize = tiles.iter().map(|masked| masked.tile.region().size()).sum();
        if total <= max_points {
            return tiles.to_vec();
        }
        tiles
            .iter()
            .filter(|masked| !masked.tile.region().is_empty())
            .filter_map(|masked| {
                let region = masked.tile.region();
                let budget = (max_points * region.size()).div_ceil(total).max(1);
                let stepping = Stepping::new(region, budget).ok()?;
                Some(MaskedTile {
                    tile: masked.tile.stepped(&stepping),
                    mask: masked.mask.as_ref().map(|mask| mask.stepped(&stepping)),
                })
            })
            .collect()
    }

    pub fn summary(&self, tiles: &[MaskedTile<'_>]) -> Result<SummaryStxOp> {
        let moment_kind = self.config.moment_kind;
        self.accumulate(tiles, || SummaryStxOp::new(moment_kind))
    }

    /// Histogram between the given extrema.
    pub fn histogram(&self, tiles: &[MaskedTile<'_>], minimum: f64, maximum: f64) -> Result<HistogramStxOp> {
        let prototype = HistogramStxOp::new(
            self.config.bin_count,
            minimum,
            maximum,
            self.config.int_histogram,
            self.config.log_histogram,
        )?;
        self.accumulate(tiles, || prototype.clone())
    }

    pub fn qualitative(&self, tiles: &[MaskedTile<'_>]) -> Result<QualitativeStxOp> {
        self.accumulate(tiles, || QualitativeStxOp::new(self.coding.clone()))
    }

    /// Runs the named operation. A histogram needs a summary pass first
    /// for its extrema.
    pub fn create_op(&self, name: &str, tiles: &[MaskedTile<'_>]) -> Result<StxOpKind> {
        let op_type: StxOpType = name.parse()?;
        debug!("running {op_type} statistics over {} tiles", tiles.len());
        Ok(match op_type {
            StxOpType::Summary => self.summary(tiles)?.into(),
            StxOpType::Histogram => {
                let summary = self.summary(tiles)?;
                self.histogram(tiles, summary.minimum(), summary.maximum())?.into()
            }
            StxOpType::Qualitative => self.qualitative(tiles)?.into(),
        })
    }

    /// Summary pass, then a histogram pass over the extrema it found.
    /// A log histogram is left out when the samples reach zero or below.
    pub fn create(&self, tiles: &[MaskedTile<'_>]) -> Result<Stx> {
        let summary = self.summary(tiles)?;
        let histogram = if summary.count() == 0 {
            None
        } else if self.config.log_histogram && summary.minimum() <= 0. {
            warn!(
                "no log histogram over non-positive samples, minimum is {}",
                summary.minimum()
            );
            None
        } else {
            Some(self.histogram(tiles, summary.minimum(), summary.maximum())?)
        };
        let stx = Stx {
            sample_count: summary.count(),
            minimum: summary.minimum(),
            maximum: summary.maximum(),
            mean: summary.mean(),
            standard_deviation: summary.standard_deviation(),
            coefficient_of_variation: summary.coefficient_of_variation(),
            equivalent_number_of_looks: summary.equivalent_number_of_looks(),
            median: histogram.as_ref().map_or(f64::NAN, HistogramStxOp::median),
            range_95: histogram.as_ref().map(HistogramStxOp::find_range_for_95_percent),
            int_histogram: self.config.int_histogram,
            log_histogram: self.config.log_histogram,
            histogram: histogram.map(|op| op.histogram().clone()),
        };
        info!(
            "statistics of {} samples: min {}, max {}, mean {}",
            stx.sample_count, stx.minimum, stx.maximum, stx.mean
        );
        Ok(stx)
    }
}

impl Stx {
    /// Value range of the histogram bin at `bin`, in sample values.
    pub fn bin_range(&self, bin: usize) -> Option<(f64, f64)> {
        let histogram = self.histogram.as_ref()?;
        if bin >= histogram.num_bins() {
            return None;
        }
        let (low, high) = histogram.range(bin, bin);
        let scaling = if self.log_histogram { ScalingKind::Log10 } else { ScalingKind::Identity };
        Some((scaling.scale_inverse(low), scaling.scale_inverse(high)))
    }
}
