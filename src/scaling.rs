use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Reversible value transform applied before binning.
pub trait Scaling: Send + Sync + Debug {
    fn scale(&self, value: f64) -> f64;
    fn scale_inverse(&self, value: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityScaling;

impl Scaling for IdentityScaling {
    fn scale(&self, value: f64) -> f64 {
        value
    }

    fn scale_inverse(&self, value: f64) -> f64 {
        value
    }
}

/// Non-positive values scale to NaN or `-inf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Log10Scaling;

impl Scaling for Log10Scaling {
    fn scale(&self, value: f64) -> f64 {
        value.log10()
    }

    fn scale_inverse(&self, value: f64) -> f64 {
        10f64.powf(value)
    }
}

/// The two scalings as a value, for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingKind {
    #[default]
    Identity,
    Log10,
}

impl Scaling for ScalingKind {
    fn scale(&self, value: f64) -> f64 {
        match self {
            ScalingKind::Identity => IdentityScaling.scale(value),
            ScalingKind::Log10 => Log10Scaling.scale(value),
        }
    }

    fn scale_inverse(&self, value: f64) -> f64 {
        match self {
            ScalingKind::Identity => IdentityScaling.scale_inverse(value),
            ScalingKind::Log10 => Log10Scaling.scale_inverse(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(ScalingKind::Identity)]
    #[case(ScalingKind::Log10)]
    fn inverse_undoes_scale(#[case] scaling: ScalingKind) {
        for value in [0.001, 1., 42.5, 1e6] {
            assert_relative_eq!(scaling.scale_inverse(scaling.scale(value)), value, max_relative = 1e-12);
        }
    }

    #[rstest]
    fn log_of_non_positive_is_not_finite() {
        assert!(Log10Scaling.scale(0.).is_infinite());
        assert!(Log10Scaling.scale(-1.).is_nan());
    }
}
