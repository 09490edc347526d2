use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::errors::{DataModelError, Result};

/// Term layouts of bivariate polynomials, in increasing complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolynomialKind {
    Linear,
    BiLinear,
    Quadric,
    BiQuadric,
    Cubic,
    BiCubic,
    Quartic,
    BiQuartic,
}

impl PolynomialKind {
    pub const ALL: [PolynomialKind; 8] = [
        PolynomialKind::Linear,
        PolynomialKind::BiLinear,
        PolynomialKind::Quadric,
        PolynomialKind::BiQuadric,
        PolynomialKind::Cubic,
        PolynomialKind::BiCubic,
        PolynomialKind::Quartic,
        PolynomialKind::BiQuartic,
    ];

    /// Total order, `None` for the tensor product ("bi") layouts.
    pub fn order(&self) -> Option<u32> {
        match self {
            PolynomialKind::Linear => Some(1),
            PolynomialKind::Quadric => Some(2),
            PolynomialKind::Cubic => Some(3),
            PolynomialKind::Quartic => Some(4),
            _ => None,
        }
    }

    /// Exponents `(i, j)` of the terms `x^i * y^j`.
    pub fn terms(&self) -> Vec<(u32, u32)> {
        match (self.order(), self) {
            (Some(order), _) => (0..=order)
                .flat_map(|degree| (0..=degree).map(move |j| (degree - j, j)))
                .collect(),
            (None, PolynomialKind::BiLinear) => tensor_terms(1),
            (None, PolynomialKind::BiQuadric) => tensor_terms(2),
            (None, PolynomialKind::BiCubic) => tensor_terms(3),
            (None, _) => tensor_terms(4),
        }
    }

    /// Minimum number of points for a fit.
    pub fn num_points_required(&self) -> usize {
        match self.order() {
            Some(order) => ((order + 2) * (order + 1) / 2) as usize,
            None => 2 * self.terms().len(),
        }
    }
}

fn tensor_terms(degree: u32) -> Vec<(u32, u32)> {
    (0..=degree)
        .flat_map(|j| (0..=degree).map(move |i| (i, j)))
        .collect()
}

/// Bivariate polynomial `z = sum(c_k * x^i_k * y^j_k)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxySum {
    kind: PolynomialKind,
    terms: Vec<(u32, u32)>,
    coefficients: Vec<f64>,
    rmse: f64,
    max_error: f64,
}

impl FxySum {
    pub fn new(kind: PolynomialKind, coefficients: Vec<f64>) -> Result<Self> {
        let terms = kind.terms();
        if terms.len() != coefficients.len() {
            return Err(DataModelError::invalid(format!(
                "{kind:?} polynomial needs {} coefficients, got {}",
                terms.len(),
                coefficients.len()
            )));
        }
        Ok(Self {
            kind,
            terms,
            coefficients,
            rmse: 0.,
            max_error: 0.,
        })
    }

    /// Least squares fit through `(x, y, z)` points.
    pub fn approximate(kind: PolynomialKind, points: &[[f64; 3]]) -> Result<Self> {
        let terms = kind.terms();
        if points.len() < kind.num_points_required() {
            return Err(DataModelError::invalid(format!(
                "{kind:?} polynomial needs at least {} points, got {}",
                kind.num_points_required(),
                points.len()
            )));
        }
        let design = DMatrix::from_fn(points.len(), terms.len(), |row, col| {
            let (i, j) = terms[col];
            term(points[row][0], points[row][1], i, j)
        });
        let observed = DVector::from_iterator(points.len(), points.iter().map(|point| point[2]));

        let svd = design.svd(true, true);
        let max_singular = svd.singular_values.max();
        let eps = max_singular * f64::EPSILON * points.len().max(terms.len()) as f64;
        if svd.rank(eps) < terms.len() {
            return Err(DataModelError::Fit(format!(
                "{kind:?} design matrix is singular"
            )));
        }
        let solution = svd
            .solve(&observed, eps)
            .map_err(|message| DataModelError::Fit(message.to_string()))?;

        let mut polynomial = Self {
            kind,
            terms,
            coefficients: solution.iter().copied().collect(),
            rmse: 0.,
            max_error: 0.,
        };
        let (mut squared, mut max_error) = (0., 0f64);
        for point in points {
            let error = (polynomial.compute_z(point[0], point[1]) - point[2]).abs();
            squared += error * error;
            max_error = max_error.max(error);
        }
        polynomial.rmse = (squared / points.len() as f64).sqrt();
        polynomial.max_error = max_error;
        Ok(polynomial)
    }

    pub fn compute_z(&self, x: f64, y: f64) -> f64 {
        self.terms
            .iter()
            .zip(&self.coefficients)
            .map(|(&(i, j), c)| c * term(x, y, i, j))
            .sum()
    }

    pub fn kind(&self) -> PolynomialKind {
        self.kind
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Root mean square residual of the last fit, 0 for explicit coefficients.
    pub fn rmse(&self) -> f64 {
        self.rmse
    }

    pub fn max_error(&self) -> f64 {
        self.max_error
    }
}

fn term(x: f64, y: f64, i: u32, j: u32) -> f64 {
    x.powi(i as i32) * y.powi(j as i32)
}

/// Fits every kind in turn and keeps the one with the lowest RMSE, stopping
/// early at the first whose maximum error is below `error_limit`.
pub fn best_polynomial(points: &[[f64; 3]], error_limit: f64) -> Option<FxySum> {
    let mut best: Option<FxySum> = None;
    for kind in PolynomialKind::ALL {
        if points.len() < kind.num_points_required() {
            continue;
        }
        let Ok(candidate) = FxySum::approximate(kind, points) else {
            log::trace!("{kind:?} polynomial can not be fitted");
            continue;
        };
        let done = candidate.max_error() < error_limit;
        if done || best.as_ref().map_or(true, |best| candidate.rmse() < best.rmse()) {
            best = Some(candidate);
        }
        if done {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    fn sample(f: impl Fn(f64, f64) -> f64) -> Vec<[f64; 3]> {
        (0..6)
            .flat_map(|i| (0..6).map(move |j| (i as f64, j as f64)))
            .map(|(x, y)| [x, y, f(x, y)])
            .collect()
    }

    #[rstest]
    #[case(PolynomialKind::Linear, 3)]
    #[case(PolynomialKind::BiLinear, 4)]
    #[case(PolynomialKind::Quadric, 6)]
    #[case(PolynomialKind::BiQuadric, 9)]
    #[case(PolynomialKind::Cubic, 10)]
    #[case(PolynomialKind::BiCubic, 16)]
    fn term_counts(#[case] kind: PolynomialKind, #[case] count: usize) {
        assert_eq!(kind.terms().len(), count);
    }

    #[rstest]
    fn evaluates_explicit_coefficients() {
        let polynomial = FxySum::new(PolynomialKind::Linear, vec![1., 2., 3.]).unwrap();
        assert_abs_diff_eq!(polynomial.compute_z(2., 5.), 1. + 4. + 15.);
    }

    #[rstest]
    fn rejects_wrong_coefficient_count() {
        assert!(FxySum::new(PolynomialKind::Quadric, vec![1., 2.]).is_err());
    }

    #[rstest]
    fn recovers_quadratic_exactly() {
        let points = sample(|x, y| 0.5 - x + 2. * y + 0.1 * x * x - 0.3 * x * y);
        let polynomial = FxySum::approximate(PolynomialKind::Quadric, &points).unwrap();
        assert!(polynomial.max_error() < 1e-9);
        assert_abs_diff_eq!(polynomial.compute_z(2.5, 1.5), 0.5 - 2.5 + 3. + 0.625 - 1.125, epsilon = 1e-9);
    }

    #[rstest]
    fn best_polynomial_stops_at_sufficient_accuracy() {
        let points = sample(|x, y| 3. * x - y);
        let polynomial = best_polynomial(&points, 0.5).unwrap();
        assert_eq!(polynomial.kind(), PolynomialKind::Linear);
    }

    #[rstest]
    fn collinear_points_can_not_be_fitted() {
        let points: Vec<[f64; 3]> = (0..10).map(|i| [i as f64, i as f64, 1.]).collect();
        assert!(matches!(
            FxySum::approximate(PolynomialKind::Linear, &points),
            Err(DataModelError::Fit(_))
        ));
    }
}
