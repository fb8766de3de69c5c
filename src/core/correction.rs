//! Natural isotope abundance correction of mass isotopomer distributions
//! with a correction matrix built from elemental isotope abundances.

use crate::core::formula::{natural_abundance, Formula};
use crate::core::linalg::{convolve, nnls, pseudo_inverse};
use crate::domain::model::{CompoundFamily, Table};
use crate::utils::error::{AnalyzerError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionMethod {
    /// Least squares skewed correction, constrained to non-negative fractions.
    #[serde(rename = "LSC", alias = "lsc")]
    Lsc,
    /// Skewed matrix correction: pseudo-inverse, negatives flattened to zero.
    #[serde(rename = "SMC", alias = "smc")]
    Smc,
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionMethod::Lsc => write!(f, "LSC"),
            CorrectionMethod::Smc => write!(f, "SMC"),
        }
    }
}

impl FromStr for CorrectionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LSC" => Ok(CorrectionMethod::Lsc),
            "SMC" => Ok(CorrectionMethod::Smc),
            other => Err(format!("unknown correction method '{}' (expected LSC or SMC)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NaturalAbundanceCorrector {
    ion: String,
    formula: Formula,
    matrix: Array2<f64>,
}

impl NaturalAbundanceCorrector {
    pub fn new(ion: &str, tracer: &str, purity: &[f64], family: CompoundFamily) -> Result<Self> {
        let formula = Formula::for_lipid(ion, family)?;
        let matrix = correction_matrix(ion, &formula, tracer, purity)?;
        tracing::debug!(
            "Correction matrix for {} ({}): {}x{}",
            ion,
            formula,
            matrix.nrows(),
            matrix.ncols()
        );
        Ok(Self {
            ion: ion.to_string(),
            formula,
            matrix,
        })
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Corrects every row (one MID per sample) of `mids`; columns keep their names.
    pub fn correct(&self, mids: &Table, method: CorrectionMethod) -> Result<Table> {
        let (m, isotopologues) = self.matrix.dim();
        let width = mids.n_cols();
        if width > isotopologues {
            return Err(AnalyzerError::CorrectionError {
                ion: self.ion.clone(),
                message: format!(
                    "the measured MID has {} clusters but the correction matrix only {}",
                    width, isotopologues
                ),
            });
        }

        let inverse = match method {
            CorrectionMethod::Smc => Some(pseudo_inverse(&self.matrix).ok_or_else(|| {
                self.failure("the correction matrix is not finite")
            })?),
            CorrectionMethod::Lsc => None,
        };

        let mut rows = Vec::with_capacity(mids.n_rows());
        for row in &mids.rows {
            let mut target = Array1::<f64>::zeros(m);
            for (i, value) in row.iter().enumerate() {
                target[i] = *value;
            }

            let corrected = match &inverse {
                Some(inverse) => inverse.dot(&target).mapv(|v| v.max(0.0)),
                None => nnls(&self.matrix, &target)
                    .ok_or_else(|| self.failure("least squares did not converge"))?,
            };
            rows.push(corrected.iter().take(width).copied().collect());
        }

        Ok(Table::new(mids.columns.clone(), rows))
    }

    fn failure(&self, message: &str) -> AnalyzerError {
        AnalyzerError::CorrectionError {
            ion: self.ion.clone(),
            message: message.to_string(),
        }
    }
}

/// Mass distribution at natural abundance of every atom except the tracer.
fn mass_distribution_vector(formula: &Formula, tracer: &str) -> Vec<f64> {
    let mut result = vec![1.0];
    for (element, n) in formula.elements() {
        if element == tracer {
            continue;
        }
        if let Some(distribution) = natural_abundance(element) {
            for _ in 0..n {
                result = convolve(&result, distribution);
            }
        }
    }
    result
}

/// Builds the `m x (n+1)` correction matrix for `n` tracer atoms: column `i`
/// is the spectrum of the isotopologue carrying `i` labeled atoms.
pub fn correction_matrix(
    ion: &str,
    formula: &Formula,
    tracer: &str,
    purity: &[f64],
) -> Result<Array2<f64>> {
    let tracer_distribution = natural_abundance(tracer).ok_or_else(|| {
        AnalyzerError::CorrectionError {
            ion: ion.to_string(),
            message: format!("no natural abundance known for tracer '{}'", tracer),
        }
    })?;
    let n_tracer = formula.count(tracer) as usize;
    if n_tracer == 0 {
        return Err(AnalyzerError::CorrectionError {
            ion: ion.to_string(),
            message: format!("the tracer {} is not present in {}", tracer, formula),
        });
    }

    let m = 1 + n_tracer * (tracer_distribution.len() - 1);
    let mut correction_vector = mass_distribution_vector(formula, tracer);
    correction_vector.resize(correction_vector.len().max(m), 0.0);
    correction_vector.truncate(m);

    let mut matrix = Array2::<f64>::zeros((m, n_tracer + 1));
    for i in 0..=n_tracer {
        let mut column = correction_vector.clone();
        for _ in 0..i {
            column = convolve(&column, purity);
            column.truncate(m);
        }
        for _ in 0..n_tracer - i {
            column = convolve(&column, tracer_distribution);
            column.truncate(m);
        }
        for (row, value) in column.iter().enumerate() {
            matrix[[row, i]] = *value;
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{} != {}", a, b);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("lsc".parse::<CorrectionMethod>().unwrap(), CorrectionMethod::Lsc);
        assert_eq!("SMC".parse::<CorrectionMethod>().unwrap(), CorrectionMethod::Smc);
        assert!("ols".parse::<CorrectionMethod>().is_err());
        assert_eq!(CorrectionMethod::Smc.to_string(), "SMC");
    }

    #[test]
    fn test_matrix_shape_for_hydrogen_tracer() {
        let formula = Formula::for_lipid("C16:0 (270)", CompoundFamily::Fames).unwrap();
        let matrix = correction_matrix("C16:0 (270)", &formula, "H", &[0.0, 1.0]).unwrap();
        assert_eq!(matrix.dim(), (35, 35));
    }

    #[test]
    fn test_matrix_columns_are_shifted_with_pure_tracer() {
        // With a pure tracer, column i starts at row i.
        let formula = Formula::parse("C2H2O1");
        let matrix = correction_matrix("test", &formula, "H", &[0.0, 1.0]).unwrap();
        assert_eq!(matrix.dim(), (3, 3));
        for i in 0..3 {
            for row in 0..i {
                assert_eq!(matrix[[row, i]], 0.0);
            }
            assert!(matrix[[i, i]] > 0.9);
            let total: f64 = matrix.column(i).sum();
            assert!(total <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_tracer_missing_from_formula() {
        let formula = Formula::parse("C17O2");
        assert!(correction_matrix("x", &formula, "H", &[0.0, 1.0]).is_err());
        assert!(correction_matrix("x", &formula, "Xe", &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_both_methods_recover_synthetic_mid() {
        let ion = "C16:0 (270)";
        let corrector =
            NaturalAbundanceCorrector::new(ion, "H", &[0.0, 1.0], CompoundFamily::Fames).unwrap();
        let truth = [0.7, 0.2, 0.1];

        let mut padded = Array1::<f64>::zeros(corrector.matrix().ncols());
        for (i, v) in truth.iter().enumerate() {
            padded[i] = *v;
        }
        let measured = corrector.matrix().dot(&padded);
        let mids = Table::new(
            (0..measured.len()).map(|i| format!("{} M.{}", ion, i)).collect(),
            vec![measured.to_vec()],
        );

        for method in [CorrectionMethod::Lsc, CorrectionMethod::Smc] {
            let corrected = corrector.correct(&mids, method).unwrap();
            assert_eq!(corrected.columns, mids.columns);
            assert_close(corrected.rows[0][0], 0.7, 1e-6);
            assert_close(corrected.rows[0][1], 0.2, 1e-6);
            assert_close(corrected.rows[0][2], 0.1, 1e-6);
            assert!(corrected.rows[0][3..].iter().all(|v| v.abs() < 1e-6));
        }
    }

    #[test]
    fn test_lsc_never_negative() {
        let corrector = NaturalAbundanceCorrector::new(
            "C14:0 (242)",
            "H",
            &[0.02, 0.98],
            CompoundFamily::Fames,
        )
        .unwrap();
        let mids = Table::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![1000.0, 0.0, 400.0], vec![0.0, 0.0, 0.0]],
        );

        let corrected = corrector.correct(&mids, CorrectionMethod::Lsc).unwrap();
        assert!(corrected.rows.iter().flatten().all(|v| *v >= 0.0));
        assert!(corrected.rows[1].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_smc_with_rank_deficient_matrix() {
        let ion = "C16:0 (270)";
        // 純度等於天然豐度：所有欄相同
        let natural = natural_abundance("H").unwrap();
        let corrector =
            NaturalAbundanceCorrector::new(ion, "H", natural, CompoundFamily::Fames).unwrap();
        let matrix = corrector.matrix();
        let measured = matrix.column(0).to_owned();
        let mids = Table::new(
            (0..measured.len()).map(|i| format!("{} M.{}", ion, i)).collect(),
            vec![measured.to_vec()],
        );

        let corrected = corrector.correct(&mids, CorrectionMethod::Smc).unwrap();
        let share = 1.0 / matrix.ncols() as f64;
        assert!(corrected.rows[0].iter().all(|v| (v - share).abs() < 1e-9));

        let rebuilt = matrix.dot(&Array1::from(corrected.rows[0].clone()));
        for (got, want) in rebuilt.iter().zip(measured.iter()) {
            assert_close(*got, *want, 1e-9);
        }
    }

    #[test]
    fn test_smc_accepts_unlabeled_purity() {
        let mids = Table::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![1000.0, 150.0, 400.0]],
        );
        for purity in [vec![1.0, 0.0], vec![1.0]] {
            let corrector =
                NaturalAbundanceCorrector::new("C16:0 (270)", "H", &purity, CompoundFamily::Fames)
                    .unwrap();
            let corrected = corrector.correct(&mids, CorrectionMethod::Smc).unwrap();
            assert_eq!(corrected.rows[0].len(), 3);
            assert!(corrected.rows[0].iter().all(|v| v.is_finite() && *v >= 0.0));
        }
    }

    #[test]
    fn test_too_many_clusters_rejected() {
        let corrector =
            NaturalAbundanceCorrector::new("C16:0 (270)", "C", &[0.0, 1.0], CompoundFamily::Fames)
                .unwrap();
        // 17 carbons -> 18 isotopologues
        let mids = Table::new(
            (0..20).map(|i| format!("M.{}", i)).collect(),
            vec![vec![1.0; 20]],
        );
        assert!(corrector.correct(&mids, CorrectionMethod::Lsc).is_err());
    }
}
