//! One complete computation over an experiment: normalization, natural
//! abundance correction, calibration and quantification.

use crate::config::toml_config::AnalysisConfig;
use crate::core::dataset::Experiment;
use crate::core::quantification::{
    correct_natural_abundance, divide_rows_by, labeled_proportions, normalization_factors,
    normalize_to_internal_reference, quantify, resolve_internal_reference, sample_volumes,
    SampleVolumes,
};
use crate::core::standards::{compute_standard_moles, fit_standards, FitOutcome, StandardMoles};
use crate::domain::model::{ExperimentType, Table};
use crate::utils::error::{AnalyzerError, Result};

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub internal_reference: String,
    /// Data normalized to the internal reference, every row.
    pub normalized: Table,
    /// Labeled runs only.
    pub corrected: Option<Table>,
    /// Labeled runs only.
    pub proportions: Option<Table>,
    pub moles: StandardMoles,
    pub fits: FitOutcome,
    /// nmol per fitted ion, every row.
    pub quantities: Table,
    pub volumes: SampleVolumes,
    pub normalization: Vec<f64>,
}

impl AnalysisOutcome {
    /// Quantities divided by the per-row normalization factor.
    pub fn normalized_quantities(&self) -> Table {
        divide_rows_by(&self.quantities, &self.normalization)
    }

    /// Newly synthesized nmol: total quantity times labeled proportion.
    pub fn synthesized_quantities(&self) -> Option<Table> {
        let proportions = self.proportions.as_ref()?;
        let mut synthesized = Table::with_rows(self.quantities.n_rows());
        for (idx, ion) in self.quantities.columns.iter().enumerate() {
            let share = proportions
                .column(ion)
                .unwrap_or_else(|| vec![f64::NAN; self.quantities.n_rows()]);
            let values = self
                .quantities
                .rows
                .iter()
                .zip(share)
                .map(|(row, p)| row[idx] * p)
                .collect();
            synthesized.push_column(ion.clone(), values);
        }
        Some(synthesized)
    }

    pub fn normalized_synthesized_quantities(&self) -> Option<Table> {
        self.synthesized_quantities()
            .map(|table| divide_rows_by(&table, &self.normalization))
    }
}

pub fn run_analysis(experiment: &Experiment, config: &AnalysisConfig) -> Result<AnalysisOutcome> {
    let internal_reference =
        resolve_internal_reference(&config.analysis.internal_reference, &experiment.parental_ions)
            .ok_or_else(|| AnalyzerError::data("no parental ion available as internal reference"))?;
    if internal_reference != config.analysis.internal_reference {
        tracing::info!(
            "Internal reference {} resolved to {}",
            config.analysis.internal_reference,
            internal_reference
        );
    }

    let normalized = normalize_to_internal_reference(experiment, &internal_reference)?;

    let (corrected, proportions) = match experiment.experiment_type {
        ExperimentType::Labeled => {
            let corrected = correct_natural_abundance(experiment, &config.correction)?;
            let proportions = labeled_proportions(&corrected, &experiment.parental_ions);
            (Some(corrected), Some(proportions))
        }
        ExperimentType::NotLabeled => (None, None),
    };

    let moles = compute_standard_moles(&experiment.standards, &config.standards);
    let signals = normalized.select_rows(&experiment.standard_rows());
    let fits = fit_standards(&signals, &moles, &config.standards.exclusions)?;
    tracing::info!(
        "📈 {} calibration lines fitted, {} ions skipped",
        fits.fits.len(),
        fits.skipped.len()
    );

    let quantities = quantify(&normalized, &fits.fits);
    let volumes = sample_volumes(experiment, &config.normalization)?;
    let normalization =
        normalization_factors(experiment, config.normalization.weight_only, &volumes)?;

    Ok(AnalysisOutcome {
        internal_reference,
        normalized,
        corrected,
        proportions,
        moles,
        fits,
        quantities,
        volumes,
        normalization,
    })
}
