use crate::config::toml_config::{CorrectionConfig, NormalizationConfig};
use crate::core::correction::NaturalAbundanceCorrector;
use crate::core::dataset::{is_experimental_sample, Experiment};
use crate::core::sheets::{parse_number, MAP_SHEET};
use crate::core::standards::StandardFit;
use crate::domain::model::{ExperimentType, Table};
use crate::utils::error::{AnalyzerError, Result};

/// Parental ion used as internal reference: exact name, else the first name
/// containing `requested`, else the last parental ion.
pub fn resolve_internal_reference(requested: &str, parental_ions: &[String]) -> Option<String> {
    parental_ions
        .iter()
        .find(|name| name.as_str() == requested)
        .or_else(|| parental_ions.iter().find(|name| name.contains(requested)))
        .or_else(|| parental_ions.last())
        .cloned()
}

/// Per parental ion, the row sums of every column belonging to it.
pub fn ion_sums(data: &Table, parental_ions: &[String]) -> Table {
    let mut sums = Table::with_rows(data.n_rows());
    for ion in parental_ions {
        sums.push_column(ion.clone(), data.filter_like(ion).row_sums());
    }
    sums
}

pub(crate) fn divide_rows_by(table: &Table, divisor: &[f64]) -> Table {
    Table::new(
        table.columns.clone(),
        table
            .rows
            .iter()
            .zip(divisor)
            .map(|(row, d)| row.iter().map(|v| v / d).collect())
            .collect(),
    )
}

/// Normalizes every sample to the internal reference.
///
/// Unlabeled runs divide each ion by the reference ion; labeled runs first sum
/// the fragments of each parental ion and divide by the reference sum.
pub fn normalize_to_internal_reference(experiment: &Experiment, reference: &str) -> Result<Table> {
    let base = match experiment.experiment_type {
        ExperimentType::NotLabeled => experiment.data.clone(),
        ExperimentType::Labeled => ion_sums(&experiment.full_data, &experiment.parental_ions),
    };
    let divisor = base.column(reference).ok_or_else(|| {
        AnalyzerError::data(format!("internal reference {} is not a data column", reference))
    })?;
    Ok(divide_rows_by(&base, &divisor))
}

/// Corrects the MIDs of every parental ion for natural abundance. Ions without
/// fragments are passed through.
pub fn correct_natural_abundance(experiment: &Experiment, config: &CorrectionConfig) -> Result<Table> {
    let mut corrected = Table::with_rows(experiment.data.n_rows());
    for ion in &experiment.parental_ions {
        let mids = experiment.data.filter_like(ion);
        let result = if mids.n_cols() <= 1 {
            tracing::info!("{} doesn't have non parental ions", ion);
            mids
        } else {
            let corrector = NaturalAbundanceCorrector::new(
                ion,
                &config.tracer,
                &config.purity,
                experiment.family,
            )?;
            corrector.correct(&mids, config.method)?
        };

        for (idx, column) in result.columns.iter().enumerate() {
            let values = result.rows.iter().map(|row| row[idx]).collect();
            corrected.push_column(column.clone(), values);
        }
    }

    tracing::info!(
        "The MIDs have been corrected using the {} method (tracer: {}, purity: {:?})",
        config.method,
        config.tracer,
        config.purity
    );
    Ok(corrected)
}

/// Share of labeled isotopologues, `(Σ - M.0) / Σ`, per parental ion.
pub fn labeled_proportions(corrected: &Table, parental_ions: &[String]) -> Table {
    let mut proportions = Table::with_rows(corrected.n_rows());
    for ion in parental_ions {
        let mids = corrected.filter_like(ion);
        let values = mids
            .rows
            .iter()
            .map(|row| {
                let total: f64 = row.iter().sum();
                let unlabeled = row.first().copied().unwrap_or(f64::NAN);
                (total - unlabeled) / total
            })
            .collect();
        proportions.push_column(ion.clone(), values);
    }
    proportions
}

/// Nanomoles per ion from the calibration lines, for every row.
pub fn quantify(normalized: &Table, fits: &[StandardFit]) -> Table {
    let mut quantities = Table::with_rows(normalized.n_rows());
    for fit in fits {
        let values = normalized
            .column(&fit.ion)
            .unwrap_or_else(|| vec![f64::NAN; normalized.n_rows()])
            .into_iter()
            .map(|signal| (signal - fit.intercept) / fit.slope)
            .collect();
        quantities.push_column(fit.ion.clone(), values);
    }
    quantities
}

/// Dilution and measured volumes (uL), one per experimental sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleVolumes {
    pub dilution: Vec<f64>,
    pub sample_used: Vec<f64>,
}

pub fn sample_volumes(experiment: &Experiment, config: &NormalizationConfig) -> Result<SampleVolumes> {
    let n_samples = experiment.sample_rows().len();
    let declared_samples: Vec<_> = experiment
        .declared
        .iter()
        .filter(|entry| is_experimental_sample(entry.sample_name.as_deref()))
        .collect();

    let from_template = |column: &str| -> Result<Vec<f64>> {
        let values: Vec<f64> = declared_samples
            .iter()
            .map(|entry| entry.extra.get(column).map(|v| parse_number(v)).unwrap_or(f64::NAN))
            .collect();
        let present = values.iter().filter(|v| !v.is_nan()).count();
        if present != declared_samples.len() {
            return Err(AnalyzerError::template(
                MAP_SHEET,
                format!(
                    "The number of values in column {} (n={}) is different than the number of samples declared (n={})",
                    column,
                    present,
                    declared_samples.len()
                ),
            ));
        }
        tracing::info!("Volumes updated from template column {}: {:?}", column, values);
        Ok(values)
    };

    let dilution = match &config.dilution_column {
        Some(column) => from_template(column)?,
        None => vec![config.volume_of_dilution; n_samples],
    };
    let sample_used = match &config.sample_volume_column {
        Some(column) => from_template(column)?,
        None => vec![config.volume_of_sample_used; n_samples],
    };

    Ok(SampleVolumes {
        dilution,
        sample_used,
    })
}

/// Divisor applied to quantities: the sample weight alone, or for experimental
/// samples `vol_sample * w / (vol_dilution + w)` (1 for every other row).
pub fn normalization_factors(
    experiment: &Experiment,
    weight_only: bool,
    volumes: &SampleVolumes,
) -> Result<Vec<f64>> {
    let weights: Vec<f64> = experiment.meta.iter().map(|m| m.sample_weight).collect();
    if weight_only {
        return Ok(weights);
    }

    let sample_rows = experiment.sample_rows();
    if sample_rows.len() != volumes.dilution.len() || sample_rows.len() != volumes.sample_used.len()
    {
        return Err(AnalyzerError::data(format!(
            "{} experimental samples but {} dilution and {} sample volumes",
            sample_rows.len(),
            volumes.dilution.len(),
            volumes.sample_used.len()
        )));
    }

    let mut factors = vec![1.0; weights.len()];
    for (k, &row) in sample_rows.iter().enumerate() {
        let weight = weights[row];
        factors[row] = volumes.sample_used[k] * weight / (volumes.dilution[k] + weight);
    }
    Ok(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CompoundFamily, SampleMeta, TemplateEntry};
    use std::collections::HashMap;

    fn experiment(
        experiment_type: ExperimentType,
        data: Table,
        parental_ions: Vec<&str>,
        names: Vec<&str>,
    ) -> Experiment {
        let meta = names
            .iter()
            .map(|name| SampleMeta {
                sample_name: Some(name.to_string()),
                sample_weight: 2.0,
                ..SampleMeta::default()
            })
            .collect();
        let declared = names
            .iter()
            .map(|name| TemplateEntry {
                sample_name: Some(name.to_string()),
                extra: HashMap::from([("VolumeOfDilution".to_string(), "600".to_string())]),
                ..TemplateEntry::default()
            })
            .collect();
        Experiment {
            name: "exp".to_string(),
            data_path: "exp.csv".to_string(),
            family: CompoundFamily::Fames,
            experiment_type,
            ions: Vec::new(),
            meta,
            full_data: data.clone(),
            data,
            parental_ions: parental_ions.into_iter().map(String::from).collect(),
            standards: Vec::new(),
            declared,
        }
    }

    #[test]
    fn test_resolve_internal_reference() {
        let ions = vec!["C16:0 (270)".to_string(), "C19:0 (312)".to_string()];
        assert_eq!(resolve_internal_reference("C19:0", &ions).unwrap(), "C19:0 (312)");
        assert_eq!(resolve_internal_reference("C16:0 (270)", &ions).unwrap(), "C16:0 (270)");
        assert_eq!(resolve_internal_reference("C27:0", &ions).unwrap(), "C19:0 (312)");
        assert!(resolve_internal_reference("C19:0", &[]).is_none());
    }

    #[test]
    fn test_unlabeled_normalization_divides_by_reference() {
        let data = Table::new(
            vec!["C16:0 (270)".into(), "C19:0 (312)".into()],
            vec![vec![10.0, 5.0], vec![30.0, 10.0]],
        );
        let exp = experiment(
            ExperimentType::NotLabeled,
            data,
            vec!["C16:0 (270)", "C19:0 (312)"],
            vec!["a", "b"],
        );

        let normalized = normalize_to_internal_reference(&exp, "C19:0 (312)").unwrap();
        assert_eq!(normalized.rows, vec![vec![2.0, 1.0], vec![3.0, 1.0]]);
        assert!(normalize_to_internal_reference(&exp, "C20:0 (326)").is_err());
    }

    #[test]
    fn test_labeled_normalization_sums_fragments() {
        let data = Table::new(
            vec![
                "C16:0 (270) M.0".into(),
                "C16:0 (270) M.1".into(),
                "C19:0 (312) M.0".into(),
                "C19:0 (312) M.1".into(),
            ],
            vec![vec![6.0, 2.0, 3.0, 1.0]],
        );
        let exp = experiment(
            ExperimentType::Labeled,
            data,
            vec!["C16:0 (270)", "C19:0 (312)"],
            vec!["a"],
        );

        let normalized = normalize_to_internal_reference(&exp, "C19:0 (312)").unwrap();
        assert_eq!(normalized.columns, vec!["C16:0 (270)", "C19:0 (312)"]);
        assert_eq!(normalized.rows, vec![vec![2.0, 1.0]]);
    }

    #[test]
    fn test_labeled_proportions() {
        let corrected = Table::new(
            vec!["C16:0 (270) M.0".into(), "C16:0 (270) M.1".into(), "C16:0 (270) M.2".into()],
            vec![vec![6.0, 3.0, 1.0], vec![0.0, 0.0, 0.0]],
        );
        let proportions = labeled_proportions(&corrected, &["C16:0 (270)".to_string()]);
        assert!((proportions.rows[0][0] - 0.4).abs() < 1e-12);
        assert!(proportions.rows[1][0].is_nan());
    }

    #[test]
    fn test_quantify_inverts_line() {
        let normalized = Table::new(vec!["C16:0 (270)".into()], vec![vec![5.0], vec![1.0]]);
        let fit = StandardFit {
            ion: "C16:0 (270)".to_string(),
            standard: "C16:0 (270)".to_string(),
            slope: 2.0,
            intercept: 1.0,
            r_squared: 1.0,
            quantities: vec![],
            signals: vec![],
            original_mask: vec![],
            mask: vec![],
        };
        let quantities = quantify(&normalized, &[fit]);
        assert_eq!(quantities.rows, vec![vec![2.0], vec![0.0]]);
    }

    #[test]
    fn test_normalization_factors() {
        let data = Table::new(vec!["x".into()], vec![vec![1.0]; 3]);
        let exp = experiment(ExperimentType::NotLabeled, data, vec!["x"], vec!["liver", "S1", "neg"]);

        let config = NormalizationConfig::default();
        let volumes = sample_volumes(&exp, &config).unwrap();
        assert_eq!(volumes.dilution, vec![750.0]);

        let factors = normalization_factors(&exp, false, &volumes).unwrap();
        assert!((factors[0] - 5.0 * 2.0 / 752.0).abs() < 1e-12);
        assert_eq!(factors[1], 1.0);
        assert_eq!(factors[2], 1.0);

        let weight_only = normalization_factors(&exp, true, &volumes).unwrap();
        assert_eq!(weight_only, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_volumes_from_template_column() {
        let data = Table::new(vec!["x".into()], vec![vec![1.0]; 2]);
        let exp = experiment(ExperimentType::NotLabeled, data, vec!["x"], vec!["liver", "S1"]);

        let config = NormalizationConfig {
            dilution_column: Some("VolumeOfDilution".to_string()),
            ..NormalizationConfig::default()
        };
        let volumes = sample_volumes(&exp, &config).unwrap();
        assert_eq!(volumes.dilution, vec![600.0]);
        assert_eq!(volumes.sample_used, vec![5.0]);

        let config = NormalizationConfig {
            sample_volume_column: Some("VolumeOfSampleUsed".to_string()),
            ..NormalizationConfig::default()
        };
        assert!(sample_volumes(&exp, &config).is_err());
    }
}
