use crate::config::toml_config::StandardsConfig;
use crate::core::linalg::linear_regression;
use crate::domain::model::{StandardDefinition, Table};
use crate::utils::error::{AnalyzerError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(C[0-9]+:[0-9]+) \(([0-9]+)\)").expect("valid ion label pattern")
});

/// Fewer usable standard points than this and the ion is not fitted.
pub const MIN_FIT_POINTS: usize = 3;

/// Nanomoles of each standard (columns) at each standard volume (rows).
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMoles {
    pub volumes: Vec<f64>,
    pub table: Table,
}

impl StandardMoles {
    pub fn row_label(volume: f64) -> String {
        format!("Std-nMol-{}", volume)
    }
}

/// `1000 * v * (stock * weight% * mix_for_prep / mix_total + extra) / MW` per standard and volume.
pub fn compute_standard_moles(
    standards: &[StandardDefinition],
    config: &StandardsConfig,
) -> StandardMoles {
    let mut table = Table::with_rows(config.volumes.len());
    for standard in standards {
        let stock = standard.stock_concentration.unwrap_or(f64::NAN);
        let weight = standard.weight_percent.unwrap_or(f64::NAN);
        let extra = standard.extra.unwrap_or(f64::NAN);
        let in_mix =
            stock * weight / 100.0 * config.volume_mix_for_prep / config.volume_mix_total;

        let moles = config
            .volumes
            .iter()
            .map(|volume| 1000.0 * volume * (in_mix + extra) / standard.molecular_weight)
            .collect();
        table.push_column(standard.column_name(), moles);
    }

    StandardMoles {
        volumes: config.volumes.clone(),
        table,
    }
}

/// Standard column to use for `ion` when it has no standard of its own:
/// the heaviest standard of the same carbon chain.
pub fn parental_standard_for(ion: &str, standard_columns: &[String]) -> Option<String> {
    let carbon = ION_LABEL.captures(ion)?.get(1)?.as_str().to_string();

    standard_columns
        .iter()
        .filter(|column| column.starts_with(&carbon))
        .filter_map(|column| {
            let caps = ION_LABEL.captures(column)?;
            if &caps[1] != carbon {
                return None;
            }
            let mass: u32 = caps[2].parse().ok()?;
            Some((mass, column))
        })
        .max_by_key(|(mass, _)| *mass)
        .map(|(_, column)| column.clone())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandardFit {
    pub ion: String,
    /// Standard column providing the quantities (the ion itself or its parental standard).
    pub standard: String,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub quantities: Vec<f64>,
    pub signals: Vec<f64>,
    /// Points usable at all (both values present, non-zero signal).
    pub original_mask: Vec<bool>,
    /// Points used for the fit after exclusions.
    pub mask: Vec<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitOutcome {
    pub fits: Vec<StandardFit>,
    pub skipped: Vec<String>,
}

impl FitOutcome {
    pub fn get(&self, ion: &str) -> Option<&StandardFit> {
        self.fits.iter().find(|fit| fit.ion == ion)
    }
}

/// Fits one calibration line per ion column of `signals` (standard rows only).
pub fn fit_standards(
    signals: &Table,
    moles: &StandardMoles,
    exclusions: &BTreeMap<String, Vec<usize>>,
) -> Result<FitOutcome> {
    if signals.n_rows() != moles.volumes.len() {
        return Err(AnalyzerError::data(format!(
            "The number of standards entered (n={}) is different than the number of standards declared in the data file (n={})",
            moles.volumes.len(),
            signals.n_rows()
        )));
    }

    let mut outcome = FitOutcome::default();
    for ion in &signals.columns {
        let standard = if moles.table.column_index(ion).is_some() {
            ion.clone()
        } else if let Some(parental) = parental_standard_for(ion, &moles.table.columns) {
            tracing::info!(
                "Standard data for {} were missing but parental ion {} data were used for the fit",
                ion,
                parental
            );
            parental
        } else {
            tracing::warn!(
                "No standard data were found for {}, no quantification possible for it.",
                ion
            );
            outcome.skipped.push(ion.clone());
            continue;
        };

        let quantities = moles.table.column(&standard).unwrap_or_default();
        let ion_signals = signals.column(ion).unwrap_or_default();

        let original_mask: Vec<bool> = quantities
            .iter()
            .zip(&ion_signals)
            .map(|(x, y)| !x.is_nan() && !y.is_nan() && *y != 0.0)
            .collect();
        let excluded = exclusions.get(ion).map(Vec::as_slice).unwrap_or(&[]);
        let mask: Vec<bool> = original_mask
            .iter()
            .enumerate()
            .map(|(i, used)| *used && !excluded.contains(&i))
            .collect();

        let (x, y): (Vec<f64>, Vec<f64>) = quantities
            .iter()
            .zip(&ion_signals)
            .zip(&mask)
            .filter(|(_, used)| **used)
            .map(|((x, y), _)| (*x, *y))
            .unzip();

        if x.len() < MIN_FIT_POINTS {
            tracing::warn!("Standard fit of {} skipped (not enough values)", ion);
            outcome.skipped.push(ion.clone());
            continue;
        }

        let Some(fit) = linear_regression(&x, &y) else {
            tracing::warn!("Standard fit of {} skipped (all quantities identical)", ion);
            outcome.skipped.push(ion.clone());
            continue;
        };
        if !fit.slope.is_finite() || !fit.intercept.is_finite() {
            return Err(AnalyzerError::FitError {
                ion: ion.clone(),
                message: format!("non-finite calibration line y={}x+{}", fit.slope, fit.intercept),
            });
        }
        // 內標準化後的內標離子恆為 1
        if fit.slope == 0.0 {
            tracing::warn!("Standard fit of {} skipped (flat calibration line)", ion);
            outcome.skipped.push(ion.clone());
            continue;
        }

        tracing::debug!(
            "{}: y={:.4}x+{:.4} (R2={:.4}, {} points)",
            ion,
            fit.slope,
            fit.intercept,
            fit.r_squared,
            x.len()
        );

        outcome.fits.push(StandardFit {
            ion: ion.clone(),
            standard,
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            quantities,
            signals: ion_signals,
            original_mask,
            mask,
        });
    }

    Ok(outcome)
}
