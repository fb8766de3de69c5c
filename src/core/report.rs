//! Result sheets of a run, the run log and the run summary.

use crate::config::toml_config::AnalysisConfig;
use crate::core::analysis::AnalysisOutcome;
use crate::core::dataset::Experiment;
use crate::core::standards::StandardMoles;
use crate::domain::model::{format_value, AnalysisReport, ExperimentType, RunSummary, Sheet, Table};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::Path;

pub const SUMMARY_FILE: &str = "run.json";

const SAMPLE_COLUMNS: [&str; 3] = ["SampleID", "SampleName", "Comments"];
const ORIGINAL_COLUMNS: [&str; 6] = [
    "Name",
    "Data File",
    "SampleID",
    "SampleName",
    "SampleWeight",
    "Comments",
];

/// `results-{base}{-CHOL}` under `output_dir`, or beside the data file.
pub fn results_dir(experiment: &Experiment, output_dir: Option<&str>) -> String {
    let root = match output_dir {
        Some(dir) => Path::new(dir).to_path_buf(),
        None => Path::new(&experiment.data_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let folder = format!("results-{}{}", experiment.name, experiment.results_suffix());
    root.join(folder).to_string_lossy().into_owned()
}

/// `results-{base}{-CHOL}{_modified}.zip`; `_modified` once standard points were excluded.
pub fn archive_name(experiment: &Experiment, modified: bool) -> String {
    format!(
        "results-{}{}{}.zip",
        experiment.name,
        experiment.results_suffix(),
        if modified { "_modified" } else { "" }
    )
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// SampleID / SampleName / Comments followed by `table`, restricted to `rows`.
fn sample_sheet(name: &str, experiment: &Experiment, table: &Table, rows: &[usize]) -> Sheet {
    let mut header: Vec<String> = SAMPLE_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(table.columns.iter().cloned());

    let mut sheet = Sheet::new(name, header);
    for &row in rows {
        let meta = &experiment.meta[row];
        let mut cells = vec![opt(&meta.sample_id), opt(&meta.sample_name), opt(&meta.comments)];
        cells.extend(table.rows[row].iter().map(|v| format_value(*v)));
        sheet.rows.push(cells);
    }
    sheet
}

/// Export and template information followed by every row of `table`.
fn original_sheet(name: &str, experiment: &Experiment, table: &Table) -> Sheet {
    let mut header: Vec<String> = ORIGINAL_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(table.columns.iter().cloned());

    let mut sheet = Sheet::new(name, header);
    for (meta, values) in experiment.meta.iter().zip(&table.rows) {
        let mut cells = vec![
            opt(&meta.name),
            opt(&meta.data_file),
            opt(&meta.sample_id),
            opt(&meta.sample_name),
            format_value(meta.sample_weight),
            opt(&meta.comments),
        ];
        cells.extend(values.iter().map(|v| format_value(*v)));
        sheet.rows.push(cells);
    }
    sheet
}

/// Fit parameters (slope, intercept, R2) and standard nanomoles, one column per
/// ion or standard, sorted by name.
pub fn standards_sheet(outcome: &AnalysisOutcome) -> Sheet {
    let columns: BTreeSet<&String> = outcome
        .fits
        .fits
        .iter()
        .map(|fit| &fit.ion)
        .chain(outcome.moles.table.columns.iter())
        .collect();

    let mut header = vec![String::new()];
    header.extend(columns.iter().map(|c| c.to_string()));
    let mut sheet = Sheet::new("Standards", header);

    let parameters: [(&str, fn(f64, f64, f64) -> f64); 3] = [
        ("slope", |slope, _, _| slope),
        ("intercept", |_, intercept, _| intercept),
        ("R2", |_, _, r2| r2),
    ];
    for (label, pick) in parameters {
        let mut cells = vec![label.to_string()];
        cells.extend(columns.iter().map(|ion| {
            outcome
                .fits
                .get(ion)
                .map(|fit| format_value(pick(fit.slope, fit.intercept, fit.r_squared)))
                .unwrap_or_default()
        }));
        sheet.rows.push(cells);
    }

    for (idx, volume) in outcome.moles.volumes.iter().enumerate() {
        let mut cells = vec![StandardMoles::row_label(*volume)];
        cells.extend(columns.iter().map(|column| {
            outcome
                .moles
                .table
                .column_index(column)
                .map(|c| format_value(outcome.moles.table.rows[idx][c]))
                .unwrap_or_default()
        }));
        sheet.rows.push(cells);
    }
    sheet
}

/// Points behind the calibration plots: every standard point with its fitted
/// value and whether it was used, then each experimental sample placed on the line.
pub fn standard_fits_sheet(experiment: &Experiment, outcome: &AnalysisOutcome) -> Sheet {
    let header = [
        "Ion",
        "Standard",
        "Kind",
        "Label",
        "Quantity (nMoles)",
        "Signal",
        "Used",
        "Fit",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    let mut sheet = Sheet::new("StandardFits", header);

    let sample_rows = experiment.sample_rows();
    for fit in &outcome.fits.fits {
        for (idx, volume) in outcome.moles.volumes.iter().enumerate() {
            let quantity = fit.quantities.get(idx).copied().unwrap_or(f64::NAN);
            sheet.rows.push(vec![
                fit.ion.clone(),
                fit.standard.clone(),
                "standard".to_string(),
                StandardMoles::row_label(*volume),
                format_value(quantity),
                format_value(fit.signals.get(idx).copied().unwrap_or(f64::NAN)),
                fit.mask.get(idx).copied().unwrap_or(false).to_string(),
                format_value(fit.slope * quantity + fit.intercept),
            ]);
        }

        let (Some(q), Some(s)) = (
            outcome.quantities.column_index(&fit.ion),
            outcome.normalized.column_index(&fit.ion),
        ) else {
            continue;
        };
        for &row in &sample_rows {
            sheet.rows.push(vec![
                fit.ion.clone(),
                fit.standard.clone(),
                "sample".to_string(),
                opt(&experiment.meta[row].sample_name),
                format_value(outcome.quantities.rows[row][q]),
                format_value(outcome.normalized.rows[row][s]),
                String::new(),
                String::new(),
            ]);
        }
    }
    sheet
}

/// Every parameter of the run, one row each, multi-valued parameters spread over columns.
pub fn log_sheet(experiment: &Experiment, outcome: &AnalysisOutcome, config: &AnalysisConfig) -> Sheet {
    let numbers = |values: &[f64]| values.iter().map(|v| format_value(*v)).collect::<Vec<_>>();
    let exclusions: Vec<String> = config
        .standards
        .exclusions
        .iter()
        .filter(|(_, points)| !points.is_empty())
        .map(|(ion, points)| {
            let points: Vec<String> = points.iter().map(usize::to_string).collect();
            format!("{}: {}", ion, points.join(" "))
        })
        .collect();

    let entries: Vec<(&str, Vec<String>)> = vec![
        ("Experiment type", vec![experiment.experiment_type.to_string()]),
        ("Volume Mix Total", numbers(&[config.standards.volume_mix_total])),
        ("Volume Mix Used", numbers(&[config.standards.volume_mix_for_prep])),
        ("Internal Reference", vec![outcome.internal_reference.clone()]),
        ("Volume standards", numbers(&config.standards.volumes)),
        ("Volume of Dilution", numbers(&outcome.volumes.dilution)),
        ("Volume of Sample Measured", numbers(&outcome.volumes.sample_used)),
        (
            "Normalization",
            vec![if config.normalization.weight_only {
                "Weight only".to_string()
            } else {
                "Relative Weight".to_string()
            }],
        ),
        ("Isotope tracer", vec![config.correction.tracer.clone()]),
        ("Isotope tracer purity", numbers(&config.correction.purity)),
        ("NA correction method", vec![config.correction.method.to_string()]),
        ("Excluded standard points", exclusions),
    ];

    let width = entries
        .iter()
        .map(|(_, values)| values.len())
        .max()
        .unwrap_or(1)
        .max(1);
    let mut header = vec![String::new()];
    header.extend((0..width).map(|i| i.to_string()));

    let mut sheet = Sheet::new("Log", header);
    for (label, mut values) in entries {
        values.resize(width, String::new());
        let mut cells = vec![label.to_string()];
        cells.extend(values);
        sheet.rows.push(cells);
    }
    sheet
}

pub fn build_sheets(experiment: &Experiment, outcome: &AnalysisOutcome, config: &AnalysisConfig) -> Vec<Sheet> {
    let samples = experiment.sample_rows();
    let mut sheets = vec![
        standards_sheet(outcome),
        sample_sheet("QuantTotal_nMoles", experiment, &outcome.quantities, &samples),
        sample_sheet(
            "QuantTotal_nMoles_mg",
            experiment,
            &outcome.normalized_quantities(),
            &samples,
        ),
    ];

    if experiment.experiment_type == ExperimentType::Labeled {
        if let Some(synthesized) = outcome.synthesized_quantities() {
            sheets.push(sample_sheet("QuantSynthetized_nMoles", experiment, &synthesized, &samples));
        }
        if let Some(synthesized) = outcome.normalized_synthesized_quantities() {
            sheets.push(sample_sheet(
                "QuantSynthetized_nMoles_mg",
                experiment,
                &synthesized,
                &samples,
            ));
        }
        if let Some(proportions) = &outcome.proportions {
            sheets.push(sample_sheet("PercentageSynthetized", experiment, proportions, &samples));
        }
        if let Some(corrected) = &outcome.corrected {
            let every_row: Vec<usize> = (0..corrected.n_rows()).collect();
            sheets.push(sample_sheet("NACorrected_MID", experiment, corrected, &every_row));
        }
    }

    sheets.push(original_sheet("OriginalData", experiment, experiment.original_data()));
    sheets.push(original_sheet(
        "OriginalData_normToInternalRef",
        experiment,
        &outcome.normalized,
    ));
    sheets.push(standard_fits_sheet(experiment, outcome));
    sheets.push(log_sheet(experiment, outcome, config));
    sheets
}

pub fn build_report(
    experiment: &Experiment,
    outcome: &AnalysisOutcome,
    config: &AnalysisConfig,
    output_dir: Option<&str>,
) -> AnalysisReport {
    let modified = config.uses_exclusions();
    let summary = RunSummary {
        experiment: experiment.name.clone(),
        experiment_type: experiment.experiment_type,
        compound: experiment.family,
        internal_reference: outcome.internal_reference.clone(),
        tracer: config.correction.tracer.clone(),
        tracer_purity: config.correction.purity.clone(),
        correction_method: config.correction.method.to_string(),
        samples: experiment.sample_rows().len(),
        standards: experiment.standard_rows().len(),
        fitted_ions: outcome.fits.fits.iter().map(|fit| fit.ion.clone()).collect(),
        skipped_ions: outcome.fits.skipped.clone(),
        exclusions_applied: modified,
        generated_at: Utc::now(),
    };

    AnalysisReport {
        results_dir: results_dir(experiment, output_dir),
        archive_name: archive_name(experiment, modified),
        sheets: build_sheets(experiment, outcome, config),
        summary,
    }
}
