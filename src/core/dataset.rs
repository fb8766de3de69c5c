use crate::core::ions::{self, parse_ion};
use crate::core::sheets::parse_number;
use crate::domain::model::{
    CompoundFamily, ExperimentType, Ion, RawExperiment, SampleMeta, StandardDefinition, Table,
    TemplateEntry,
};
use crate::utils::error::{AnalyzerError, Result};
use std::path::Path;

/// Leading information columns of the export (name, data file, acquisition info).
pub const INFO_COLUMNS: usize = 7;
/// Keyword identifying the template among the two input paths.
pub const TEMPLATE_KEYWORD: &str = "template";

/// Splits the two input paths into `(data file, template)`.
pub fn classify_inputs(files: &[String]) -> Result<(String, String)> {
    if files.len() != 2 {
        return Err(AnalyzerError::InputError {
            message: format!("You must choose 2 files, got {}", files.len()),
        });
    }

    let data = files
        .iter()
        .find(|file| !file.contains(TEMPLATE_KEYWORD))
        .ok_or_else(|| AnalyzerError::InputError {
            message: "both paths look like templates".to_string(),
        })?;
    let template = files
        .iter()
        .find(|file| *file != data)
        .ok_or_else(|| AnalyzerError::InputError {
            message: format!("no template path given next to {}", data),
        })?;

    Ok((data.clone(), template.clone()))
}

/// File name up to the first dot (`exp1.export.csv` -> `exp1`).
pub fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or_default()
        .to_string()
}

/// Experimental samples: names not starting with `neg` and not `S<digits>`.
pub fn is_experimental_sample(name: Option<&str>) -> bool {
    match name {
        Some(name) => !name.starts_with("neg") && !is_standard_label(name),
        None => false,
    }
}

/// Standards: names starting with `S` and a digit.
pub fn is_standard(name: Option<&str>) -> bool {
    name.is_some_and(|name| {
        let mut chars = name.chars();
        chars.next() == Some('S') && chars.next().is_some_and(|c| c.is_ascii_digit())
    })
}

fn is_standard_label(name: &str) -> bool {
    name.strip_prefix('S')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone)]
pub struct Experiment {
    pub name: String,
    pub data_path: String,
    pub family: CompoundFamily,
    pub experiment_type: ExperimentType,
    pub ions: Vec<Ion>,
    pub meta: Vec<SampleMeta>,
    /// Analysed data columns.
    pub data: Table,
    /// Every ordered column; differs from `data` for labeled cholesterol runs.
    pub full_data: Table,
    pub parental_ions: Vec<String>,
    pub standards: Vec<StandardDefinition>,
    /// Declared rows of the template map, in analysis order.
    pub declared: Vec<TemplateEntry>,
}

impl Experiment {
    pub fn from_raw(raw: &RawExperiment) -> Result<Self> {
        let export = &raw.export;

        let name_col = export
            .headers
            .iter()
            .position(|h| h == "Name")
            .ok_or_else(|| AnalyzerError::data("no 'Name' column in the column header row"))?;
        let data_file_col = export.headers.iter().position(|h| h == "Data File");

        let ion_columns: Vec<(usize, Ion)> = export
            .ion_headers
            .iter()
            .enumerate()
            .skip(INFO_COLUMNS)
            .filter_map(|(idx, header)| parse_ion(header).map(|ion| (idx, ion)))
            .collect();
        if ion_columns.is_empty() {
            return Err(AnalyzerError::data("no ion columns found in the header row"));
        }

        let first_name = export
            .rows
            .first()
            .and_then(|row| row.get(name_col))
            .ok_or_else(|| AnalyzerError::data("the export has no samples"))?;
        let family = first_name
            .chars()
            .next()
            .and_then(CompoundFamily::from_letter)
            .ok_or_else(|| {
                AnalyzerError::data(format!(
                    "sample names must start with F (FAMES) or C (cholesterol), got '{}'",
                    first_name
                ))
            })?;

        let declared: Vec<TemplateEntry> = raw
            .map
            .iter()
            .filter(|entry| entry.sample_name.is_some())
            .cloned()
            .collect();

        // 依模板順序重排樣品
        let mut ordered_names = Vec::new();
        for entry in declared.iter().take(export.rows.len()) {
            let sample_id = entry.sample_id.as_deref().unwrap_or_default();
            let number = sample_id.split('_').nth(1).ok_or_else(|| {
                AnalyzerError::template(
                    "MAP",
                    format!("SampleID '{}' has no '_<number>' suffix", sample_id),
                )
            })?;
            ordered_names.push(format!("{}{}", family.letter(), number));
        }

        if declared.len() != ordered_names.len() {
            return Err(AnalyzerError::data(format!(
                "The number of declared samples in the template (n={}) does not match the number of samples detected in the data file (n={})",
                declared.len(),
                ordered_names.len()
            )));
        }

        let ions: Vec<Ion> = ion_columns.iter().map(|(_, ion)| ion.clone()).collect();
        let layout = ions::layout(&ions);

        let mut meta = Vec::with_capacity(ordered_names.len());
        let mut rows = Vec::with_capacity(ordered_names.len());
        for (ordered_name, entry) in ordered_names.iter().zip(&declared) {
            let row = export
                .rows
                .iter()
                .find(|row| row.get(name_col) == Some(ordered_name));

            let mut sample = SampleMeta {
                sample_id: entry.sample_id.clone(),
                sample_name: entry.sample_name.clone(),
                sample_weight: entry.sample_weight.unwrap_or(1.0),
                comments: entry.comments.clone(),
                ..SampleMeta::default()
            };

            let values = match row {
                Some(row) => {
                    sample.name = Some(ordered_name.clone());
                    sample.data_file = data_file_col.and_then(|c| row.get(c)).cloned();
                    layout
                        .order
                        .iter()
                        .map(|&i| {
                            let cell = row.get(ion_columns[i].0).map(String::as_str);
                            let value = cell.map(parse_number).unwrap_or(f64::NAN);
                            if value.is_nan() {
                                0.0
                            } else {
                                value
                            }
                        })
                        .collect()
                }
                None => {
                    tracing::warn!(
                        "Sample {} declared in the template is missing from the export",
                        ordered_name
                    );
                    vec![0.0; layout.order.len()]
                }
            };

            meta.push(sample);
            rows.push(values);
        }

        let full_data = Table::new(layout.column_names.clone(), rows);
        let data = if family == CompoundFamily::Cholesterol
            && layout.experiment_type == ExperimentType::Labeled
        {
            if layout.group_count != 2 {
                return Err(AnalyzerError::data(format!(
                    "For cholesterol experiment we only expect 2 parental ions, found {}",
                    layout.group_count
                )));
            }
            // M.-2 / M.-1 不參與分析
            let kept: Vec<usize> = (2..full_data.n_cols()).collect();
            full_data.select(&kept)
        } else {
            full_data.clone()
        };

        let standards = raw
            .standards
            .get(layout.experiment_type.standard_sheet())
            .cloned()
            .ok_or_else(|| {
                AnalyzerError::template(
                    layout.experiment_type.standard_sheet(),
                    "sheet is missing from the template",
                )
            })?;

        tracing::info!(
            "🧪 {} experiment ({:?}): {} samples, {} ion columns, {} parental ions",
            layout.experiment_type,
            family,
            meta.len(),
            data.n_cols(),
            layout.parental_ions.len()
        );

        Ok(Self {
            name: base_name(&raw.data_path),
            data_path: raw.data_path.clone(),
            family,
            experiment_type: layout.experiment_type,
            ions,
            meta,
            data,
            full_data,
            parental_ions: layout.parental_ions,
            standards,
            declared,
        })
    }

    pub fn is_cholesterol(&self) -> bool {
        self.family == CompoundFamily::Cholesterol
    }

    pub fn sample_rows(&self) -> Vec<usize> {
        self.rows_where(is_experimental_sample)
    }

    pub fn standard_rows(&self) -> Vec<usize> {
        self.rows_where(is_standard)
    }

    fn rows_where(&self, predicate: fn(Option<&str>) -> bool) -> Vec<usize> {
        self.meta
            .iter()
            .enumerate()
            .filter(|(_, m)| predicate(m.sample_name.as_deref()))
            .map(|(i, _)| i)
            .collect()
    }

    /// `-CHOL` for cholesterol runs, empty otherwise.
    pub fn results_suffix(&self) -> &'static str {
        if self.is_cholesterol() {
            "-CHOL"
        } else {
            ""
        }
    }

    /// Data shown as "original": the full copy for labeled cholesterol runs.
    pub fn original_data(&self) -> &Table {
        if self.is_cholesterol() && self.experiment_type == ExperimentType::Labeled {
            &self.full_data
        } else {
            &self.data
        }
    }
}
