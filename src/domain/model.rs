use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentType {
    Labeled,
    NotLabeled,
}

impl ExperimentType {
    /// Template sheet holding the standard mixture for this experiment type.
    pub fn standard_sheet(&self) -> &'static str {
        match self {
            ExperimentType::Labeled => "STANDARD_LABELED",
            ExperimentType::NotLabeled => "STANDARD_NOT_LABELED",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentType::Labeled => write!(f, "Labeled"),
            ExperimentType::NotLabeled => write!(f, "Not Labeled"),
        }
    }
}

/// Compound family, read from the first letter of the sample names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundFamily {
    Fames,
    Cholesterol,
}

impl CompoundFamily {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'F' => Some(CompoundFamily::Fames),
            'C' => Some(CompoundFamily::Cholesterol),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            CompoundFamily::Fames => 'F',
            CompoundFamily::Cholesterol => 'C',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ion {
    pub id: u32,
    pub mass: u32,
    pub description: String,
}

impl Ion {
    /// `C16:0 (270)` for description `160` and mass 270.
    pub fn display_name(&self) -> String {
        lipid_label(&self.description, self.mass)
    }
}

/// Lipid label `C{d[..2]}:{d[2..]} ({mass})` from a lipid code such as `181`.
pub fn lipid_label(description: &str, mass: u32) -> String {
    let split = description
        .char_indices()
        .nth(2)
        .map(|(i, _)| i)
        .unwrap_or(description.len());
    let (chain, bonds) = description.split_at(split);
    format!("C{}:{} ({})", chain, bonds, mass)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleMeta {
    pub name: Option<String>,
    pub data_file: Option<String>,
    pub sample_id: Option<String>,
    pub sample_name: Option<String>,
    pub sample_weight: f64,
    pub comments: Option<String>,
}

/// One declared row of the template `MAP` sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateEntry {
    pub sample_id: Option<String>,
    pub sample_name: Option<String>,
    pub sample_weight: Option<f64>,
    pub comments: Option<String>,
    pub extra: HashMap<String, String>,
}

/// One row of a `STANDARD_*` template sheet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardDefinition {
    #[serde(rename = "Chain")]
    pub chain: String,
    #[serde(rename = "MW")]
    pub molecular_weight: f64,
    #[serde(rename = "Stock conc (ug/ul)")]
    pub stock_concentration: Option<f64>,
    #[serde(rename = "Weight (%)")]
    pub weight_percent: Option<f64>,
    #[serde(rename = "Extra")]
    pub extra: Option<f64>,
}

impl StandardDefinition {
    pub fn column_name(&self) -> String {
        format!("C{} ({})", self.chain, self.molecular_weight.trunc() as i64)
    }
}

/// Instrument export as read from disk: ion header row, column header row, sample rows.
#[derive(Debug, Clone, Default)]
pub struct RawExport {
    pub ion_headers: Vec<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RawExperiment {
    pub data_path: String,
    pub template_path: String,
    pub export: RawExport,
    pub map: Vec<TemplateEntry>,
    /// Standard sheets keyed by sheet name.
    pub standards: HashMap<String, Vec<StandardDefinition>>,
}

/// Row-major numeric table with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn with_rows(n_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: vec![Vec::new(); n_rows],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Columns whose name contains `pattern`, in table order.
    pub fn filter_like(&self, pattern: &str) -> Table {
        let indices: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains(pattern))
            .map(|(i, _)| i)
            .collect();
        self.select(&indices)
    }

    pub fn select(&self, indices: &[usize]) -> Table {
        Table {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i]).collect())
                .collect(),
        }
    }

    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: rows.iter().map(|&r| self.rows[r].clone()).collect(),
        }
    }

    pub fn push_column(&mut self, name: String, values: Vec<f64>) {
        if self.rows.is_empty() && self.columns.is_empty() {
            self.rows = vec![Vec::new(); values.len()];
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(name);
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.iter().sum()).collect()
    }
}

/// A named sheet of the results archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: &str, header: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            header,
            rows: Vec::new(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub experiment: String,
    pub experiment_type: ExperimentType,
    pub compound: CompoundFamily,
    pub internal_reference: String,
    pub tracer: String,
    pub tracer_purity: Vec<f64>,
    pub correction_method: String,
    pub samples: usize,
    pub standards: usize,
    pub fitted_ions: Vec<String>,
    pub skipped_ions: Vec<String>,
    pub exclusions_applied: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub results_dir: String,
    pub archive_name: String,
    pub sheets: Vec<Sheet>,
    pub summary: RunSummary,
}

/// Cell text for a numeric value; missing values stay empty.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
