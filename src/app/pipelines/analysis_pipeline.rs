use crate::core::dataset::{classify_inputs, Experiment};
use crate::core::report::{build_report, SUMMARY_FILE};
use crate::core::sheets::{parse_export, parse_map, parse_standards, write_sheet, MAP_SHEET};
use crate::core::{analysis, AnalysisReport, ConfigProvider, Pipeline, RawExperiment, Storage};
use crate::domain::model::ExperimentType;
use crate::utils::error::{AnalyzerError, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};

/// Reads a CSV export and a template directory, runs the analysis and writes
/// the results archive.
pub struct AnalysisPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) config: C,
}

impl<S: Storage, C: ConfigProvider> AnalysisPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn sheet_path(template: &str, sheet: &str) -> String {
        Path::new(template)
            .join(format!("{}.csv", sheet))
            .to_string_lossy()
            .into_owned()
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for AnalysisPipeline<S, C> {
    async fn extract(&self) -> Result<RawExperiment> {
        let (data_path, template_path) = classify_inputs(self.config.input_files())?;
        tracing::debug!("Data file: {}, template: {}", data_path, template_path);

        if !self.storage.is_dir(&template_path).await {
            return Err(AnalyzerError::InputError {
                message: format!(
                    "template {} must be a directory holding {}.csv and the standard sheets",
                    template_path, MAP_SHEET
                ),
            });
        }

        let export = parse_export(&self.storage.read_file(&data_path).await?)?;

        let map_bytes = self
            .storage
            .read_file(&Self::sheet_path(&template_path, MAP_SHEET))
            .await
            .map_err(|e| AnalyzerError::template(MAP_SHEET, e.to_string()))?;
        let map = parse_map(&map_bytes)?;

        // 兩種標準品表都讀，缺的那張等到確認實驗類型後再報錯
        let mut standards = HashMap::new();
        for kind in [ExperimentType::Labeled, ExperimentType::NotLabeled] {
            let sheet = kind.standard_sheet();
            match self
                .storage
                .read_file(&Self::sheet_path(&template_path, sheet))
                .await
            {
                Ok(bytes) => {
                    standards.insert(sheet.to_string(), parse_standards(sheet, &bytes)?);
                }
                Err(e) => tracing::debug!("Standard sheet {} not read: {}", sheet, e),
            }
        }

        Ok(RawExperiment {
            data_path,
            template_path,
            export,
            map,
            standards,
        })
    }

    async fn transform(&self, raw: RawExperiment) -> Result<AnalysisReport> {
        let experiment = Experiment::from_raw(&raw)?;
        let outcome = analysis::run_analysis(&experiment, self.config.analysis())?;
        Ok(build_report(
            &experiment,
            &outcome,
            self.config.analysis(),
            self.config.output_dir(),
        ))
    }

    async fn load(&self, report: AnalysisReport) -> Result<String> {
        let output_path = Path::new(&report.results_dir)
            .join(&report.archive_name)
            .to_string_lossy()
            .into_owned();

        tracing::debug!("Creating ZIP file with {} sheets", report.sheets.len());

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            for sheet in &report.sheets {
                zip.start_file::<_, ()>(sheet.file_name(), FileOptions::default())?;
                zip.write_all(&write_sheet(sheet)?)?;
            }

            zip.start_file::<_, ()>(SUMMARY_FILE, FileOptions::default())?;
            let json_data = serde_json::to_string_pretty(&report.summary)?;
            zip.write_all(json_data.as_bytes())?;

            // 完成並取回底層 Vec<u8>
            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(&output_path, &zip_data).await?;

        Ok(output_path)
    }
}
