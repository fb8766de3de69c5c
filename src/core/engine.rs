use crate::core::Pipeline;
use crate::domain::model::RawExperiment;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct AnalysisEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> AnalysisEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting analysis...");
        self.monitor.log_stage("Start");

        // Extract
        tracing::info!("Reading data file and template...");
        let raw = self.pipeline.extract().await?;
        tracing::info!(
            "Read {} export rows and {} template rows",
            raw.export.rows.len(),
            raw.map.len()
        );
        self.monitor.log_stage("Extract");

        // Transform
        tracing::info!("Computing results...");
        let report = self.pipeline.transform(raw).await?;
        tracing::info!(
            "{} sheets computed ({} ions fitted)",
            report.sheets.len(),
            report.summary.fitted_ions.len()
        );
        self.monitor.log_stage("Transform");

        // Load
        tracing::info!("Saving results...");
        let output_path = self.pipeline.load(report).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stage("Load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }

    /// Extract only, for dry runs.
    pub async fn inspect(&self) -> Result<RawExperiment> {
        let raw = self.pipeline.extract().await?;
        self.monitor.log_stage("Extract");
        Ok(raw)
    }
}
