pub mod analysis_pipeline;

pub use analysis_pipeline::AnalysisPipeline;
