pub mod analysis;
pub mod correction;
pub mod dataset;
pub mod engine;
pub mod formula;
pub mod ions;
pub mod linalg;
pub mod quantification;
pub mod report;
pub mod sheets;
pub mod standards;

pub use crate::domain::model::{AnalysisReport, RawExperiment};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
