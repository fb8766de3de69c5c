use crate::core::correction::CorrectionMethod;
use crate::utils::error::{AnalyzerError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_INTERNAL_REFERENCE: &str = "C19:0";
pub const SUPPORTED_TRACERS: [&str; 3] = ["C", "H", "O"];

/// Analysis parameters, loaded from a TOML file or defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub analysis: GeneralConfig,
    pub standards: StandardsConfig,
    pub normalization: NormalizationConfig,
    pub correction: CorrectionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub internal_reference: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            internal_reference: DEFAULT_INTERNAL_REFERENCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardsConfig {
    /// 標準品混合液總體積 (uL)
    pub volume_mix_total: f64,
    /// 用於製備的混合液體積 (uL)
    pub volume_mix_for_prep: f64,
    /// 每個標準點使用的體積 (uL)
    pub volumes: Vec<f64>,
    /// Standard points (0-based) left out of the fit, per ion column.
    pub exclusions: BTreeMap<String, Vec<usize>>,
}

impl Default for StandardsConfig {
    fn default() -> Self {
        Self {
            volume_mix_total: 500.0,
            volume_mix_for_prep: 100.0,
            volumes: vec![1.0, 5.0, 10.0, 20.0, 40.0, 80.0],
            exclusions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Normalize by sample weight only instead of weight relative to dilution.
    pub weight_only: bool,
    pub volume_of_dilution: f64,
    pub volume_of_sample_used: f64,
    /// MAP column holding per-sample dilution volumes.
    pub dilution_column: Option<String>,
    /// MAP column holding per-sample volumes measured.
    pub sample_volume_column: Option<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            weight_only: false,
            volume_of_dilution: 750.0,
            volume_of_sample_used: 5.0,
            dilution_column: None,
            sample_volume_column: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub tracer: String,
    pub purity: Vec<f64>,
    pub method: CorrectionMethod,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            tracer: "H".to_string(),
            purity: vec![0.0, 1.0],
            method: CorrectionMethod::Lsc,
        }
    }
}

impl AnalysisConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AnalyzerError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| AnalyzerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LAB_DILUTION_VOLUME})
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::LazyLock;

        static ENV_VAR: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn uses_exclusions(&self) -> bool {
        self.standards.exclusions.values().any(|points| !points.is_empty())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string(
            "analysis.internal_reference",
            &self.analysis.internal_reference,
        )?;

        validation::validate_positive("standards.volume_mix_total", self.standards.volume_mix_total)?;
        validation::validate_positive(
            "standards.volume_mix_for_prep",
            self.standards.volume_mix_for_prep,
        )?;
        validation::validate_non_empty_list("standards.volumes", &self.standards.volumes)?;
        for volume in &self.standards.volumes {
            validation::validate_positive("standards.volumes", *volume)?;
        }

        validation::validate_positive(
            "normalization.volume_of_dilution",
            self.normalization.volume_of_dilution,
        )?;
        validation::validate_positive(
            "normalization.volume_of_sample_used",
            self.normalization.volume_of_sample_used,
        )?;
        if let Some(column) = &self.normalization.dilution_column {
            validation::validate_non_empty_string("normalization.dilution_column", column)?;
        }
        if let Some(column) = &self.normalization.sample_volume_column {
            validation::validate_non_empty_string("normalization.sample_volume_column", column)?;
        }

        validation::validate_one_of("correction.tracer", &self.correction.tracer, &SUPPORTED_TRACERS)?;
        validation::validate_probability_vector("correction.purity", &self.correction.purity)?;

        for (ion, points) in &self.standards.exclusions {
            if let Some(point) = points.iter().find(|&&p| p >= self.standards.volumes.len()) {
                return Err(AnalyzerError::InvalidConfigValueError {
                    field: format!("standards.exclusions.\"{}\"", ion),
                    value: point.to_string(),
                    reason: format!(
                        "Only {} standard points are declared",
                        self.standards.volumes.len()
                    ),
                });
            }
        }

        Ok(())
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = AnalysisConfig::from_toml_str("").unwrap();

        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.analysis.internal_reference, "C19:0");
        assert_eq!(config.standards.volumes, vec![1.0, 5.0, 10.0, 20.0, 40.0, 80.0]);
        assert_eq!(config.correction.method, CorrectionMethod::Lsc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[analysis]
internal_reference = "C17:0"

[standards]
volume_mix_total = 400
volume_mix_for_prep = 50
volumes = [2, 4, 8]

[standards.exclusions]
"C16:0 (270)" = [0, 2]

[normalization]
weight_only = true
dilution_column = "VolumeOfDilution"

[correction]
tracer = "C"
purity = [0.01, 0.99]
method = "SMC"
"#;

        let config = AnalysisConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.analysis.internal_reference, "C17:0");
        assert_eq!(config.standards.volume_mix_total, 400.0);
        assert_eq!(config.standards.volumes, vec![2.0, 4.0, 8.0]);
        assert_eq!(config.standards.exclusions["C16:0 (270)"], vec![0, 2]);
        assert!(config.uses_exclusions());
        assert!(config.normalization.weight_only);
        assert_eq!(config.normalization.volume_of_dilution, 750.0);
        assert_eq!(config.correction.method, CorrectionMethod::Smc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MS_ANALYZER_TEST_REF", "C21:0");

        let config = AnalysisConfig::from_toml_str(
            r#"
[analysis]
internal_reference = "${MS_ANALYZER_TEST_REF}"
"#,
        )
        .unwrap();
        assert_eq!(config.analysis.internal_reference, "C21:0");

        std::env::remove_var("MS_ANALYZER_TEST_REF");
    }

    #[test]
    fn test_config_validation() {
        let config = AnalysisConfig::from_toml_str(
            r#"
[correction]
tracer = "N"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = AnalysisConfig::from_toml_str(
            r#"
[standards]
volumes = [1, 5]

[standards.exclusions]
"C16:0 (270)" = [3]
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AnalysisConfig::from_toml_str("[standards\nvolumes = ").unwrap_err();
        assert!(matches!(err, AnalyzerError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[normalization]\nvolume_of_sample_used = 10\n")
            .unwrap();

        let config = AnalysisConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.normalization.volume_of_sample_used, 10.0);
    }
}
