use crate::domain::model::CompoundFamily;
use crate::utils::error::{AnalyzerError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Elements with a known natural isotope distribution, in lookup order.
pub const ELEMENTS: [&str; 6] = ["H", "C", "N", "O", "Si", "S"];

static ELEMENT_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(H|C|N|O|Si|S)([0-9]*)").expect("valid element pattern"));
static LIPID_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"C([0-9]+):([0-9]+)").expect("valid lipid pattern"));

/// Isotopic proportions at natural abundance, lightest isotope first
/// (IUPAC representative values).
pub fn natural_abundance(element: &str) -> Option<&'static [f64]> {
    match element {
        "H" => Some(&[0.999885, 0.000115]),
        "C" => Some(&[0.9893, 0.0107]),
        "N" => Some(&[0.99632, 0.00368]),
        "O" => Some(&[0.99757, 0.00038, 0.00205]),
        "Si" => Some(&[0.922297, 0.046832, 0.030872]),
        "S" => Some(&[0.9493, 0.0076, 0.0429, 0.0002]),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Formula {
    counts: [u32; ELEMENTS.len()],
}

impl Formula {
    /// Parses an elemental formula such as `C17H34O2`. Unknown symbols are ignored.
    pub fn parse(formula: &str) -> Self {
        let mut parsed = Formula::default();
        for caps in ELEMENT_COUNT.captures_iter(formula) {
            let n = match caps[2].parse::<u32>() {
                Ok(n) => n,
                Err(_) => 1,
            };
            parsed.add(&caps[1], n);
        }
        parsed
    }

    /// Formula of the derivatized lipid behind an ion label like `C16:0 (270)`.
    ///
    /// Fatty acids are measured as methyl esters (one extra carbon and two
    /// extra hydrogens); cholesterol is measured as its TMS ether `C30H54OSi`.
    pub fn for_lipid(label: &str, family: CompoundFamily) -> Result<Self> {
        if family == CompoundFamily::Cholesterol {
            return Ok(Formula::from_counts(30, 54, 1, 1));
        }

        let caps = LIPID_CODE
            .captures(label)
            .ok_or_else(|| AnalyzerError::CorrectionError {
                ion: label.to_string(),
                message: "cannot read carbon count and double bonds".to_string(),
            })?;
        let carbon: i64 = caps[1].parse().unwrap_or(0);
        let double_bonds: i64 = caps[2].parse().unwrap_or(0);

        let hydrogen = 3 + (carbon - 2) * 2 + 1 - 2 * double_bonds;
        if carbon < 2 || hydrogen < 0 {
            return Err(AnalyzerError::CorrectionError {
                ion: label.to_string(),
                message: format!("implausible chain C{}:{}", carbon, double_bonds),
            });
        }

        Ok(Formula::from_counts(carbon as u32 + 1, hydrogen as u32 + 2, 2, 0))
    }

    fn from_counts(carbon: u32, hydrogen: u32, oxygen: u32, silicon: u32) -> Self {
        let mut formula = Formula::default();
        formula.add("C", carbon);
        formula.add("H", hydrogen);
        formula.add("O", oxygen);
        formula.add("Si", silicon);
        formula
    }

    fn add(&mut self, element: &str, n: u32) {
        if let Some(idx) = ELEMENTS.iter().position(|e| *e == element) {
            self.counts[idx] += n;
        }
    }

    pub fn count(&self, element: &str) -> u32 {
        ELEMENTS
            .iter()
            .position(|e| *e == element)
            .map(|idx| self.counts[idx])
            .unwrap_or(0)
    }

    /// `(element, count)` for every element present.
    pub fn elements(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        ELEMENTS
            .iter()
            .zip(self.counts.iter())
            .filter(|(_, n)| **n > 0)
            .map(|(e, n)| (*e, *n))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in ["C", "H", "N", "Si", "O", "S"] {
            match self.count(element) {
                0 => {}
                1 => write!(f, "{}", element)?,
                n => write!(f, "{}{}", element, n)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fames_formula() {
        let formula = Formula::for_lipid("C16:0 (270)", CompoundFamily::Fames).unwrap();
        assert_eq!(formula.to_string(), "C17H34O2");

        let formula = Formula::for_lipid("C18:2 (294)", CompoundFamily::Fames).unwrap();
        assert_eq!(formula.to_string(), "C19H34O2");
    }

    #[test]
    fn test_cholesterol_formula_ignores_label() {
        let formula = Formula::for_lipid("C27:0 (458)", CompoundFamily::Cholesterol).unwrap();
        assert_eq!(formula.to_string(), "C30H54SiO");
        assert_eq!(formula.count("Si"), 1);
        assert_eq!(Formula::parse(&formula.to_string()), formula);
    }

    #[test]
    fn test_unreadable_label() {
        assert!(Formula::for_lipid("cholesterol", CompoundFamily::Fames).is_err());
    }

    #[test]
    fn test_parse_formula() {
        let formula = Formula::parse("C30H54OSi");
        assert_eq!(formula.count("C"), 30);
        assert_eq!(formula.count("H"), 54);
        assert_eq!(formula.count("O"), 1);
        assert_eq!(formula.count("Si"), 1);
        assert_eq!(formula.count("S"), 0);

        let formula = Formula::parse("CH3SH");
        assert_eq!(formula.count("H"), 4);
        assert_eq!(formula.count("S"), 1);
    }

    #[test]
    fn test_natural_abundances_sum_to_one() {
        for element in ELEMENTS {
            let total: f64 = natural_abundance(element).unwrap().iter().sum();
            assert!((total - 1.0).abs() < 1e-4, "{} sums to {}", element, total);
        }
        assert!(natural_abundance("Xe").is_none());
    }
}
