use crate::domain::model::{lipid_label, ExperimentType, Ion};
use regex::Regex;
use std::sync::LazyLock;

static ION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)_(\d+)(?:\.\d+)?_(\d+)").expect("valid ion header pattern")
});

/// Below this share of distinct lipid codes, the export is treated as labeled
/// (many fragments per lipid).
pub const LABELED_UNIQUE_RATIO: f64 = 0.6;

/// Parses `<id>_<mass>_<description>` (mass may carry a `.n` suffix).
pub fn parse_ion(header: &str) -> Option<Ion> {
    let caps = ION_HEADER.captures(header)?;
    Some(Ion {
        id: caps[1].parse().ok()?,
        mass: caps[2].parse().ok()?,
        description: caps[3].to_string(),
    })
}

pub fn detect_experiment_type(ions: &[Ion]) -> ExperimentType {
    if ions.is_empty() {
        return ExperimentType::NotLabeled;
    }
    let mut unique: Vec<&str> = ions.iter().map(|ion| ion.description.as_str()).collect();
    unique.sort_unstable();
    unique.dedup();

    if (unique.len() as f64) / (ions.len() as f64) < LABELED_UNIQUE_RATIO {
        ExperimentType::Labeled
    } else {
        ExperimentType::NotLabeled
    }
}

/// Ions sharing a parental ion. `members` keeps each ion's position in the export.
#[derive(Debug, Clone, PartialEq)]
pub struct IonGroup {
    pub key: String,
    pub members: Vec<(usize, Ion)>,
}

impl IonGroup {
    pub fn parental_mass(&self) -> u32 {
        self.members.first().map(|(_, ion)| ion.mass).unwrap_or(0)
    }

    /// `C16:0 (270)`: lipid code of the key and mass of the lightest member.
    pub fn parental_name(&self) -> String {
        let code = self.key.split('-').next().unwrap_or(&self.key);
        lipid_label(code, self.parental_mass())
    }
}

/// Groups consecutive ions with the same description, sorts each group by
/// mass and splits it wherever the mass series is not contiguous.
pub fn parental_groups(ions: &[Ion]) -> Vec<IonGroup> {
    let mut runs: Vec<IonGroup> = Vec::new();
    for (idx, ion) in ions.iter().enumerate() {
        match runs.last_mut() {
            Some(group) if group.key == ion.description => group.members.push((idx, ion.clone())),
            _ => runs.push(IonGroup {
                key: ion.description.clone(),
                members: vec![(idx, ion.clone())],
            }),
        }
    }

    let mut groups = Vec::new();
    for mut run in runs {
        run.members.sort_by_key(|(_, ion)| ion.mass);

        let breaks: Vec<usize> = run
            .members
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[1].1.mass as i64 - pair[0].1.mass as i64 != 1)
            .map(|(i, _)| i + 1)
            .collect();

        if breaks.is_empty() {
            groups.push(run);
            continue;
        }

        let mut start = 0;
        for (i, end) in breaks.iter().chain(std::iter::once(&run.members.len())).enumerate() {
            groups.push(IonGroup {
                key: format!("{}-{}", run.key, i),
                members: run.members[start..*end].to_vec(),
            });
            start = *end;
        }
    }
    groups
}

/// Column order and naming of the analysed data.
#[derive(Debug, Clone, PartialEq)]
pub struct IonLayout {
    pub experiment_type: ExperimentType,
    /// Position in the export of each output column.
    pub order: Vec<usize>,
    pub column_names: Vec<String>,
    pub parental_ions: Vec<String>,
    pub group_count: usize,
}

pub fn layout(ions: &[Ion]) -> IonLayout {
    let experiment_type = detect_experiment_type(ions);

    match experiment_type {
        ExperimentType::NotLabeled => {
            let names: Vec<String> = ions.iter().map(Ion::display_name).collect();
            IonLayout {
                experiment_type,
                order: (0..ions.len()).collect(),
                column_names: names.clone(),
                parental_ions: names,
                group_count: ions.len(),
            }
        }
        ExperimentType::Labeled => {
            let groups = parental_groups(ions);
            let mut order = Vec::new();
            let mut column_names = Vec::new();
            for group in &groups {
                for (n, (idx, ion)) in group.members.iter().enumerate() {
                    order.push(*idx);
                    column_names.push(format!(
                        "{} M.{}",
                        lipid_label(&ion.description, group.parental_mass()),
                        n
                    ));
                }
            }
            IonLayout {
                experiment_type,
                order,
                column_names,
                parental_ions: groups.iter().map(IonGroup::parental_name).collect(),
                group_count: groups.len(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ion(mass: u32, description: &str) -> Ion {
        Ion {
            id: 1,
            mass,
            description: description.to_string(),
        }
    }

    #[test]
    fn test_parse_ion_header() {
        let parsed = parse_ion("12_270_160").unwrap();
        assert_eq!(parsed.mass, 270);
        assert_eq!(parsed.description, "160");
        assert_eq!(parsed.display_name(), "C16:0 (270)");

        // duplicated headers get a numeric suffix on export
        let parsed = parse_ion("Area 3_271.1_160").unwrap();
        assert_eq!(parsed.id, 3);
        assert_eq!(parsed.mass, 271);

        assert!(parse_ion("Data File").is_none());
    }

    #[test]
    fn test_detect_experiment_type() {
        let unlabeled = vec![ion(270, "160"), ion(298, "180"), ion(312, "190")];
        assert_eq!(detect_experiment_type(&unlabeled), ExperimentType::NotLabeled);

        let labeled = vec![
            ion(270, "160"),
            ion(271, "160"),
            ion(272, "160"),
            ion(298, "180"),
            ion(299, "180"),
        ];
        assert_eq!(detect_experiment_type(&labeled), ExperimentType::Labeled);
    }

    #[test]
    fn test_groups_split_on_mass_gap() {
        let ions = vec![
            ion(272, "160"),
            ion(270, "160"),
            ion(271, "160"),
            ion(300, "160"),
            ion(301, "160"),
            ion(298, "180"),
        ];

        let groups = parental_groups(&ions);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key, "160-0");
        assert_eq!(
            groups[0].members.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 2, 0]
        );
        assert_eq!(groups[1].key, "160-1");
        assert_eq!(groups[1].parental_name(), "C16:0 (300)");
        assert_eq!(groups[2].key, "180");
        assert_eq!(groups[2].parental_name(), "C18:0 (298)");
    }

    #[test]
    fn test_groups_are_runs_not_global() {
        let ions = vec![ion(270, "160"), ion(298, "180"), ion(271, "160")];
        let groups = parental_groups(&ions);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_labeled_layout_names() {
        let ions = vec![
            ion(270, "160"),
            ion(271, "160"),
            ion(272, "160"),
            ion(312, "190"),
            ion(313, "190"),
        ];

        let layout = layout(&ions);
        assert_eq!(layout.experiment_type, ExperimentType::Labeled);
        assert_eq!(
            layout.column_names,
            vec![
                "C16:0 (270) M.0",
                "C16:0 (270) M.1",
                "C16:0 (270) M.2",
                "C19:0 (312) M.0",
                "C19:0 (312) M.1",
            ]
        );
        assert_eq!(layout.parental_ions, vec!["C16:0 (270)", "C19:0 (312)"]);
        assert_eq!(layout.group_count, 2);
    }

    #[test]
    fn test_unlabeled_layout_keeps_export_order() {
        let ions = vec![ion(298, "180"), ion(270, "160")];
        let layout = layout(&ions);
        assert_eq!(layout.order, vec![0, 1]);
        assert_eq!(layout.parental_ions, vec!["C18:0 (298)", "C16:0 (270)"]);
    }
}
