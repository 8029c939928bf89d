use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::{CaseError, CaseResult};

/// 科室推断规则：机构文本中出现任一关键词即得到该科室标签
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpecialtyRule {
    pub label: String,
    pub keywords: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LexiconConfig {
    pub specialties: Vec<SpecialtyRule>,
}

const DEFAULT_SPECIALTIES: &[(&str, &[&str])] = &[
    (
        "General Internal Medicine",
        &["general internal medicine", "general medicine", "general practice", "family medicine", "primary care"],
    ),
    ("Internal Medicine", &["internal medicine"]),
    ("Nephrology", &["nephrology", "kidney", "renal medicine"]),
    ("Gastroenterology", &["gastroenterology", "hepatology", "digestive", "endoscopy"]),
    ("Cardiology", &["cardiology", "cardiovascular medicine", "heart center"]),
    ("Pulmonology", &["pulmonology", "pulmonary medicine", "respiratory medicine", "respirology", "chest medicine"]),
    ("Neurology", &["neurology"]),
    ("Neurosurgery", &["neurosurgery"]),
    ("Emergency Medicine", &["emergency medicine", "emergency department", "emergency and critical care"]),
    ("Critical Care", &["intensive care", "critical care medicine"]),
    ("Infectious Diseases", &["infectious diseases", "infectious disease", "infection control"]),
    ("Hematology", &["hematology", "haematology"]),
    ("Oncology", &["oncology", "cancer center", "cancer centre"]),
    ("Endocrinology", &["endocrinology", "diabetes", "metabolism"]),
    ("Rheumatology", &["rheumatology", "clinical immunology"]),
    ("Dermatology", &["dermatology"]),
    ("Pediatrics", &["pediatrics", "paediatrics", "child health"]),
    ("Obstetrics and Gynecology", &["obstetrics", "gynecology", "gynaecology"]),
    ("Surgery", &["surgery", "surgical"]),
    ("Orthopedics", &["orthopedic", "orthopaedic", "orthopedics", "orthopaedics"]),
    ("Urology", &["urology"]),
    ("Radiology", &["radiology", "diagnostic imaging", "nuclear medicine"]),
    ("Psychiatry", &["psychiatry", "mental health"]),
    ("Ophthalmology", &["ophthalmology"]),
    ("Otolaryngology", &["otolaryngology", "otorhinolaryngology", "head and neck surgery"]),
    ("Pathology", &["pathology"]),
    ("Anesthesiology", &["anesthesiology", "anaesthesiology", "anesthesia", "anaesthesia"]),
    ("Geriatrics", &["geriatrics", "geriatric medicine"]),
];

impl LexiconConfig {
    pub fn load() -> CaseResult<Self> {
        Self::load_from(PathBuf::from("config/keywords.toml"))
    }

    pub fn load_from(path: impl AsRef<Path>) -> CaseResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CaseError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CaseResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CaseError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn active_specialties(&self) -> Vec<&SpecialtyRule> {
        self.specialties.iter().filter(|s| s.enabled).collect()
    }
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            specialties: DEFAULT_SPECIALTIES
                .iter()
                .map(|(label, keywords)| SpecialtyRule {
                    label: label.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                    enabled: true,
                })
                .collect(),
        }
    }
}
