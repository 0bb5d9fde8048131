//! Engine configuration
//!
//! All weight and threshold tables live here as injected data, not code:
//! scoring weights, agenda-level thresholds (with per-department overrides),
//! and the department-size bands. Changes go through the versioned
//! [`ConfigStore`] so every revision is auditable — classification of
//! in-flight voices always follows the active revision.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

/// Inclusive lower score bounds for the six agenda levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelThresholds {
    pub pending: f64,
    pub dept_review: f64,
    pub dept_agenda: f64,
    pub facility_agenda: f64,
    pub corp_review: f64,
    pub corp_agenda: f64,
}

impl LevelThresholds {
    /// Bounds in ascending level order
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.pending,
            self.dept_review,
            self.dept_agenda,
            self.facility_agenda,
            self.corp_review,
            self.corp_agenda,
        ]
    }

    fn is_ordered(&self) -> bool {
        let bounds = self.as_array();
        bounds.windows(2).all(|w| w[0] < w[1])
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            pending: 0.0,
            dept_review: 30.0,
            dept_agenda: 50.0,
            facility_agenda: 100.0,
            corp_review: 300.0,
            corp_agenda: 600.0,
        }
    }
}

/// Score multiplier band keyed on department headcount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSizeBand {
    /// Band applies to departments with headcount <= this value
    pub max_headcount: u32,
    pub multiplier: f64,
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub level_thresholds: LevelThresholds,
    /// Per-department threshold overrides, keyed by department name
    pub department_threshold_overrides: HashMap<String, LevelThresholds>,
    /// Permission-tier weight table (1.0 entry tier .. 5.0 top tier).
    /// Lookups outside this table are hard errors.
    pub permission_tier_weights: HashMap<String, f64>,
    /// Profession weight table (1.0 - 3.0); unspecified professions get 1.0
    pub profession_weights: HashMap<String, f64>,
    /// Per-certification score increments
    pub certification_bonuses: HashMap<String, f64>,
    /// Cap on the summed certification bonus
    pub certification_bonus_cap: f64,
    /// category -> profession -> multiplier; missing entries are 1.0
    pub category_multipliers: HashMap<String, HashMap<String, f64>>,
    /// Ascending headcount bands; first matching band wins, larger
    /// departments fall through to 1.0
    pub department_size_bands: Vec<DepartmentSizeBand>,
    /// Voting window granted to a newly submitted voice
    pub voting_period_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level_thresholds: LevelThresholds::default(),
            department_threshold_overrides: HashMap::new(),
            permission_tier_weights: [
                ("staff", 1.0),
                ("senior_staff", 1.5),
                ("chief", 2.0),
                ("manager", 2.0),
                ("department_head", 3.0),
                ("facility_director", 4.0),
                ("executive", 5.0),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            profession_weights: [
                ("physician", 3.0),
                ("pharmacist", 2.5),
                ("nurse", 2.0),
                ("therapist", 2.0),
                ("technician", 1.5),
                ("administrative", 1.0),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            certification_bonuses: [
                ("specialist_physician", 0.5),
                ("certified_nurse", 0.3),
                ("care_manager", 0.2),
                ("infection_control", 0.2),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            certification_bonus_cap: 1.0,
            category_multipliers: [(
                "patient_safety".to_string(),
                [("physician", 1.3), ("nurse", 1.3)]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            )]
            .into_iter()
            .collect(),
            department_size_bands: vec![
                DepartmentSizeBand {
                    max_headcount: 10,
                    multiplier: 1.5,
                },
                DepartmentSizeBand {
                    max_headcount: 30,
                    multiplier: 1.2,
                },
            ],
            voting_period_days: 30,
        }
    }
}

static DEFAULT_CONFIG: Lazy<EngineConfig> = Lazy::new(EngineConfig::default);

impl EngineConfig {
    /// Compiled-in defaults
    pub fn builtin() -> &'static EngineConfig {
        &DEFAULT_CONFIG
    }

    /// Load configuration from a JSON file, if one is configured
    pub fn load_from_file(path: &str) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read engine config {}: {}", path, e)))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Failed to parse engine config {}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate table shapes and bounds before the config becomes active
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.level_thresholds.is_ordered() {
            return Err(AppError::Config(
                "Level thresholds must be strictly ascending".to_string(),
            ));
        }
        for (dept, thresholds) in &self.department_threshold_overrides {
            if !thresholds.is_ordered() {
                return Err(AppError::Config(format!(
                    "Threshold override for department '{}' is not strictly ascending",
                    dept
                )));
            }
        }
        for (tier, weight) in &self.permission_tier_weights {
            if !(1.0..=5.0).contains(weight) {
                return Err(AppError::Config(format!(
                    "Permission tier '{}' weight {} outside [1.0, 5.0]",
                    tier, weight
                )));
            }
        }
        for (profession, weight) in &self.profession_weights {
            if !(1.0..=3.0).contains(weight) {
                return Err(AppError::Config(format!(
                    "Profession '{}' weight {} outside [1.0, 3.0]",
                    profession, weight
                )));
            }
        }
        // Department factor bounded so tiny-department + high-multiplier
        // category extremes stay bounded by construction.
        for band in &self.department_size_bands {
            if !(1.0..=2.0).contains(&band.multiplier) {
                return Err(AppError::Config(format!(
                    "Department size multiplier {} outside [1.0, 2.0]",
                    band.multiplier
                )));
            }
        }
        if self.voting_period_days <= 0 {
            return Err(AppError::Config(
                "Voting period must be at least one day".to_string(),
            ));
        }
        Ok(())
    }

    /// Thresholds for a department, honoring overrides
    pub fn thresholds_for(&self, department: &str) -> &LevelThresholds {
        self.department_threshold_overrides
            .get(department)
            .unwrap_or(&self.level_thresholds)
    }

    /// Score multiplier for a department of the given headcount.
    /// Bands are checked in ascending headcount order; the tightest
    /// matching band wins, larger departments fall through to 1.0.
    pub fn department_size_multiplier(&self, headcount: u32) -> f64 {
        let mut bands: Vec<&DepartmentSizeBand> = self.department_size_bands.iter().collect();
        bands.sort_by_key(|band| band.max_headcount);
        for band in bands {
            if headcount <= band.max_headcount {
                return band.multiplier;
            }
        }
        1.0
    }

    fn checksum(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        format!("{:x}", digest)
    }
}

/// Metadata for one recorded configuration revision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRevision {
    pub version: u32,
    pub checksum: String,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

struct VersionedConfig {
    config: Arc<EngineConfig>,
    version: u32,
    revisions: Vec<ConfigRevision>,
}

/// Shared, versioned holder for the active engine configuration.
/// Every update appends a revision entry with a content checksum.
pub struct ConfigStore {
    inner: RwLock<VersionedConfig>,
}

impl ConfigStore {
    pub fn new(config: EngineConfig) -> Self {
        let revision = ConfigRevision {
            version: 1,
            checksum: config.checksum(),
            updated_by: None,
            updated_at: Utc::now(),
        };
        Self {
            inner: RwLock::new(VersionedConfig {
                config: Arc::new(config),
                version: 1,
                revisions: vec![revision],
            }),
        }
    }

    /// Snapshot of the active configuration
    pub async fn current(&self) -> Arc<EngineConfig> {
        self.inner.read().await.config.clone()
    }

    pub async fn current_version(&self) -> u32 {
        self.inner.read().await.version
    }

    /// Replace the active configuration, recording a new revision
    pub async fn update(
        &self,
        config: EngineConfig,
        updated_by: Option<Uuid>,
    ) -> Result<ConfigRevision, AppError> {
        config.validate()?;
        let mut inner = self.inner.write().await;
        inner.version += 1;
        let revision = ConfigRevision {
            version: inner.version,
            checksum: config.checksum(),
            updated_by,
            updated_at: Utc::now(),
        };
        tracing::info!(
            version = revision.version,
            checksum = %revision.checksum,
            "Engine configuration updated"
        );
        inner.config = Arc::new(config);
        inner.revisions.push(revision.clone());
        Ok(revision)
    }

    /// Full revision history, oldest first
    pub async fn revisions(&self) -> Vec<ConfigRevision> {
        self.inner.read().await.revisions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_ordered() {
        assert!(LevelThresholds::default().is_ordered());
    }

    #[test]
    fn test_department_override_lookup() {
        let mut config = EngineConfig::default();
        let mut custom = LevelThresholds::default();
        custom.dept_review = 20.0;
        config
            .department_threshold_overrides
            .insert("radiology".to_string(), custom);

        assert_eq!(config.thresholds_for("radiology").dept_review, 20.0);
        assert_eq!(config.thresholds_for("cardiology").dept_review, 30.0);
    }

    #[test]
    fn test_size_multiplier_bands() {
        let config = EngineConfig::default();
        assert_eq!(config.department_size_multiplier(8), 1.5);
        assert_eq!(config.department_size_multiplier(25), 1.2);
        assert_eq!(config.department_size_multiplier(200), 1.0);
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut config = EngineConfig::default();
        config.level_thresholds.corp_review = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_department_factor() {
        let mut config = EngineConfig::default();
        config.department_size_bands[0].multiplier = 3.0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_update_records_revision() {
        let store = ConfigStore::new(EngineConfig::default());
        assert_eq!(store.current_version().await, 1);

        let mut updated = EngineConfig::default();
        updated.voting_period_days = 45;
        let revision = store.update(updated, None).await.unwrap();

        assert_eq!(revision.version, 2);
        assert_eq!(store.current().await.voting_period_days, 45);
        assert_eq!(store.revisions().await.len(), 2);
    }
}
