//! Agenda levels and the score classifier
//!
//! Six ordered escalation levels, each with an inclusive lower score bound
//! taken from the injected configuration. Classification is pure and
//! monotonic: a higher score never classifies lower.

use serde::{Deserialize, Serialize};

use crate::engine::config::EngineConfig;

/// The six ordered agenda levels a voice can occupy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgendaLevel {
    Pending,
    DeptReview,
    DeptAgenda,
    FacilityAgenda,
    CorpReview,
    CorpAgenda,
}

impl AgendaLevel {
    /// All levels in ascending order
    pub const ALL: [AgendaLevel; 6] = [
        AgendaLevel::Pending,
        AgendaLevel::DeptReview,
        AgendaLevel::DeptAgenda,
        AgendaLevel::FacilityAgenda,
        AgendaLevel::CorpReview,
        AgendaLevel::CorpAgenda,
    ];

    pub fn next(&self) -> Option<AgendaLevel> {
        let idx = Self::ALL.iter().position(|l| l == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn previous(&self) -> Option<AgendaLevel> {
        let idx = Self::ALL.iter().position(|l| l == self)?;
        idx.checked_sub(1).and_then(|i| Self::ALL.get(i)).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgendaLevel::Pending => "pending",
            AgendaLevel::DeptReview => "dept_review",
            AgendaLevel::DeptAgenda => "dept_agenda",
            AgendaLevel::FacilityAgenda => "facility_agenda",
            AgendaLevel::CorpReview => "corp_review",
            AgendaLevel::CorpAgenda => "corp_agenda",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AgendaLevel::Pending),
            "dept_review" => Some(AgendaLevel::DeptReview),
            "dept_agenda" => Some(AgendaLevel::DeptAgenda),
            "facility_agenda" => Some(AgendaLevel::FacilityAgenda),
            "corp_review" => Some(AgendaLevel::CorpReview),
            "corp_agenda" => Some(AgendaLevel::CorpAgenda),
            _ => None,
        }
    }
}

/// Progress toward the next level, for progress displays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextLevelProgress {
    pub next_level: AgendaLevel,
    pub points_needed: f64,
}

/// Classify a score into the highest level whose bound it meets,
/// honoring per-department threshold overrides.
pub fn classify(score: f64, department: &str, config: &EngineConfig) -> AgendaLevel {
    let bounds = config.thresholds_for(department).as_array();
    let mut level = AgendaLevel::Pending;
    for (candidate, bound) in AgendaLevel::ALL.iter().zip(bounds.iter()) {
        if score >= *bound {
            level = *candidate;
        }
    }
    level
}

/// Lower score bound of a level for the given department
pub fn bound_for(level: AgendaLevel, department: &str, config: &EngineConfig) -> f64 {
    let bounds = config.thresholds_for(department).as_array();
    let idx = AgendaLevel::ALL
        .iter()
        .position(|l| *l == level)
        .unwrap_or(0);
    bounds[idx]
}

/// Points remaining to the next level; `None` at the top
pub fn points_to_next_level(
    score: f64,
    department: &str,
    config: &EngineConfig,
) -> Option<NextLevelProgress> {
    let current = classify(score, department, config);
    let next = current.next()?;
    let needed = bound_for(next, department, config) - score;
    Some(NextLevelProgress {
        next_level: next,
        points_needed: needed.max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::LevelThresholds;

    #[test]
    fn test_default_bands() {
        let config = EngineConfig::default();
        assert_eq!(classify(0.0, "nursing", &config), AgendaLevel::Pending);
        assert_eq!(classify(29.9, "nursing", &config), AgendaLevel::Pending);
        assert_eq!(classify(30.0, "nursing", &config), AgendaLevel::DeptReview);
        assert_eq!(classify(45.0, "nursing", &config), AgendaLevel::DeptReview);
        assert_eq!(classify(55.0, "nursing", &config), AgendaLevel::DeptAgenda);
        assert_eq!(classify(100.0, "nursing", &config), AgendaLevel::FacilityAgenda);
        assert_eq!(classify(300.0, "nursing", &config), AgendaLevel::CorpReview);
        assert_eq!(classify(600.0, "nursing", &config), AgendaLevel::CorpAgenda);
        assert_eq!(classify(10_000.0, "nursing", &config), AgendaLevel::CorpAgenda);
    }

    #[test]
    fn test_classification_is_monotonic() {
        let config = EngineConfig::default();
        let mut previous = AgendaLevel::Pending;
        for step in 0..700 {
            let level = classify(step as f64, "nursing", &config);
            assert!(level >= previous, "score {} classified below predecessor", step);
            previous = level;
        }
    }

    #[test]
    fn test_reclassification_on_crossing_band() {
        // Score 45 sits in the 30-49 band; +10 crosses into 50-99.
        let config = EngineConfig::default();
        assert_eq!(classify(45.0, "nursing", &config), AgendaLevel::DeptReview);
        assert_eq!(classify(55.0, "nursing", &config), AgendaLevel::DeptAgenda);
    }

    #[test]
    fn test_points_to_next_level() {
        let config = EngineConfig::default();
        let progress = points_to_next_level(45.0, "nursing", &config).unwrap();
        assert_eq!(progress.next_level, AgendaLevel::DeptAgenda);
        assert_eq!(progress.points_needed, 5.0);

        assert!(points_to_next_level(600.0, "nursing", &config).is_none());
    }

    #[test]
    fn test_department_override_changes_band() {
        let mut config = EngineConfig::default();
        let mut custom = LevelThresholds::default();
        custom.dept_review = 20.0;
        config
            .department_threshold_overrides
            .insert("pharmacy".to_string(), custom);

        assert_eq!(classify(25.0, "pharmacy", &config), AgendaLevel::DeptReview);
        assert_eq!(classify(25.0, "nursing", &config), AgendaLevel::Pending);
    }
}
