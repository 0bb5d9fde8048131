//! Score aggregation
//!
//! Turns one vote plus one voter profile into a signed contribution, and a
//! vote set into the effective score the classifier sees. Deterministic:
//! identical inputs always produce the identical value. Unknown permission
//! tiers and malformed stances are hard validation errors — silently
//! defaulting either would corrupt the meaning of the score.

use serde::Serialize;

use crate::engine::config::EngineConfig;
use crate::error::AppError;
use crate::voice::{Vote, VoteStance, VoterProfile};

/// Support/oppose/neutral counts over a vote set
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusBreakdown {
    pub support: usize,
    pub oppose: usize,
    pub neutral: usize,
    pub total: usize,
    /// support / total; 0 when no votes have been cast
    pub consensus_rate: f64,
}

/// Signed contribution of a single vote.
///
/// `|base| * permission_weight * (profession_weight + experience_bonus +
/// certification_bonus) * category_multiplier`, sign following the stance.
pub fn contribution(
    stance: VoteStance,
    profile: &VoterProfile,
    category: &str,
    config: &EngineConfig,
) -> Result<f64, AppError> {
    let permission_weight = config
        .permission_tier_weights
        .get(&profile.permission_tier)
        .copied()
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown permission tier '{}'",
                profile.permission_tier
            ))
        })?;

    let profession_weight = profile
        .profession
        .as_deref()
        .and_then(|p| config.profession_weights.get(p))
        .copied()
        .unwrap_or(1.0);

    let experience_bonus = experience_bonus(profile.years_of_experience);
    let certification_bonus = certification_bonus(profile, config);
    let category_multiplier = category_multiplier(category, profile.profession.as_deref(), config);

    Ok(stance.base_value()
        * permission_weight
        * (profession_weight + experience_bonus + certification_bonus)
        * category_multiplier)
}

/// min(floor(years / 5) * 0.2, 1.0)
fn experience_bonus(years: u32) -> f64 {
    ((years / 5) as f64 * 0.2).min(1.0)
}

/// Sum of configured per-certification increments, capped
fn certification_bonus(profile: &VoterProfile, config: &EngineConfig) -> f64 {
    let sum: f64 = profile
        .certifications
        .iter()
        .filter_map(|cert| config.certification_bonuses.get(cert))
        .sum();
    sum.min(config.certification_bonus_cap)
}

fn category_multiplier(category: &str, profession: Option<&str>, config: &EngineConfig) -> f64 {
    profession
        .and_then(|p| config.category_multipliers.get(category)?.get(p))
        .copied()
        .unwrap_or(1.0)
}

/// Effective score from a running raw sum: clamped at zero, then scaled by
/// the department-size factor. Category multipliers were already applied per
/// contribution; the department factor applies exactly once, here.
pub fn effective_score(raw_sum: f64, department_headcount: u32, config: &EngineConfig) -> f64 {
    raw_sum.max(0.0) * config.department_size_multiplier(department_headcount)
}

/// Consensus breakdown over the recorded votes of a voice
pub fn consensus_breakdown(votes: &[Vote]) -> ConsensusBreakdown {
    let mut support = 0;
    let mut oppose = 0;
    let mut neutral = 0;
    for vote in votes {
        match vote.stance {
            VoteStance::Support | VoteStance::StronglySupport => support += 1,
            VoteStance::Oppose | VoteStance::StronglyOppose => oppose += 1,
            VoteStance::Neutral => neutral += 1,
        }
    }
    let total = votes.len();
    let consensus_rate = if total == 0 {
        0.0
    } else {
        support as f64 / total as f64
    };
    ConsensusBreakdown {
        support,
        oppose,
        neutral,
        total,
        consensus_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn profile(tier: &str, profession: Option<&str>, years: u32, certs: &[&str]) -> VoterProfile {
        VoterProfile {
            user_id: Uuid::new_v4(),
            permission_tier: tier.to_string(),
            profession: profession.map(|p| p.to_string()),
            years_of_experience: years,
            certifications: certs.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn config_with(tier: &str, weight: f64, profession: &str, prof_weight: f64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config
            .permission_tier_weights
            .insert(tier.to_string(), weight);
        config
            .profession_weights
            .insert(profession.to_string(), prof_weight);
        config
    }

    #[test]
    fn test_strongly_support_manager_contribution() {
        // 10 x 2.0 x (2.5 + 0.4 + 0) x 1.3 = 75.4
        let mut config = config_with("manager", 2.0, "pharmacist", 2.5);
        config.category_multipliers.insert(
            "patient_safety".to_string(),
            [("pharmacist".to_string(), 1.3)].into_iter().collect(),
        );
        let voter = profile("manager", Some("pharmacist"), 12, &[]);

        let value = contribution(VoteStance::StronglySupport, &voter, "patient_safety", &config)
            .unwrap();
        assert!((value - 75.4).abs() < 1e-9, "got {}", value);
    }

    #[test]
    fn test_contribution_is_deterministic() {
        let config = EngineConfig::default();
        let voter = profile("chief", Some("nurse"), 7, &["certified_nurse"]);
        let first =
            contribution(VoteStance::Support, &voter, "patient_safety", &config).unwrap();
        let second =
            contribution(VoteStance::Support, &voter, "patient_safety", &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_oppose_stances_are_negative() {
        let config = EngineConfig::default();
        let voter = profile("staff", None, 0, &[]);
        let value = contribution(VoteStance::Oppose, &voter, "general", &config).unwrap();
        assert_eq!(value, -5.0);
        let value = contribution(VoteStance::StronglyOppose, &voter, "general", &config).unwrap();
        assert_eq!(value, -10.0);
    }

    #[test]
    fn test_neutral_contributes_nothing() {
        let config = EngineConfig::default();
        let voter = profile("executive", Some("physician"), 30, &["specialist_physician"]);
        let value = contribution(VoteStance::Neutral, &voter, "general", &config).unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_unknown_permission_tier_is_an_error() {
        let config = EngineConfig::default();
        let voter = profile("intergalactic_overlord", None, 3, &[]);
        let result = contribution(VoteStance::Support, &voter, "general", &config);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_experience_bonus_caps_at_one() {
        assert_eq!(experience_bonus(0), 0.0);
        assert_eq!(experience_bonus(4), 0.0);
        assert_eq!(experience_bonus(5), 0.2);
        assert_eq!(experience_bonus(12), 0.4);
        assert_eq!(experience_bonus(25), 1.0);
        assert_eq!(experience_bonus(60), 1.0);
    }

    #[test]
    fn test_certification_bonus_caps() {
        let mut config = EngineConfig::default();
        config
            .certification_bonuses
            .insert("board_certified".to_string(), 0.8);
        let voter = profile(
            "staff",
            None,
            0,
            &["specialist_physician", "certified_nurse", "board_certified"],
        );
        // 0.5 + 0.3 + 0.8 = 1.6, capped at 1.0
        assert_eq!(certification_bonus(&voter, &config), 1.0);
    }

    #[test]
    fn test_unlisted_certifications_are_ignored() {
        let config = EngineConfig::default();
        let voter = profile("staff", None, 0, &["karaoke_champion"]);
        assert_eq!(certification_bonus(&voter, &config), 0.0);
    }

    #[test]
    fn test_effective_score_clamps_then_scales() {
        let config = EngineConfig::default();
        // Negative sums clamp to zero before scaling
        assert_eq!(effective_score(-40.0, 8, &config), 0.0);
        // Small department (headcount 8) gets the 1.5 factor
        assert_eq!(effective_score(40.0, 8, &config), 60.0);
        // Large department gets no scaling
        assert_eq!(effective_score(40.0, 200, &config), 40.0);
    }

    #[test]
    fn test_consensus_breakdown() {
        let voice_id = Uuid::new_v4();
        let votes = vec![
            Vote::new(voice_id, Uuid::new_v4(), VoteStance::StronglySupport),
            Vote::new(voice_id, Uuid::new_v4(), VoteStance::Support),
            Vote::new(voice_id, Uuid::new_v4(), VoteStance::Oppose),
            Vote::new(voice_id, Uuid::new_v4(), VoteStance::Neutral),
        ];
        let breakdown = consensus_breakdown(&votes);
        assert_eq!(breakdown.support, 2);
        assert_eq!(breakdown.oppose, 1);
        assert_eq!(breakdown.neutral, 1);
        assert_eq!(breakdown.consensus_rate, 0.5);
    }

    #[test]
    fn test_consensus_breakdown_empty() {
        let breakdown = consensus_breakdown(&[]);
        assert_eq!(breakdown.total, 0);
        assert_eq!(breakdown.consensus_rate, 0.0);
    }
}
