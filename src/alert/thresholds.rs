/// Bloom-risk alert levels.
///
/// The downstream model returns a probability of a chlorophyll exceedance
/// within the label horizon. This module maps it onto an alert level using
/// the configured cut-offs, and refuses to raise or clear an alert on stale
/// data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::alert::stalenesses::Freshness;
use crate::config::AlertConfig;

/// Risk levels, in ascending order of severity. `Insufficient` sits apart:
/// the data cannot support a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub date: NaiveDate,
    pub level: RiskLevel,
    pub probability: f64,
    pub message: String,
}

/// Level for a probability, ignoring freshness. Probabilities outside
/// [0, 1] or NaN are `Insufficient`.
pub fn classify_probability(probability: f64, config: &AlertConfig) -> RiskLevel {
    if !(0.0..=1.0).contains(&probability) {
        return RiskLevel::Insufficient;
    }
    if probability >= config.high_probability {
        RiskLevel::High
    } else if probability >= config.elevated_probability {
        RiskLevel::Elevated
    } else {
        RiskLevel::Low
    }
}

/// Returns an alert for an elevated or high score, or an `Insufficient`
/// alert when the data is stale.
///
/// Returns `None` for a low score on fresh data.
pub fn check_bloom_risk(
    date: NaiveDate,
    probability: f64,
    freshness: &Freshness,
    config: &AlertConfig,
) -> Option<RiskAlert> {
    let level = if freshness.stale {
        RiskLevel::Insufficient
    } else {
        classify_probability(probability, config)
    };

    let message = match level {
        RiskLevel::Low => return None,
        RiskLevel::Elevated => format!(
            "Elevated bloom risk for {}: p={:.2} (elevated at {:.2})",
            date, probability, config.elevated_probability
        ),
        RiskLevel::High => format!(
            "High bloom risk for {}: p={:.2} (high at {:.2})",
            date, probability, config.high_probability
        ),
        RiskLevel::Insufficient => match freshness.age_days {
            _ if !freshness.stale => {
                format!("Score {} for {} is not a probability", probability, date)
            }
            Some(age) => format!(
                "Insufficient data for {}: last chlorophyll {} days ago (limit {})",
                date, age, freshness.max_age_days
            ),
            None => format!("Insufficient data for {}: no chlorophyll observations", date),
        },
    };

    Some(RiskAlert {
        date,
        level,
        probability,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::stalenesses::assess_freshness_at;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    }

    fn fresh() -> Freshness {
        assess_freshness_at(NaiveDate::from_ymd_opt(2024, 7, 10), 14, today())
    }

    fn stale() -> Freshness {
        assess_freshness_at(NaiveDate::from_ymd_opt(2024, 5, 1), 14, today())
    }

    #[test]
    fn test_classification_cutoffs() {
        let cfg = AlertConfig::default();
        assert_eq!(classify_probability(0.1, &cfg), RiskLevel::Low);
        assert_eq!(classify_probability(0.3, &cfg), RiskLevel::Elevated);
        assert_eq!(classify_probability(0.59, &cfg), RiskLevel::Elevated);
        assert_eq!(classify_probability(0.6, &cfg), RiskLevel::High);
        assert_eq!(classify_probability(1.0, &cfg), RiskLevel::High);
    }

    #[test]
    fn test_invalid_probability_is_insufficient() {
        let cfg = AlertConfig::default();
        assert_eq!(classify_probability(f64::NAN, &cfg), RiskLevel::Insufficient);
        assert_eq!(classify_probability(1.2, &cfg), RiskLevel::Insufficient);
        let alert = check_bloom_risk(today(), -0.1, &fresh(), &cfg).unwrap();
        assert!(alert.message.contains("not a probability"));
    }

    #[test]
    fn test_low_risk_on_fresh_data_raises_nothing() {
        assert!(check_bloom_risk(today(), 0.05, &fresh(), &AlertConfig::default()).is_none());
    }

    #[test]
    fn test_high_risk_alert() {
        let alert = check_bloom_risk(today(), 0.8, &fresh(), &AlertConfig::default()).unwrap();
        assert_eq!(alert.level, RiskLevel::High);
        assert!(alert.message.contains("High bloom risk"));
    }

    #[test]
    fn test_stale_data_downgrades_any_score() {
        let cfg = AlertConfig::default();
        for p in [0.05, 0.4, 0.95] {
            let alert = check_bloom_risk(today(), p, &stale(), &cfg).unwrap();
            assert_eq!(alert.level, RiskLevel::Insufficient);
            assert!(alert.message.contains("days ago"));
        }
    }
}
