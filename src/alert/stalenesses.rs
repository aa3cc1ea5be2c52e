/// Chlorophyll data freshness for scoring.
///
/// Lake sampling is weekly at best and often monthly. A risk score built on
/// a chlorophyll history that stopped weeks ago describes the lake as it
/// was, not as it is, so scoring reports how old the newest chlorophyll
/// observation is and the alert layer downgrades stale scores.
///
/// # Clock injection
/// All functions accept an `as_of: NaiveDate` rather than reading the
/// clock. `assess_freshness` is the only wrapper that uses today's date.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    pub as_of: NaiveDate,
    pub last_observation: Option<NaiveDate>,
    pub age_days: Option<i64>,
    pub max_age_days: u32,
    pub stale: bool,
}

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Staleness is strictly greater than the limit:
///   age > max_age_days  →  stale
///   age == max_age_days →  not stale
///
/// No observation at all is stale. An observation dated after `as_of`
/// counts as age 0.
pub fn assess_freshness_at(
    last_observation: Option<NaiveDate>,
    max_age_days: u32,
    as_of: NaiveDate,
) -> Freshness {
    let age_days = last_observation.map(|last| (as_of - last).num_days().max(0));
    let stale = match age_days {
        Some(age) => age > i64::from(max_age_days),
        None => true,
    };
    if stale {
        log::warn!(
            target: "system",
            "Chlorophyll data stale as of {}: last observation {}",
            as_of,
            last_observation.map(|d| d.to_string()).unwrap_or_else(|| "never".to_string())
        );
    }
    Freshness {
        as_of,
        last_observation,
        age_days,
        max_age_days,
        stale,
    }
}

/// Convenience wrapper that uses today's UTC date.
/// Use `assess_freshness_at` in tests to keep them deterministic.
pub fn assess_freshness(last_observation: Option<NaiveDate>, max_age_days: u32) -> Freshness {
    assess_freshness_at(last_observation, max_age_days, Utc::now().date_naive())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A fixed "today" used across all tests: 2024-05-01.
    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn days_ago(n: u64) -> Option<NaiveDate> {
        fixed_today().checked_sub_days(chrono::Days::new(n))
    }

    // --- Not stale ----------------------------------------------------------

    #[test]
    fn test_sample_from_last_week_is_fresh() {
        let f = assess_freshness_at(days_ago(7), 14, fixed_today());
        assert!(!f.stale);
        assert_eq!(f.age_days, Some(7));
    }

    #[test]
    fn test_sample_exactly_at_limit_is_not_stale() {
        let f = assess_freshness_at(days_ago(14), 14, fixed_today());
        assert!(!f.stale, "age equal to the limit is not stale");
    }

    #[test]
    fn test_future_dated_sample_counts_as_today() {
        let tomorrow = fixed_today().succ_opt();
        let f = assess_freshness_at(tomorrow, 14, fixed_today());
        assert_eq!(f.age_days, Some(0));
        assert!(!f.stale);
    }

    // --- Stale --------------------------------------------------------------

    #[test]
    fn test_one_day_past_limit_is_stale() {
        let f = assess_freshness_at(days_ago(15), 14, fixed_today());
        assert!(f.stale);
    }

    #[test]
    fn test_no_observation_is_stale() {
        let f = assess_freshness_at(None, 14, fixed_today());
        assert!(f.stale);
        assert_eq!(f.age_days, None);
    }

    #[test]
    fn test_same_sample_stale_under_tight_limit_not_under_loose() {
        let tight = assess_freshness_at(days_ago(30), 21, fixed_today());
        let loose = assess_freshness_at(days_ago(30), 45, fixed_today());
        assert!(tight.stale);
        assert!(!loose.stale);
    }

    // --- Wall clock ---------------------------------------------------------

    #[test]
    fn test_wall_clock_wrapper_uses_today() {
        let today = Utc::now().date_naive();
        let last = today.checked_sub_days(chrono::Days::new(3));
        let f = assess_freshness(last, 14);
        // Tolerates the date rolling over between the two clock reads.
        assert!(f.as_of >= today);
        assert!(matches!(f.age_days, Some(3) | Some(4)));
        assert!(!f.stale);
        assert!(assess_freshness(None, 14).stale);
    }
}
