/// Determinand registry for the bloom-risk pipeline.
///
/// Defines the canonical list of EA water-quality determinands carried on
/// the daily grid, along with their units and plausible value ranges.
/// This is the single source of truth for determinand codes; all other
/// modules should resolve codes through here rather than hardcoding them.

use crate::model::Determinand;

// ---------------------------------------------------------------------------
// EA determinand notations
// ---------------------------------------------------------------------------

/// Chlorophyll : Acetone Extract, µg/L.
pub const CODE_CHLOROPHYLL: &str = "7887";

/// Phosphorus, Total as P, mg/L.
pub const CODE_TOTAL_PHOSPHORUS: &str = "348";

/// Nitrogen, Total as N, mg/L.
pub const CODE_TOTAL_NITROGEN: &str = "9686";

/// pH, phunits.
pub const CODE_PH: &str = "61";

/// Temperature of Water, °C.
pub const CODE_TEMPERATURE: &str = "76";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Metadata for a single determinand.
pub struct DeterminandInfo {
    pub determinand: Determinand,
    /// EA notation without leading zeros.
    pub code: &'static str,
    /// Official EA preferred label.
    pub label: &'static str,
    /// Units accepted by the clean layer when unit enforcement is on.
    pub allowed_units: &'static [&'static str],
    /// Inclusive plausible range; values outside are dropped as invalid.
    pub plausible_range: (f64, f64),
}

pub static DETERMINAND_REGISTRY: &[DeterminandInfo] = &[
    DeterminandInfo {
        determinand: Determinand::Chlorophyll,
        code: CODE_CHLOROPHYLL,
        label: "Chlorophyll : Acetone Extract",
        allowed_units: &["ug/l", "µg/l", "ug/L", "µg/L"],
        plausible_range: (0.0, 1_000.0),
    },
    DeterminandInfo {
        determinand: Determinand::TotalPhosphorus,
        code: CODE_TOTAL_PHOSPHORUS,
        label: "Phosphorus, Total as P",
        allowed_units: &["mg/l", "mg/L"],
        plausible_range: (0.0, 10.0),
    },
    DeterminandInfo {
        determinand: Determinand::TotalNitrogen,
        code: CODE_TOTAL_NITROGEN,
        label: "Nitrogen, Total as N",
        allowed_units: &["mg/l", "mg/L"],
        plausible_range: (0.0, 50.0),
    },
    DeterminandInfo {
        determinand: Determinand::Ph,
        code: CODE_PH,
        label: "pH",
        allowed_units: &["phunits", "pH"],
        plausible_range: (0.0, 14.0),
    },
    DeterminandInfo {
        determinand: Determinand::Temperature,
        code: CODE_TEMPERATURE,
        label: "Temperature of Water",
        allowed_units: &["cel", "degC", "°C"],
        plausible_range: (-5.0, 40.0),
    },
];

/// Normalises an EA notation for comparison: trims whitespace and strips
/// leading zeros, so "0061" and "61" match. An all-zero code becomes "0".
pub fn normalize_code(code: &str) -> String {
    let stripped = code.trim().trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Looks up a determinand by EA notation. Returns `None` if the code is not
/// carried by this pipeline.
pub fn find_by_code(code: &str) -> Option<&'static DeterminandInfo> {
    let normalized = normalize_code(code);
    DETERMINAND_REGISTRY.iter().find(|d| d.code == normalized)
}

/// Registry entry for a determinand. Every `Determinand` variant is present.
pub fn info(determinand: Determinand) -> &'static DeterminandInfo {
    DETERMINAND_REGISTRY
        .iter()
        .find(|d| d.determinand == determinand)
        .unwrap_or(&DETERMINAND_REGISTRY[0])
}

/// Checks a unit string against the determinand's accepted spellings,
/// ignoring ASCII case.
pub fn unit_is_allowed(determinand: Determinand, unit: &str) -> bool {
    info(determinand)
        .allowed_units
        .iter()
        .any(|u| u.eq_ignore_ascii_case(unit.trim()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_determinand_once() {
        for det in Determinand::ALL {
            let count = DETERMINAND_REGISTRY
                .iter()
                .filter(|d| d.determinand == det)
                .count();
            assert_eq!(count, 1, "{} should appear exactly once in the registry", det);
        }
    }

    #[test]
    fn test_info_returns_matching_entry() {
        for det in Determinand::ALL {
            assert_eq!(info(det).determinand, det);
        }
    }

    #[test]
    fn test_no_duplicate_codes() {
        let mut seen = std::collections::HashSet::new();
        for entry in DETERMINAND_REGISTRY {
            assert!(seen.insert(entry.code), "duplicate code '{}'", entry.code);
        }
    }

    #[test]
    fn test_codes_are_numeric_without_leading_zero() {
        for entry in DETERMINAND_REGISTRY {
            assert!(entry.code.chars().all(|c| c.is_ascii_digit()));
            assert!(!entry.code.starts_with('0'));
        }
    }

    #[test]
    fn test_normalize_code_strips_leading_zeros() {
        assert_eq!(normalize_code("0061"), "61");
        assert_eq!(normalize_code(" 7887 "), "7887");
        assert_eq!(normalize_code("000"), "0");
    }

    #[test]
    fn test_find_by_code_accepts_padded_notation() {
        let entry = find_by_code("0076").expect("temperature should resolve");
        assert_eq!(entry.determinand, Determinand::Temperature);
        assert!(find_by_code("9999").is_none());
    }

    #[test]
    fn test_plausible_ranges_are_ordered() {
        for entry in DETERMINAND_REGISTRY {
            assert!(
                entry.plausible_range.0 < entry.plausible_range.1,
                "range for '{}' must be ascending",
                entry.label
            );
        }
    }

    #[test]
    fn test_unit_check_is_case_insensitive() {
        assert!(unit_is_allowed(Determinand::Chlorophyll, "UG/L"));
        assert!(!unit_is_allowed(Determinand::Chlorophyll, "mg/l"));
    }
}
