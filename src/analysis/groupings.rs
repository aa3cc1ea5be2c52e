/// Groups a flat observation list into per-site structures.
///
/// Sites are independent: every table is built from one site's own
/// history, so grouping is the first step of any multi-site run. A
/// `BTreeMap` keeps iteration order stable across runs.

use std::collections::BTreeMap;

use crate::model::Observation;

/// Observations keyed by site id, each group in input order.
pub fn group_by_site(observations: &[Observation]) -> BTreeMap<String, Vec<Observation>> {
    let mut groups: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    for obs in observations {
        groups.entry(obs.site_id.clone()).or_default().push(obs.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Censoring;
    use chrono::{TimeZone, Utc};

    fn obs(site: &str, value: f64) -> Observation {
        Observation {
            timestamp: Utc.with_ymd_and_hms(2020, 5, 1, 9, 0, 0).unwrap(),
            site_id: site.to_string(),
            determinand_code: "7887".to_string(),
            value: Some(value),
            unit: Some("ug/l".to_string()),
            censoring: Censoring::Uncensored,
        }
    }

    #[test]
    fn test_group_by_site_preserves_order_within_site() {
        let input = vec![obs("B", 1.0), obs("A", 2.0), obs("B", 3.0)];
        let groups = group_by_site(&input);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
        let b: Vec<_> = groups["B"].iter().map(|o| o.value).collect();
        assert_eq!(b, vec![Some(1.0), Some(3.0)]);
    }
}
