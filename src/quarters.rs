use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::archive::Snapshot;

/// `"<year>Q<n>"`. Ordering is lexicographic, which matches chronological order for 4-digit years.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QuarterKey(String);

impl QuarterKey {
    /// Derive the key from a capture timestamp without validating it as a date.
    pub fn from_timestamp(timestamp: &str) -> Self {
        let year = slice(timestamp, 0, 4);
        let month: i32 = slice(timestamp, 4, 6).parse().unwrap_or(0);
        Self(format!("{}Q{}", year, quarter_of_month(month)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1–3 → 1, 4–6 → 2, 7–9 → 3, 10–12 → 4. Out-of-range months are not rejected.
pub fn quarter_of_month(month: i32) -> i32 {
    (month - 1).div_euclid(3) + 1
}

fn slice(s: &str, start: usize, end: usize) -> &str {
    s.get(start..end.min(s.len())).unwrap_or("")
}

/// The snapshot chosen to represent one quarter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarterlySnapshot {
    pub timestamp: String,
    pub url: String,
    /// `YYYY-MM-DD`, sliced from the timestamp.
    pub date: String,
}

impl From<&Snapshot> for QuarterlySnapshot {
    fn from(s: &Snapshot) -> Self {
        let ts = s.timestamp.as_str();
        Self {
            timestamp: s.timestamp.clone(),
            url: s.original_url.clone(),
            date: format!("{}-{}-{}", slice(ts, 0, 4), slice(ts, 4, 6), slice(ts, 6, 8)),
        }
    }
}

/// Keep the first record for each timestamp, preserving arrival order.
pub fn dedup_by_timestamp(snapshots: Vec<Snapshot>) -> Vec<Snapshot> {
    let mut seen = HashSet::new();
    snapshots
        .into_iter()
        .filter(|s| seen.insert(s.timestamp.clone()))
        .collect()
}

/// Bucket snapshots by quarter, keeping the earliest capture of each quarter.
///
/// Selection is by timestamp rather than arrival order, so the result does not depend on which
/// index query returned a capture first.
pub fn bucket_by_quarter(snapshots: &[Snapshot]) -> BTreeMap<QuarterKey, QuarterlySnapshot> {
    let mut earliest: BTreeMap<QuarterKey, &Snapshot> = BTreeMap::new();

    for snapshot in snapshots {
        let key = QuarterKey::from_timestamp(&snapshot.timestamp);
        earliest
            .entry(key)
            .and_modify(|current| {
                if snapshot.timestamp < current.timestamp {
                    *current = snapshot;
                }
            })
            .or_insert(snapshot);
    }

    earliest
        .into_iter()
        .map(|(key, s)| (key, QuarterlySnapshot::from(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ts: &str, url: &str) -> Snapshot {
        Snapshot::new(ts, url, 200)
    }

    #[test]
    fn quarter_is_function_of_month() {
        for (months, q) in [(1..=3, 1), (4..=6, 2), (7..=9, 3), (10..=12, 4)] {
            for m in months {
                assert_eq!(quarter_of_month(m), q, "month {}", m);
                let ts = format!("1999{:02}15000000", m);
                assert_eq!(QuarterKey::from_timestamp(&ts).as_str(), format!("1999Q{}", q));
            }
        }
    }

    #[test]
    fn malformed_timestamp_does_not_panic() {
        assert_eq!(QuarterKey::from_timestamp("2021").as_str(), "2021Q0");
        assert_eq!(QuarterKey::from_timestamp("2021xx").as_str(), "2021Q0");
        assert_eq!(QuarterKey::from_timestamp("20211399").as_str(), "2021Q5");
        assert_eq!(QuarterKey::from_timestamp("").as_str(), "Q0");
    }

    #[test]
    fn dedup_keeps_first_seen() {
        let input = vec![
            snap("20210115000000", "http://a/"),
            snap("20210301000000", "http://a/"),
            snap("20210115000000", "https://a/"),
        ];
        let out = dedup_by_timestamp(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].original_url, "http://a/");
        assert_eq!(out[1].timestamp, "20210301000000");
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            snap("20200101000000", "x"),
            snap("20200101000000", "y"),
            snap("20200202000000", "z"),
            snap("20200202000000", "z"),
        ];
        let once = dedup_by_timestamp(input);
        let twice = dedup_by_timestamp(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn buckets_first_of_quarter() {
        let input = vec![
            snap("20210115000000", "u1"),
            snap("20210301000000", "u2"),
            snap("20210410000000", "u3"),
        ];
        let q = bucket_by_quarter(&input);
        let keys: Vec<&str> = q.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["2021Q1", "2021Q2"]);
        assert_eq!(q[&QuarterKey::from_timestamp("20210115")].url, "u1");
        assert_eq!(q[&QuarterKey::from_timestamp("20210410")].url, "u3");
    }

    #[test]
    fn earliest_wins_regardless_of_order() {
        let input = vec![
            snap("20210301000000", "late"),
            snap("20210115000000", "early"),
        ];
        let q = bucket_by_quarter(&input);
        let only = q.values().next().unwrap();
        assert_eq!(only.url, "early");
        assert_eq!(only.date, "2021-01-15");
    }

    #[test]
    fn keys_sort_chronologically() {
        let input = vec![
            snap("20220505000000", "c"),
            snap("20191201000000", "a"),
            snap("20200101000000", "b"),
        ];
        let keys: Vec<String> = bucket_by_quarter(&input)
            .keys()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["2019Q4", "2020Q1", "2022Q2"]);
    }
}
