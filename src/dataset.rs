use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{MeasurementType, QualityFlag, Record};

/// Counters collected while building a [`Dataset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub pages: usize,
    pub parsed: usize,
    pub rejected: usize,
    /// Records dropped because another record had the same key.
    pub duplicates: usize,
}

/// The merged readings of one pipeline run.
///
/// Records are sorted by `(station_id, timestamp, measurement_type)` and keys
/// are unique. A `Dataset` cannot be modified; clones share the same storage
/// and can be handed to other threads or tasks.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<[Record]>,
    summary: FetchSummary,
}

/// Filters for [`Dataset::select`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub station: Option<String>,
    pub measurement_type: Option<MeasurementType>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    pub fn measurement_type(mut self, t: MeasurementType) -> Self {
        self.measurement_type = Some(t);
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    fn matches(&self, r: &Record) -> bool {
        self.station.as_deref().is_none_or(|s| r.station_id == s)
            && self.measurement_type.as_ref().is_none_or(|t| &r.measurement_type == t)
            && self.from.is_none_or(|from| r.timestamp >= from)
            && self.until.is_none_or(|until| r.timestamp < until)
    }
}

/// Sum of one measurement type at one station, e.g. total rainfall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationTotal {
    pub station_id: String,
    pub measurement_type: MeasurementType,
    pub total: f64,
    pub count: usize,
}

impl Dataset {
    /// `records` must already be sorted and free of duplicate keys; see [`crate::merge::merge`].
    pub(crate) fn from_sorted(records: Vec<Record>, summary: FetchSummary) -> Self {
        Self {
            records: records.into(),
            summary,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> FetchSummary {
        self.summary
    }

    /// Distinct station ids, ascending.
    pub fn stations(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for r in self.records.iter() {
            if out.last() != Some(&r.station_id.as_str()) {
                out.push(&r.station_id);
            }
        }
        out
    }

    pub fn measurement_types(&self) -> Vec<&MeasurementType> {
        self.records
            .iter()
            .map(|r| &r.measurement_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// All records of one station, in timestamp order.
    pub fn for_station(&self, station_id: &str) -> &[Record] {
        let lo = self.records.partition_point(|r| r.station_id.as_str() < station_id);
        let hi = self.records.partition_point(|r| r.station_id.as_str() <= station_id);
        &self.records[lo..hi]
    }

    pub fn of_type(&self, t: &MeasurementType) -> Vec<&Record> {
        self.records.iter().filter(|r| &r.measurement_type == t).collect()
    }

    /// Records with `start <= timestamp < end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp < end)
            .collect()
    }

    pub fn select(&self, selection: &Selection) -> Vec<&Record> {
        let candidates = match &selection.station {
            Some(s) => self.for_station(s),
            None => self.records(),
        };
        candidates.iter().filter(|r| selection.matches(r)).collect()
    }

    /// Per-station sums of `t`, ignoring records flagged invalid and values
    /// outside [`MeasurementType::plausible_range`].
    pub fn totals_by_station(&self, t: &MeasurementType) -> Vec<StationTotal> {
        self.totals_by_station_within(t, t.plausible_range())
    }

    /// Like [`totals_by_station`](Self::totals_by_station) with an explicit
    /// value bound; `None` sums every non-invalid record.
    pub fn totals_by_station_within(
        &self,
        t: &MeasurementType,
        bounds: Option<RangeInclusive<f64>>,
    ) -> Vec<StationTotal> {
        let mut out: Vec<StationTotal> = Vec::new();
        for r in self.records.iter() {
            if &r.measurement_type != t || r.quality_flag == QualityFlag::Invalid {
                continue;
            }
            if bounds.as_ref().is_some_and(|b| !b.contains(&r.value)) {
                continue;
            }
            match out.last_mut() {
                Some(last) if last.station_id == r.station_id => {
                    last.total += r.value;
                    last.count += 1;
                }
                _ => out.push(StationTotal {
                    station_id: r.station_id.clone(),
                    measurement_type: t.clone(),
                    total: r.value,
                    count: 1,
                }),
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn rec(station: &str, hour: u32, kind: MeasurementType, value: f64, q: QualityFlag) -> Record {
        Record {
            station_id: station.into(),
            timestamp: t(hour),
            measurement_type: kind,
            value,
            quality_flag: q,
        }
    }

    fn sample() -> Dataset {
        Dataset::from_sorted(
            vec![
                rec("A", 0, MeasurementType::Rainfall, 0.5, QualityFlag::Valid),
                rec("A", 1, MeasurementType::Rainfall, 1.0, QualityFlag::Provisional),
                rec("A", 1, MeasurementType::Level, 1.2, QualityFlag::Valid),
                rec("A", 2, MeasurementType::Rainfall, 50.0, QualityFlag::Invalid),
                rec("B", 0, MeasurementType::Rainfall, 2.0, QualityFlag::Valid),
                rec("C", 3, MeasurementType::Level, 0.9, QualityFlag::Valid),
            ],
            FetchSummary::default(),
        )
    }

    #[test]
    fn station_lookup() {
        let ds = sample();
        assert_eq!(ds.stations(), vec!["A", "B", "C"]);
        assert_eq!(ds.for_station("A").len(), 4);
        assert_eq!(ds.for_station("B").len(), 1);
        assert!(ds.for_station("Z").is_empty());
        assert!(ds.for_station("AA").is_empty());
    }

    #[test]
    fn type_and_window_filters() {
        let ds = sample();
        assert_eq!(ds.of_type(&MeasurementType::Level).len(), 2);
        assert!(ds.of_type(&MeasurementType::Pm25).is_empty());
        assert_eq!(ds.between(t(1), t(3)).len(), 3);
        assert!(ds.between(t(5), t(6)).is_empty());
        assert_eq!(
            ds.measurement_types(),
            vec![&MeasurementType::Rainfall, &MeasurementType::Level]
        );
    }

    #[test]
    fn combined_selection() {
        let ds = sample();
        let sel = Selection::new()
            .station("A")
            .measurement_type(MeasurementType::Rainfall)
            .since(t(1));
        let hits = ds.select(&sel);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r.station_id == "A" && r.timestamp >= t(1)));

        assert_eq!(ds.select(&Selection::new()).len(), ds.len());
        assert!(ds.select(&Selection::new().station("nowhere")).is_empty());
    }

    #[test]
    fn totals_skip_invalid_records() {
        let totals = sample().totals_by_station(&MeasurementType::Rainfall);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].station_id, "A");
        assert_eq!(totals[0].total, 1.5);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals[1].station_id, "B");
        assert_eq!(totals[1].total, 2.0);
    }

    #[test]
    fn rainfall_totals_skip_implausible_values() {
        let ds = Dataset::from_sorted(
            vec![
                rec("A", 0, MeasurementType::Rainfall, 0.4, QualityFlag::Valid),
                rec("A", 1, MeasurementType::Rainfall, 9999.0, QualityFlag::Valid),
                rec("A", 2, MeasurementType::Rainfall, -5.0, QualityFlag::Valid),
                rec("B", 0, MeasurementType::Rainfall, 100.0, QualityFlag::Valid),
            ],
            FetchSummary::default(),
        );

        let totals = ds.totals_by_station(&MeasurementType::Rainfall);
        assert_eq!(totals.len(), 2);
        assert_eq!((totals[0].total, totals[0].count), (0.4, 1));
        assert_eq!((totals[1].total, totals[1].count), (100.0, 1));

        let raw = ds.totals_by_station_within(&MeasurementType::Rainfall, None);
        assert!((raw[0].total - 9994.4).abs() < 1e-9);
        assert_eq!(raw[0].count, 3);
        assert_eq!(
            ds.totals_by_station_within(&MeasurementType::Rainfall, Some(0.0..=1.0))
                .len(),
            1
        );
    }

    #[test]
    fn shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dataset>();

        let ds = sample();
        let clone = ds.clone();
        let handle = std::thread::spawn(move || clone.len());
        assert_eq!(handle.join().unwrap(), ds.len());
    }
}
