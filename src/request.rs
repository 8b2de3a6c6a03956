use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::date::parse_date_like;
use crate::error::{Error, Result};
use crate::model::MeasurementType;

/// A readings query: an inclusive date range plus optional filters.
///
/// ```
/// use chrono::NaiveDate;
/// use ea_readings::{MeasurementType, ReadingsQuery};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
/// let query = ReadingsQuery::new(start, end)
///     .station("E7050")
///     .parameter(MeasurementType::Rainfall);
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingsQuery {
    pub(crate) start: NaiveDate,
    pub(crate) end: NaiveDate,
    pub(crate) stations: Vec<String>,
    pub(crate) parameter: Option<MeasurementType>,
    pub(crate) extra: BTreeMap<String, String>,
}

impl ReadingsQuery {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            stations: Vec::new(),
            parameter: None,
            extra: BTreeMap::new(),
        }
    }

    /// Restrict to one station reference. May be called repeatedly.
    pub fn station(mut self, station: impl Into<String>) -> Self {
        self.stations.push(station.into());
        self
    }

    pub fn stations<S: Into<String>>(mut self, stations: impl IntoIterator<Item = S>) -> Self {
        self.stations.extend(stations.into_iter().map(Into::into));
        self
    }

    pub fn parameter(mut self, parameter: MeasurementType) -> Self {
        self.parameter = Some(parameter);
        self
    }

    /// Pass an additional keyword straight through to the upstream query string.
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Construct a query from string pairs (typical for CLI/config inputs).
    ///
    /// Recognised keys: `startdate`, `enddate`, `stationReference` (comma separated)
    /// and `parameter`. Anything else is kept as a pass-through keyword.
    pub fn from_str_pairs<K, V>(
        pairs: impl IntoIterator<Item = (K, V)>,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut start = None;
        let mut end = None;
        let mut stations = Vec::new();
        let mut parameter = None;
        let mut extra = BTreeMap::new();

        for (k, v) in pairs {
            let v = v.as_ref().trim();
            match k.as_ref() {
                "startdate" => start = Some(parse_date_like(v, now)?),
                "enddate" => end = Some(parse_date_like(v, now)?),
                "stationReference" => stations.extend(
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                ),
                "parameter" => {
                    parameter = Some(v.parse::<MeasurementType>().map_err(Error::InvalidQuery)?)
                }
                other => {
                    extra.insert(other.to_string(), v.to_string());
                }
            }
        }

        let start = start.ok_or_else(|| Error::InvalidQuery("startdate missing".into()))?;
        // A single day when only the start is given.
        let end = end.unwrap_or(start);

        Ok(Self {
            start,
            end,
            stations,
            parameter,
            extra,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn station_filter(&self) -> &[String] {
        &self.stations
    }

    pub fn parameter_filter(&self) -> Option<&MeasurementType> {
        self.parameter.as_ref()
    }

    pub fn extra(&self) -> impl Iterator<Item = (&String, &String)> {
        self.extra.iter()
    }

    /// The date range is inclusive, so `start <= end` is enough for it to be non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::InvalidQuery(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        if self.stations.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidQuery("empty station reference".into()));
        }
        Ok(())
    }

    /// Split into one query per station and day. The upstream accepts a
    /// single `stationReference` per request, and single-day requests let
    /// past days be cached longer than today. Station order is kept, repeats
    /// are dropped, and days run in ascending order within each station.
    pub fn partition(&self) -> Vec<ReadingsQuery> {
        let stations: Vec<Vec<String>> = if self.stations.is_empty() {
            vec![Vec::new()]
        } else {
            unique_preserve(self.stations.clone())
                .into_iter()
                .map(|s| vec![s])
                .collect()
        };

        let mut parts = Vec::new();
        for station in stations {
            for day in self.start.iter_days().take_while(|d| *d <= self.end) {
                parts.push(ReadingsQuery {
                    start: day,
                    end: day,
                    stations: station.clone(),
                    ..self.clone()
                });
            }
        }
        parts
    }
}

fn unique_preserve(xs: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for x in xs {
        if seen.insert(x.clone()) {
            out.push(x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CURRENT_TTL, HISTORICAL_TTL, ttl_for_range};
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn rejects_reversed_range() {
        let err = ReadingsQuery::new(day(5), day(1)).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert!(ReadingsQuery::new(day(1), day(1)).validate().is_ok());
    }

    #[test]
    fn from_str_pairs_builds_query() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let q = ReadingsQuery::from_str_pairs(
            [
                ("startdate", "2024-01-02"),
                ("enddate", "20240104"),
                ("stationReference", "E1, E2,,"),
                ("parameter", "rainfall"),
                ("_view", "full"),
            ],
            now,
        )
        .unwrap();
        assert_eq!(q.start(), day(2));
        assert_eq!(q.end(), day(4));
        assert_eq!(q.station_filter(), ["E1".to_string(), "E2".to_string()]);
        assert_eq!(q.parameter_filter(), Some(&MeasurementType::Rainfall));
        assert_eq!(q.extra().next(), Some((&"_view".to_string(), &"full".to_string())));
    }

    #[test]
    fn from_str_pairs_requires_start() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert!(ReadingsQuery::from_str_pairs([("enddate", "2024-01-02")], now).is_err());
    }

    #[test]
    fn partition_per_station_and_day() {
        let q = ReadingsQuery::new(day(1), day(2)).stations(["A", "B", "A"]);
        let parts = q.partition();
        let shape: Vec<(&str, NaiveDate, NaiveDate)> = parts
            .iter()
            .map(|p| (p.station_filter()[0].as_str(), p.start(), p.end()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("A", day(1), day(1)),
                ("A", day(2), day(2)),
                ("B", day(1), day(1)),
                ("B", day(2), day(2)),
            ]
        );

        let open = ReadingsQuery::new(day(3), day(3)).parameter(MeasurementType::Level);
        assert_eq!(open.partition(), vec![open.clone()]);
        assert!(ReadingsQuery::new(day(3), day(1)).partition().is_empty());
    }

    #[test]
    fn mixed_range_gets_per_day_cache_lifetimes() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let ttls: Vec<_> = ReadingsQuery::new(day(1), day(3))
            .partition()
            .iter()
            .map(|p| ttl_for_range(&p.end(), now))
            .collect();
        assert_eq!(ttls, vec![HISTORICAL_TTL, HISTORICAL_TTL, CURRENT_TTL]);
    }
}
