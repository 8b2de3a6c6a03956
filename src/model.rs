use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of an observation. Units are implied by the category
/// (mm for rainfall, m for level, m3/s for flow, ug/m3 for pollutants).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MeasurementType {
    Rainfall,
    Level,
    Flow,
    Temperature,
    Wind,
    Pm25,
    Pm10,
    No2,
    O3,
    So2,
    /// Upstream parameter without a dedicated variant, lowercased.
    Other(String),
}

impl MeasurementType {
    pub fn as_str(&self) -> &str {
        match self {
            MeasurementType::Rainfall => "rainfall",
            MeasurementType::Level => "level",
            MeasurementType::Flow => "flow",
            MeasurementType::Temperature => "temperature",
            MeasurementType::Wind => "wind",
            MeasurementType::Pm25 => "pm25",
            MeasurementType::Pm10 => "pm10",
            MeasurementType::No2 => "no2",
            MeasurementType::O3 => "o3",
            MeasurementType::So2 => "so2",
            MeasurementType::Other(s) => s,
        }
    }

    /// Range a single reading can physically take, where one is known.
    /// Rainfall gauges report at most 100 mm per reading interval.
    pub fn plausible_range(&self) -> Option<RangeInclusive<f64>> {
        match self {
            MeasurementType::Rainfall => Some(0.0..=100.0),
            _ => None,
        }
    }
}

impl FromStr for MeasurementType {
    type Err = String;

    /// Accepts upstream spellings such as `rainfall`, `PM2.5`, `pm_10`, `NO2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        if t.is_empty() {
            return Err("empty measurement type".to_string());
        }
        let compact: String = t.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        Ok(match compact.as_str() {
            "rainfall" | "rain" => MeasurementType::Rainfall,
            "level" | "stage" => MeasurementType::Level,
            "flow" => MeasurementType::Flow,
            "temperature" | "temp" => MeasurementType::Temperature,
            "wind" => MeasurementType::Wind,
            "pm25" => MeasurementType::Pm25,
            "pm10" => MeasurementType::Pm10,
            "no2" => MeasurementType::No2,
            "o3" | "ozone" => MeasurementType::O3,
            "so2" => MeasurementType::So2,
            _ => MeasurementType::Other(t),
        })
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MeasurementType> for String {
    fn from(value: MeasurementType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for MeasurementType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Confidence attached to a reading by the upstream source.
///
/// Variant order is precedence order: `Valid > Provisional > Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    Invalid,
    Provisional,
    Valid,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Invalid => "invalid",
            QualityFlag::Provisional => "provisional",
            QualityFlag::Valid => "valid",
        }
    }
}

impl FromStr for QualityFlag {
    type Err = String;

    /// Maps both our own names and the Environment Agency quality vocabulary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" | "good" => Ok(QualityFlag::Valid),
            "provisional" | "unchecked" | "estimated" => Ok(QualityFlag::Provisional),
            "invalid" | "suspect" | "missing" | "rejected" => Ok(QualityFlag::Invalid),
            other => Err(format!("unknown quality flag: {other}")),
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub station_id: String,
    pub timestamp: DateTime<Utc>,
    pub measurement_type: MeasurementType,
    pub value: f64,
    pub quality_flag: QualityFlag,
}

/// Identity of a record inside a dataset.
pub type RecordKey = (String, DateTime<Utc>, MeasurementType);

impl Record {
    pub fn key(&self) -> RecordKey {
        (
            self.station_id.clone(),
            self.timestamp,
            self.measurement_type.clone(),
        )
    }
}

/// One upstream response, before entry decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Position in fetch order across the whole run.
    pub index: usize,
    pub url: String,
    pub entries: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
}

/// The decoded content of a [`Page`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub page_index: usize,
    pub records: Vec<Record>,
    pub parsed: usize,
    pub rejected: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_type_accepts_upstream_spellings() {
        assert_eq!("PM2.5".parse::<MeasurementType>().unwrap(), MeasurementType::Pm25);
        assert_eq!("pm_10".parse::<MeasurementType>().unwrap(), MeasurementType::Pm10);
        assert_eq!("Rainfall".parse::<MeasurementType>().unwrap(), MeasurementType::Rainfall);
        assert_eq!(
            "Groundwater".parse::<MeasurementType>().unwrap(),
            MeasurementType::Other("groundwater".to_string())
        );
        assert!("  ".parse::<MeasurementType>().is_err());
    }

    #[test]
    fn rainfall_has_plausible_range() {
        let range = MeasurementType::Rainfall.plausible_range().unwrap();
        assert!(range.contains(&0.0) && range.contains(&100.0));
        assert!(!range.contains(&-0.1) && !range.contains(&100.5));
        assert_eq!(MeasurementType::Level.plausible_range(), None);
    }

    #[test]
    fn quality_precedence_order() {
        assert!(QualityFlag::Valid > QualityFlag::Provisional);
        assert!(QualityFlag::Provisional > QualityFlag::Invalid);
        assert_eq!("Good".parse::<QualityFlag>().unwrap(), QualityFlag::Valid);
        assert_eq!("Unchecked".parse::<QualityFlag>().unwrap(), QualityFlag::Provisional);
        assert_eq!("Suspect".parse::<QualityFlag>().unwrap(), QualityFlag::Invalid);
        assert!("excellent".parse::<QualityFlag>().is_err());
    }
}
