//! Decoding of upstream payloads into [`Record`]s.
//!
//! Every entry is validated on its own. An entry with a missing or unusable
//! field is counted as rejected and skipped; only a page where (nearly) every
//! entry fails is treated as a schema problem.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::date::parse_timestamp;
use crate::error::ParseError;
use crate::model::{MeasurementType, Page, ParsedPage, QualityFlag, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    /// Fraction of rejected entries (0, 1] at which a page counts as a schema
    /// mismatch. The default of 1.0 fails only pages where every entry is invalid.
    pub schema_mismatch_ratio: f64,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            schema_mismatch_ratio: 1.0,
        }
    }
}

/// Entries and continuation token of one response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub entries: Vec<Value>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    meta: Option<RawMeta>,
    items: Vec<Value>,
    #[serde(default)]
    next: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    #[serde(default)]
    next: Option<Value>,
}

/// Decode a response body into its entries and next cursor.
///
/// The body must be a JSON object with an `items` array. The cursor is read
/// from `meta.next`, falling back to a top-level `next`; strings and numbers
/// are accepted, empty strings mean "no next page".
pub fn decode_envelope(body: &str, page: usize) -> Result<Envelope, ParseError> {
    let raw: RawEnvelope = serde_json::from_str(body).map_err(|e| ParseError::SchemaMismatch {
        page,
        rejected: 0,
        total: 0,
        detail: format!("unreadable envelope: {e}"),
    })?;

    let next = raw.meta.and_then(|m| m.next).or(raw.next);
    let next_cursor = match next {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(Envelope {
        entries: raw.items,
        next_cursor,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(default, alias = "timestamp")]
    date_time: Option<String>,
    #[serde(default)]
    measure: Option<RawMeasure>,
    #[serde(default, alias = "station_id")]
    station_reference: Option<String>,
    #[serde(default, alias = "measurement_type")]
    parameter: Option<String>,
    #[serde(default)]
    value: Option<RawValue>,
    #[serde(default, alias = "quality_flag")]
    quality: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMeasure {
    Uri(String),
    Detail {
        #[serde(default, rename = "@id")]
        id: Option<String>,
        #[serde(default, rename = "stationReference")]
        station_reference: Option<String>,
        #[serde(default)]
        parameter: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

/// `.../id/measures/E7050-rainfall-tipping_bucket_raingauge-t-15_min-mm`
/// yields `("E7050", "rainfall")`.
fn split_measure_uri(uri: &str) -> (Option<String>, Option<String>) {
    let notation = uri.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    let mut parts = notation.split('-').filter(|p| !p.is_empty());
    let station = parts.next().map(str::to_string);
    let parameter = parts.next().map(str::to_string);
    (station, parameter)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Decode one entry, or say why it was rejected.
pub fn decode_entry(entry: &Value) -> Result<Record, String> {
    let raw = RawEntry::deserialize(entry).map_err(|e| format!("malformed entry: {e}"))?;

    let (measure_station, measure_parameter) = match raw.measure {
        Some(RawMeasure::Uri(uri)) => split_measure_uri(&uri),
        Some(RawMeasure::Detail {
            id,
            station_reference,
            parameter,
        }) => {
            let (id_station, id_parameter) = id.as_deref().map(split_measure_uri).unwrap_or((None, None));
            (
                non_empty(station_reference).or(id_station),
                non_empty(parameter).or(id_parameter),
            )
        }
        None => (None, None),
    };

    let station_id = non_empty(measure_station)
        .or_else(|| non_empty(raw.station_reference))
        .ok_or("missing station reference")?;

    let measurement_type: MeasurementType = non_empty(measure_parameter)
        .or_else(|| non_empty(raw.parameter))
        .ok_or("missing measurement type")?
        .parse()?;

    let raw_time = raw.date_time.ok_or("missing timestamp")?;
    let timestamp = parse_timestamp(&raw_time).ok_or_else(|| format!("unparseable timestamp: {raw_time}"))?;

    let value = match raw.value.ok_or("missing value")? {
        RawValue::Number(n) => n,
        RawValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("non-numeric value: {s}"))?,
    };
    if !value.is_finite() {
        return Err(format!("non-finite value: {value}"));
    }

    let quality_flag = match raw.quality {
        Some(q) => q.parse::<QualityFlag>()?,
        None => QualityFlag::Provisional,
    };

    Ok(Record {
        station_id,
        timestamp,
        measurement_type,
        value,
        quality_flag,
    })
}

/// Decode every entry of `page`.
///
/// Fails with [`ParseError::SchemaMismatch`] when the share of rejected
/// entries reaches `options.schema_mismatch_ratio`. An empty page is fine.
pub fn parse(page: &Page, options: &ParserOptions) -> Result<ParsedPage, ParseError> {
    let total = page.entries.len();
    let mut records = Vec::with_capacity(total);
    let mut rejected = 0usize;
    let mut first_reason: Option<String> = None;

    for (position, entry) in page.entries.iter().enumerate() {
        match decode_entry(entry) {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!(page = page.index, position, reason = %reason, "entry rejected");
                rejected += 1;
                first_reason.get_or_insert(reason);
            }
        }
    }

    let ratio = options.schema_mismatch_ratio.clamp(f64::EPSILON, 1.0);
    if total > 0 && rejected as f64 >= ratio * total as f64 {
        return Err(ParseError::SchemaMismatch {
            page: page.index,
            rejected,
            total,
            detail: first_reason.unwrap_or_default(),
        });
    }

    if rejected > 0 {
        info!(page = page.index, parsed = records.len(), rejected, "page parsed with rejections");
    }

    Ok(ParsedPage {
        page_index: page.index,
        parsed: records.len(),
        records,
        rejected,
    })
}
