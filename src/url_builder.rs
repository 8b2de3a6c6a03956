use url::Url;

use crate::date::iso_date;
use crate::error::Result;
use crate::request::ReadingsQuery;

pub const READINGS_PATH: &str = "data/readings";

// The full view embeds the measure object, which carries station and parameter.
const DEFAULT_VIEW: (&str, &str) = ("_view", "full");

/// Build the readings URL for one page of `query`.
///
/// `cursor` is the `(parameter, value)` pair that selects the page; `None`
/// requests the first page.
pub fn readings_url(
    base_url: &str,
    query: &ReadingsQuery,
    page_size: usize,
    cursor: Option<(&str, &str)>,
) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        READINGS_PATH
    ))?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("startdate", &iso_date(&query.start));
        pairs.append_pair("enddate", &iso_date(&query.end));
        for station in &query.stations {
            pairs.append_pair("stationReference", station);
        }
        if let Some(parameter) = &query.parameter {
            pairs.append_pair("parameter", parameter.as_str());
        }
        for (k, v) in &query.extra {
            pairs.append_pair(k, v);
        }
        if !query.extra.contains_key(DEFAULT_VIEW.0) {
            pairs.append_pair(DEFAULT_VIEW.0, DEFAULT_VIEW.1);
        }
        pairs.append_pair("_limit", &page_size.to_string());
        if let Some((param, value)) = cursor {
            pairs.append_pair(param, value);
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MeasurementType;
    use chrono::NaiveDate;

    fn query() -> ReadingsQuery {
        ReadingsQuery::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 3).unwrap(),
        )
        .station("E7050")
        .parameter(MeasurementType::Rainfall)
        .kw("_view", "full")
    }

    #[test]
    fn first_page_url() {
        let url = readings_url("https://example.org/flood-monitoring/", &query(), 500, None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.org/flood-monitoring/data/readings?startdate=2024-02-01&enddate=2024-02-03&stationReference=E7050&parameter=rainfall&_view=full&_limit=500"
        );
    }

    #[test]
    fn full_view_unless_overridden() {
        let q = ReadingsQuery::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        );
        let url = readings_url("http://localhost", &q, 5, None).unwrap();
        assert!(url.as_str().ends_with("&_view=full&_limit=5"));

        let url = readings_url("http://localhost", &q.kw("_view", "compact"), 5, None).unwrap();
        assert!(url.as_str().contains("_view=compact"));
        assert!(!url.as_str().contains("_view=full"));
    }

    #[test]
    fn cursor_is_appended_and_encoded() {
        let url = readings_url("http://localhost:1234", &query(), 10, Some(("_cursor", "a b&c"))).unwrap();
        assert!(url.as_str().ends_with("&_limit=10&_cursor=a+b%26c"));
    }
}
