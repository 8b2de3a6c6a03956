/// Built-in base URLs for the Environment Agency real-time and archive APIs.
///
/// If `source` is already an `http(s)` URL, it is used as-is.
pub fn source_to_base_url(source: &str) -> Option<&'static str> {
    match source {
        "ea-flood" => Some("https://environment.data.gov.uk/flood-monitoring"),
        "ea-hydrology" => Some("https://environment.data.gov.uk/hydrology"),
        _ => None,
    }
}

pub fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
