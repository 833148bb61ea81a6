//! Inbound path to backend URL rewriting.

/// The part of `path` after the last `/{service}/`, or `""` when the marker
/// does not occur. This is a plain substring split, not a route-template match.
pub fn strip_service_prefix<'a>(path: &'a str, service: &str) -> &'a str {
    let marker = format!("/{}/", service);
    match path.rfind(&marker) {
        Some(idx) => &path[idx + marker.len()..],
        None => "",
    }
}

/// `{base_url}/{rest}` without trailing slashes, with `query` appended verbatim.
pub fn target_url(base_url: &str, rest: &str, query: Option<&str>) -> String {
    let url = format!("{}/{}", base_url, rest);
    let url = url.trim_end_matches('/');

    match query {
        Some(query) if !query.is_empty() => format!("{}?{}", url, query),
        _ => url.to_string(),
    }
}
