use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "msclkid"];

/// Normalizes a URL before it is deduplicated, fetched, and keyed
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything other than http/https, or a URL without a host
/// 3. Lowercase the host and drop a default port (done by the parser)
/// 4. Resolve dot segments in the path (done by the parser)
/// 5. Remove the fragment
/// 6. Remove tracking query parameters (`utm_*`, `fbclid`, ...)
/// 7. Sort remaining query parameters by key, dropping an empty query
///
/// Scheme and `www.` are left alone: both change which server answers.
///
/// # Examples
///
/// ```
/// use clawdgle::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/page?utm_source=x&b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Stable sort keeps the relative order of repeated keys
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
