use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use clawdgle::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the politeness key for a URL: its origin (`scheme://host[:port]`)
///
/// Two URLs share a politeness record exactly when they would be served by
/// the same origin, so `http://a.example` and `https://a.example` are tracked
/// separately, as are different explicit ports.
///
/// ```
/// use url::Url;
/// use clawdgle::url::authority_key;
///
/// let url = Url::parse("https://a.example:8443/page?x=1").unwrap();
/// assert_eq!(authority_key(&url), "https://a.example:8443");
/// ```
pub fn authority_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Returns the robots.txt location for the URL's origin
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}
