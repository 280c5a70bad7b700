/// Checks if a host matches an allow-list entry
///
/// An entry matches the bare domain and every subdomain of it. A leading
/// `*.` is accepted and means the same thing, so `example.com` and
/// `*.example.com` are equivalent. Comparison ignores ASCII case.
///
/// # Examples
///
/// ```
/// use clawdgle::url::matches_domain;
///
/// assert!(matches_domain("example.com", "example.com"));
/// assert!(matches_domain("example.com", "blog.example.com"));
/// assert!(matches_domain("*.example.com", "api.v2.example.com"));
/// assert!(!matches_domain("example.com", "notexample.com"));
/// ```
pub fn matches_domain(pattern: &str, candidate: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    if base.is_empty() || candidate.is_empty() {
        return false;
    }

    let base = base.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    candidate == base || candidate.ends_with(&format!(".{}", base))
}

/// Checks a host against an allow-list; an empty list allows everything
pub fn domain_allowed(host: &str, allow: &[String]) -> bool {
    allow.is_empty() || allow.iter().any(|pattern| matches_domain(pattern, host))
}
