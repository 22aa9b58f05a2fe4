/// Canonical form of a request path or pattern.
///
/// Trims surrounding whitespace, lowercases, and strips trailing `/`
/// characters. The root path stays `/`.
pub fn normalize(uri: &str) -> String {
    let lowered = uri.trim().to_lowercase();

    let trimmed = lowered.trim_end_matches('/');

    if trimmed.is_empty() && !lowered.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
