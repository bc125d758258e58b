//! Bearer credential extraction.

const BEARER_SEPARATOR: &str = "Bearer ";

/// Returns the token of an `authorization` value shaped exactly like
/// `Bearer <token>`.
///
/// The value is split on `"Bearer "`; only a split yielding an empty prefix
/// and one non-empty token is accepted. A missing scheme, a scheme in another
/// case, leading whitespace, an empty token or a second `"Bearer "` inside the
/// token are all rejected the same way.
pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let mut segments = value.split(BEARER_SEPARATOR);
    match (segments.next(), segments.next(), segments.next()) {
        (Some(""), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
