//! Read-only view of the request headers observed by the proxy.

use std::collections::HashMap;

/// Request headers with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    headers: HashMap<String, String>,
}

impl RequestHeaders {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    /// Value of the header `name`, compared without regard to ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RequestHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
