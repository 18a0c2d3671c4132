//! Request parameters: the semantic identity of an outbound call.

use std::collections::BTreeMap;
use std::fmt;

/// A scalar parameter value.
///
/// Values are stringified with [`Display`](fmt::Display) both on the wire
/// and when building cache keys, so `Int(1)` and `Str("1")` address the
/// same cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Mapping from parameter name to scalar value.
///
/// Key spelling is preserved as given (it is what goes on the wire); cache
/// keys fold casing separately. Iteration order is lexicographic by key.
///
/// ```rust
/// # use tollgate::RequestParams;
/// let params = RequestParams::new()
///     .with("location", "Austin, TX")
///     .with("page", 2)
///     .with("status_type", "ForSale");
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    entries: BTreeMap<String, ParamValue>,
}

impl RequestParams {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder style). Replaces an existing value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a parameter, returning the previous value for that exact key.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove a parameter.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.entries.remove(key)
    }

    /// Look up a parameter by its exact key.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parameters as stringified `(key, value)` pairs, ready for a query string.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RequestParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_plain() {
        assert_eq!(ParamValue::from("a b").to_string(), "a b");
        assert_eq!(ParamValue::from(42).to_string(), "42");
        assert_eq!(ParamValue::from(1.5).to_string(), "1.5");
        assert_eq!(ParamValue::from(true).to_string(), "true");
    }

    #[test]
    fn integral_float_matches_int() {
        assert_eq!(
            ParamValue::from(2.0).to_string(),
            ParamValue::from(2).to_string()
        );
    }

    #[test]
    fn insert_replaces_same_key() {
        let mut params = RequestParams::new().with("page", 1);
        let old = params.insert("page", 2);
        assert_eq!(old, Some(ParamValue::Int(1)));
        assert_eq!(params.get("page"), Some(&ParamValue::Int(2)));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn query_pairs_are_sorted_and_stringified() {
        let params: RequestParams = [("b", "x"), ("a", "y")].into_iter().collect();
        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("a".to_string(), "y".to_string()),
                ("b".to_string(), "x".to_string())
            ]
        );
    }
}
