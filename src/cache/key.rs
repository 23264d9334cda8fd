//! Cache Key Module
//!
//! Derives stable cache keys from a logical namespace and a parameter set.
//!
//! Parameter names are sorted before concatenation, so two call sites that
//! pass the same parameters in a different order land on the same key.
//! Absent parameters are omitted entirely. Names and values are
//! percent-encoded (`%` and the delimiter only), so distinct parameter sets
//! can never render to the same key.

use std::collections::BTreeMap;
use std::fmt;

/// Separator between namespace segments, parameter names and values.
pub const KEY_DELIMITER: char = ':';

/// Encodes one parameter name or value for embedding in a key.
///
/// Only `%` and [`KEY_DELIMITER`] are rewritten, so ordinary ids and
/// numbers appear in keys unchanged.
pub fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            KEY_DELIMITER => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

// == Key Parameter ==
/// A scalar value that can participate in a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParam {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    /// Omitted from the derived key
    Absent,
}

impl fmt::Display for KeyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyParam::Str(s) => f.write_str(s),
            KeyParam::Int(n) => write!(f, "{}", n),
            KeyParam::UInt(n) => write!(f, "{}", n),
            KeyParam::Bool(b) => write!(f, "{}", b),
            KeyParam::Absent => Ok(()),
        }
    }
}

impl From<&str> for KeyParam {
    fn from(value: &str) -> Self {
        KeyParam::Str(value.to_string())
    }
}

impl From<String> for KeyParam {
    fn from(value: String) -> Self {
        KeyParam::Str(value)
    }
}

impl From<&String> for KeyParam {
    fn from(value: &String) -> Self {
        KeyParam::Str(value.clone())
    }
}

impl From<i32> for KeyParam {
    fn from(value: i32) -> Self {
        KeyParam::Int(value.into())
    }
}

impl From<i64> for KeyParam {
    fn from(value: i64) -> Self {
        KeyParam::Int(value)
    }
}

impl From<u32> for KeyParam {
    fn from(value: u32) -> Self {
        KeyParam::UInt(value.into())
    }
}

impl From<u64> for KeyParam {
    fn from(value: u64) -> Self {
        KeyParam::UInt(value)
    }
}

impl From<usize> for KeyParam {
    fn from(value: usize) -> Self {
        KeyParam::UInt(value as u64)
    }
}

impl From<bool> for KeyParam {
    fn from(value: bool) -> Self {
        KeyParam::Bool(value)
    }
}

impl<T: Into<KeyParam>> From<Option<T>> for KeyParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyParam::Absent)
    }
}

// == Key Builder ==
/// Fluent builder for cache keys.
///
/// ```
/// use courseware_cache::cache::KeyBuilder;
///
/// let key = KeyBuilder::new("admin:courses")
///     .param("page", 2u32)
///     .param("limit", 20u32)
///     .param("search", None::<String>)
///     .build();
/// assert_eq!(key, "admin:courses:limit:20:page:2");
/// ```
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
    params: BTreeMap<String, String>,
}

impl KeyBuilder {
    // == Constructor ==
    /// Starts a key in the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            params: BTreeMap::new(),
        }
    }

    // == Param ==
    /// Adds a parameter. Absent values are dropped; a repeated name keeps the last value.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<KeyParam>) -> Self {
        let name = name.into();
        match value.into() {
            KeyParam::Absent => {
                self.params.remove(&encode_component(&name));
            }
            present => {
                self.params
                    .insert(encode_component(&name), encode_component(&present.to_string()));
            }
        }
        self
    }

    // == Build ==
    /// Renders `{namespace}:{name}:{value}:...` with names in lexicographic order.
    pub fn build(&self) -> String {
        let mut key = self.namespace.clone();
        for (name, value) in &self.params {
            key.push(KEY_DELIMITER);
            key.push_str(name);
            key.push(KEY_DELIMITER);
            key.push_str(value);
        }
        key
    }
}

// == Build Key ==
/// Derives a cache key from a namespace and an unordered parameter set.
///
/// Pure function: set-equal parameter collections always yield the same key.
pub fn build_key<I, K, V>(namespace: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<KeyParam>,
{
    params
        .into_iter()
        .fold(KeyBuilder::new(namespace), |builder, (name, value)| {
            builder.param(name, value)
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_namespace_only() {
        let params: Vec<(&str, KeyParam)> = Vec::new();
        assert_eq!(build_key("admin:courses", params), "admin:courses");
    }

    #[test]
    fn test_params_sorted_by_name() {
        let key = build_key(
            "user:courses",
            vec![("page", KeyParam::from(1u32)), ("limit", KeyParam::from(10u32))],
        );
        assert_eq!(key, "user:courses:limit:10:page:1");
    }

    #[test]
    fn test_order_independence() {
        let a = build_key(
            "admin:courses",
            vec![
                ("search", KeyParam::from("rust")),
                ("page", KeyParam::from(3u32)),
                ("ownerId", KeyParam::from("u-7")),
            ],
        );
        let b = build_key(
            "admin:courses",
            vec![
                ("ownerId", KeyParam::from("u-7")),
                ("search", KeyParam::from("rust")),
                ("page", KeyParam::from(3u32)),
            ],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_hashmap_input() {
        let mut params = HashMap::new();
        params.insert("courseId", KeyParam::from("c-1"));
        assert_eq!(
            build_key("admin:course:details", params),
            "admin:course:details:courseId:c-1"
        );
    }

    #[test]
    fn test_absent_params_omitted() {
        let key = KeyBuilder::new("admin:courses")
            .param("page", 1u32)
            .param("search", None::<&str>)
            .build();
        assert_eq!(key, "admin:courses:page:1");
        assert!(!key.contains("undefined"));
        assert!(!key.contains("search"));
    }

    #[test]
    fn test_absent_overrides_earlier_value() {
        let key = KeyBuilder::new("ns")
            .param("search", "x")
            .param("search", None::<String>)
            .build();
        assert_eq!(key, "ns");
    }

    #[test]
    fn test_scalar_rendering() {
        let key = KeyBuilder::new("ns")
            .param("flag", true)
            .param("offset", -5i64)
            .param("count", 42usize)
            .build();
        assert_eq!(key, "ns:count:42:flag:true:offset:-5");
    }

    #[test]
    fn test_delimiter_in_values_cannot_collide() {
        let a = KeyBuilder::new("ai:ai-chat")
            .param("lessonId", "a:prompt:b")
            .param("prompt", "c")
            .build();
        let b = KeyBuilder::new("ai:ai-chat")
            .param("lessonId", "a")
            .param("prompt", "b:prompt:c")
            .build();
        assert_ne!(a, b);
        assert_eq!(a, "ai:ai-chat:lessonId:a%3Aprompt%3Ab:prompt:c");
    }

    #[test]
    fn test_escape_character_is_encoded() {
        assert_eq!(encode_component("50%:off"), "50%25%3Aoff");
        // A literal "%3A" must not read back as an encoded delimiter
        let literal = KeyBuilder::new("ns").param("q", "%3A").build();
        let delimiter = KeyBuilder::new("ns").param("q", ":").build();
        assert_ne!(literal, delimiter);
    }
}
