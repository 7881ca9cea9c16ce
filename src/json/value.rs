//! The JSON DOM: a tagged union over null/boolean/integer/double/string/array/object.
//!
//! Object members preserve insertion order (a `Vec` of key-value pairs rather
//! than a `HashMap`), matching the C implementation's `key_value_t` list and
//! the round-trip invariant in the spec (I2).

use std::fmt;

/// A parsed or constructed JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Json {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    /// UTF-8 bytes and an explicit length; embedded NUL bytes are legal.
    String(Vec<u8>),
    Array(Vec<Json>),
    Object(Vec<(String, Json)>),
}

impl Json {
    pub fn string<S: Into<String>>(s: S) -> Json {
        Json::String(s.into().into_bytes())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Json::Null => "null",
            Json::Boolean(_) => "boolean",
            Json::Integer(_) => "integer",
            Json::Double(_) => "double",
            Json::String(_) => "string",
            Json::Array(_) => "array",
            Json::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Json::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Json::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Json::Integer(i) => Some(*i as f64),
            Json::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the string's raw bytes and length, matching `string_value(&len)`.
    pub fn as_string_bytes(&self) -> Option<(&[u8], usize)> {
        match self {
            Json::String(bytes) => Some((bytes, bytes.len())),
            _ => None,
        }
    }

    /// Returns the string as `&str`, lossily if it contains non-UTF-8 (which
    /// should not happen for values produced by this module's own parser,
    /// but callers constructing `Json::String` directly are not prevented
    /// from doing so).
    pub fn as_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Json::String(bytes) => Some(String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Json]> {
        match self {
            Json::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Json>> {
        match self {
            Json::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn array_length(&self) -> usize {
        self.as_array().map_or(0, |a| a.len())
    }

    pub fn array_element(&self, index: usize) -> Option<&Json> {
        self.as_array().and_then(|a| a.get(index))
    }

    /// Extends the array with `Json::Null` if necessary, matching `array_set`.
    pub fn array_set(&mut self, index: usize, value: Json) {
        if let Json::Array(items) = self {
            if index >= items.len() {
                items.resize(index + 1, Json::Null);
            }
            items[index] = value;
        }
    }

    pub fn array_append(&mut self, value: Json) {
        if let Json::Array(items) = self {
            items.push(value);
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Json)]> {
        match self {
            Json::Object(members) => Some(members),
            _ => None,
        }
    }

    pub fn object_length(&self) -> usize {
        self.as_object().map_or(0, |o| o.len())
    }

    /// Looks up a member by key in insertion order, first match wins.
    pub fn object_member(&self, key: &str) -> Option<&Json> {
        self.as_object()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replaces an existing key's value in place, or appends a new member
    /// at the end, preserving insertion order for all other keys.
    pub fn object_set<K: Into<String>>(&mut self, key: K, value: Json) {
        let key = key.into();
        if let Json::Object(members) = self {
            if let Some(existing) = members.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                members.push((key, value));
            }
        }
    }

    /// An iterator over `(key, value)` pairs in insertion order.
    pub fn object_iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.as_object()
            .into_iter()
            .flat_map(|members| members.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn new_object() -> Json {
        Json::Object(Vec::new())
    }

    pub fn new_array() -> Json {
        Json::Array(Vec::new())
    }
}

impl fmt::Display for Json {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::json::writer::write_oneline(self))
    }
}

impl From<&str> for Json {
    fn from(s: &str) -> Self {
        Json::string(s)
    }
}

impl From<String> for Json {
    fn from(s: String) -> Self {
        Json::String(s.into_bytes())
    }
}

impl From<bool> for Json {
    fn from(b: bool) -> Self {
        Json::Boolean(b)
    }
}

impl From<i64> for Json {
    fn from(i: i64) -> Self {
        Json::Integer(i)
    }
}

impl From<f64> for Json {
    fn from(d: f64) -> Self {
        Json::Double(d)
    }
}
