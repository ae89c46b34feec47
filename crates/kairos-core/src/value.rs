//! Dynamic serialized values
//!
//! Activity arguments, activity outputs, resource dynamics and serialized
//! events all cross the engine boundary as [`Value`]s. Mission models build
//! them through the `From` conversions and read them back with the few typed
//! accessors below.

use crate::time::Duration;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically typed value produced or consumed by a mission model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// Absent argument or an activity that returns nothing
    #[default]
    Null,
    /// Flags and mode switches
    Bool(bool),
    /// Counts and discrete resource levels
    Int(i64),
    /// Physical quantities and rates
    Float(f64),
    /// Names, modes and labels
    String(String),
    /// A span of simulation time, kept distinct from plain integers so
    /// exported results stay self-describing
    Duration(Duration),
    List(Vec<Value>),
    /// Structured arguments and dynamics; keys keep the order they were
    /// written in
    Map(ValueMap),
}

/// Insertion-ordered fields of a [`Value::Map`]
pub type ValueMap = IndexMap<String, Value>;

impl Value {
    /// Build a map value from key/value pairs
    ///
    /// # Example
    ///
    /// ```
    /// use kairos_core::Value;
    ///
    /// let v = Value::map([("rate", Value::Float(0.5)), ("initial", Value::Float(2.0))]);
    /// assert_eq!(v.get("rate").and_then(Value::as_float), Some(0.5));
    /// ```
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Integers widen, so an argument written as `3` reads as `3.0`
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        if let Value::Map(map) = self {
            Some(map)
        } else {
            None
        }
    }

    /// Look up a field of a map value; `None` for missing keys and non-maps
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }
}

/// Write `items` separated by `", "`
fn write_joined<T>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = T>,
    mut write: impl FnMut(&mut fmt::Formatter<'_>, T) -> fmt::Result,
) -> fmt::Result {
    let mut separator = "";
    for item in items {
        f.write_str(separator)?;
        write(f, item)?;
        separator = ", ";
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Duration(d) => write!(f, "{d}"),
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items, |f, item| write!(f, "{item}"))?;
                f.write_str("]")
            }
            Value::Map(fields) => {
                f.write_str("{")?;
                write_joined(f, fields, |f, (key, value)| write!(f, "{key}: {value}"))?;
                f.write_str("}")
            }
        }
    }
}

macro_rules! value_from {
    ($($source:ty => |$v:ident| $build:expr),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from($v: $source) -> Self {
                    $build
                }
            }
        )*
    };
}

value_from! {
    () => |_unit| Value::Null,
    bool => |b| Value::Bool(b),
    i32 => |i| Value::Int(i64::from(i)),
    i64 => |i| Value::Int(i),
    u64 => |i| Value::Int(i64::try_from(i).unwrap_or(i64::MAX)),
    f64 => |x| Value::Float(x),
    String => |s| Value::String(s),
    &str => |s| Value::String(s.to_owned()),
    Duration => |d| Value::Duration(d),
    ValueMap => |fields| Value::Map(fields),
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_arguments() {
        let arguments = Value::map([("count", Value::from(3)), ("gain", Value::from(0.25))]);
        assert_eq!(arguments.get("count").and_then(Value::as_int), Some(3));
        assert_eq!(arguments.get("count").and_then(Value::as_float), Some(3.0));
        assert_eq!(arguments.get("gain").and_then(Value::as_int), None);
        assert_eq!(arguments.get("missing"), None);
        assert_eq!(Value::Int(3).get("count"), None);
    }

    #[test]
    fn test_unit_and_missing_values_are_null() {
        assert_eq!(Value::from(()), Value::Null);
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(u64::MAX), Value::Int(i64::MAX));
    }

    #[test]
    fn test_display() {
        let v = Value::map([
            ("xs", Value::from(vec![1i64, 2])),
            ("mode", Value::from("idle")),
            ("after", Value::from(Duration::SECOND)),
        ]);
        assert_eq!(
            v.to_string(),
            "{xs: [1, 2], mode: \"idle\", after: 00:00:01.000000}"
        );
    }
}
