//! Values held by variable nodes.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A scalar value.
///
/// Serialized adjacently tagged, e.g. `{ type = "Double", value = 21.5 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    Empty,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    DateTime(SystemTime),
}

impl Variant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Empty => "Empty",
            Variant::Boolean(_) => "Boolean",
            Variant::Int32(_) => "Int32",
            Variant::Int64(_) => "Int64",
            Variant::Double(_) => "Double",
            Variant::String(_) => "String",
            Variant::DateTime(_) => "DateTime",
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Empty
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<SystemTime> for Variant {
    fn from(v: SystemTime) -> Self {
        Variant::DateTime(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let v: Variant = serde_json::from_str(r#"{"type": "Double", "value": 25.0}"#).unwrap();
        assert_eq!(v, Variant::Double(25.0));

        let empty: Variant = serde_json::from_str(r#"{"type": "Empty"}"#).unwrap();
        assert_eq!(empty, Variant::Empty);
    }
}
