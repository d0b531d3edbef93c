//! Grid-aware views over sample tables.
//!
//! A [`DimensionDomain`] describes the regular grid hidden in a table's
//! coordinate columns; a [`Hypertable`] binds one to a table and produces dense
//! arrays on demand.

pub mod domain;
pub mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use domain::DimensionDomain;
pub use table::Hypertable;

/// Name of a table column used as a coordinate or data axis.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisKey(String);

impl AxisKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AxisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AxisKey {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for AxisKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for AxisKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Converts a list of names into axis keys.
pub fn axis_keys<S: AsRef<str>>(names: &[S]) -> Vec<AxisKey> {
    names.iter().map(|n| AxisKey::from(n.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_key_equality_and_display() {
        let a = AxisKey::from("map_x");
        let b = AxisKey::new(String::from("map_x"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "map_x");
        assert_eq!(axis_keys(&["x", "y"]), vec![AxisKey::from("x"), AxisKey::from("y")]);
    }

    #[test]
    fn test_axis_key_serializes_as_plain_string() {
        let yaml = serde_yaml::to_string(&AxisKey::from("energy")).unwrap();
        assert_eq!(yaml.trim(), "energy");
    }
}
