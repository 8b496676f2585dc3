//! The Property flavor: named document metadata with last-writer-wins
//! composition.

use crate::error::OtError;
use crate::flavor::Flavor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One property op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PropertyOp {
    /// Set a property to a plain data value.
    SetProperty {
        /// The property name, an identifier.
        name: String,
        /// The value.
        value: Value,
    },
    /// Remove a property.
    DeleteProperty {
        /// The property name, an identifier.
        name: String,
    },
}

impl PropertyOp {
    /// A `set_property` op.
    pub fn set(name: impl Into<String>, value: Value) -> Result<Self, OtError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self::SetProperty { name, value })
    }

    /// A `delete_property` op.
    pub fn delete(name: impl Into<String>) -> Result<Self, OtError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self::DeleteProperty { name })
    }

    /// The property name this op addresses.
    pub fn name(&self) -> &str {
        match self {
            Self::SetProperty { name, .. } | Self::DeleteProperty { name } => name,
        }
    }
}

/// Marker for the Property flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Properties;

impl Properties {
    fn fold(mut map: BTreeMap<String, Value>, ops: &[PropertyOp]) -> BTreeMap<String, Value> {
        for op in ops {
            match op {
                PropertyOp::SetProperty { name, value } => {
                    map.insert(name.clone(), value.clone());
                }
                PropertyOp::DeleteProperty { name } => {
                    map.remove(name);
                }
            }
        }
        map
    }

    fn emit(map: BTreeMap<String, Value>) -> Vec<PropertyOp> {
        map.into_iter()
            .map(|(name, value)| PropertyOp::SetProperty { name, value })
            .collect()
    }
}

impl Flavor for Properties {
    type Op = PropertyOp;

    const NAME: &'static str = "property";

    fn validate_op(op: &PropertyOp) -> Result<(), OtError> {
        validate_name(op.name())
    }

    fn is_document(ops: &[PropertyOp]) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        ops.iter().all(|op| match op {
            PropertyOp::SetProperty { name, .. } => seen.insert(name.clone()),
            PropertyOp::DeleteProperty { .. } => false,
        })
    }

    fn compose(
        a: &[PropertyOp],
        b: &[PropertyOp],
        want_document: bool,
    ) -> Result<Vec<PropertyOp>, OtError> {
        if !want_document {
            let mut ops = a.to_vec();
            ops.extend_from_slice(b);
            return Ok(ops);
        }
        Ok(Self::emit(Self::fold(Self::fold(BTreeMap::new(), a), b)))
    }

    fn diff(old: &[PropertyOp], new: &[PropertyOp]) -> Result<Vec<PropertyOp>, OtError> {
        let old = Self::fold(BTreeMap::new(), old);
        let new = Self::fold(BTreeMap::new(), new);
        let mut ops = Vec::new();
        for name in old.keys() {
            if !new.contains_key(name) {
                ops.push(PropertyOp::DeleteProperty { name: name.clone() });
            }
        }
        for (name, value) in &new {
            if old.get(name) != Some(value) {
                ops.push(PropertyOp::SetProperty {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(ops)
    }
}

/// Property names are identifiers: a letter or underscore followed by
/// letters, digits, or underscores.
fn validate_name(name: &str) -> Result<(), OtError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    if head_ok && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        Ok(())
    } else {
        Err(OtError::BadValue(format!("bad property name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_must_be_identifiers() {
        assert!(PropertyOp::set("title", json!("x")).is_ok());
        assert!(PropertyOp::set("_x9", json!(1)).is_ok());
        for bad in ["", "9lead", "has space", "dot.ted"] {
            assert!(PropertyOp::set(bad, json!(1)).is_err(), "{bad}");
            assert!(PropertyOp::delete(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn last_writer_wins() {
        let a = vec![PropertyOp::set("title", json!("one")).unwrap()];
        let b = vec![PropertyOp::set("title", json!("two")).unwrap()];
        let doc = Properties::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![PropertyOp::set("title", json!("two")).unwrap()]);
    }

    #[test]
    fn delete_removes() {
        let a = vec![
            PropertyOp::set("title", json!("x")).unwrap(),
            PropertyOp::set("stars", json!(5)).unwrap(),
        ];
        let b = vec![PropertyOp::delete("title").unwrap()];
        let doc = Properties::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![PropertyOp::set("stars", json!(5)).unwrap()]);
    }

    #[test]
    fn document_requires_distinct_sets() {
        assert!(Properties::is_document(&[
            PropertyOp::set("a", json!(1)).unwrap(),
            PropertyOp::set("b", json!(2)).unwrap(),
        ]));
        assert!(!Properties::is_document(&[
            PropertyOp::set("a", json!(1)).unwrap(),
            PropertyOp::set("a", json!(2)).unwrap(),
        ]));
        assert!(!Properties::is_document(&[PropertyOp::delete("a").unwrap()]));
    }

    #[test]
    fn diff_is_minimal() {
        let old = vec![
            PropertyOp::set("keep", json!(true)).unwrap(),
            PropertyOp::set("gone", json!(1)).unwrap(),
            PropertyOp::set("changed", json!("a")).unwrap(),
        ];
        let new = vec![
            PropertyOp::set("keep", json!(true)).unwrap(),
            PropertyOp::set("changed", json!("b")).unwrap(),
            PropertyOp::set("added", json!(2)).unwrap(),
        ];
        let ops = Properties::diff(&old, &new).unwrap();
        assert_eq!(
            ops,
            vec![
                PropertyOp::delete("gone").unwrap(),
                PropertyOp::set("added", json!(2)).unwrap(),
                PropertyOp::set("changed", json!("b")).unwrap(),
            ]
        );
    }

    #[test]
    fn serde_roundtrip() {
        let ops = vec![
            PropertyOp::set("title", json!({"rich": [1, 2]})).unwrap(),
            PropertyOp::delete("title").unwrap(),
        ];
        let encoded = serde_json::to_string(&ops).unwrap();
        let decoded: Vec<PropertyOp> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, ops);
    }
}
