//! Styling-mark attribute maps and their merge rules.
//!
//! An attribute map is a plain data map from mark name to mark value.
//! On a retain, a `null` value means "remove this mark"; document
//! content (inserts) never carries nulls.

use serde_json::Value;
use std::collections::BTreeMap;

/// A map of styling marks. `BTreeMap` keeps iteration (and therefore
/// serialization and equality) order deterministic.
pub type AttrMap = BTreeMap<String, Value>;

/// `None` when the map is empty, so that "no attributes" has exactly
/// one representation.
pub fn normalize(attrs: Option<AttrMap>) -> Option<AttrMap> {
    attrs.filter(|map| !map.is_empty())
}

/// Drop `null` mark values. Inserts store their effective marks only.
pub fn strip_nulls(attrs: Option<AttrMap>) -> Option<AttrMap> {
    normalize(attrs.map(|map| {
        map.into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect()
    }))
}

/// Merge `overlay` onto `base`. Overlay values win per key; a `null`
/// overlay value removes the key when `keep_nulls` is false (content
/// position) or survives as an explicit removal when `keep_nulls` is
/// true (retain position).
pub fn compose(base: Option<&AttrMap>, overlay: Option<&AttrMap>, keep_nulls: bool) -> Option<AttrMap> {
    let mut merged = base.cloned().unwrap_or_default();
    if let Some(overlay) = overlay {
        for (name, value) in overlay {
            merged.insert(name.clone(), value.clone());
        }
    }
    if !keep_nulls {
        merged.retain(|_, value| !value.is_null());
    }
    normalize(Some(merged))
}

/// Rebase our retain marks over theirs. When we have tie priority our
/// marks stand; otherwise any key they also set wins and ours is
/// dropped.
pub fn transform(ours: Option<&AttrMap>, theirs: Option<&AttrMap>, we_win: bool) -> Option<AttrMap> {
    let ours = ours?;
    let Some(theirs) = theirs.filter(|_| !we_win) else {
        return normalize(Some(ours.clone()));
    };
    normalize(Some(
        ours.iter()
            .filter(|(name, _)| !theirs.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    ))
}
