//! The Caret flavor: per-session cursor/selection state.
//!
//! A caret document is a set of sessions, each with a full [`Caret`]
//! value. Updates ride the same delta machinery as the body: a caret
//! delta is a sequence of `begin_session` / `set_field` / `end_session`
//! ops, and a caret document delta is all `begin_session` with
//! pairwise-distinct session ids.

use crate::error::OtError;
use crate::flavor::Flavor;
use crate::id::SessionId;
use crate::rev::RevNum;
use crate::time::TimeMs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One session's cursor/selection state. All fields are mandatory
/// after construction; [`Caret::new`] fills in the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caret {
    /// The owning session.
    pub session_id: SessionId,
    /// Start of the selection, in content units.
    pub index: u64,
    /// Length of the selection; 0 for a bare caret.
    pub length: u64,
    /// Display color, lowercase `#rrggbb`.
    pub color: String,
    /// The document revision this caret was last adjusted against.
    pub rev_num: RevNum,
    /// When the owning session last showed signs of life.
    pub last_active: TimeMs,
}

/// Field defaults for a freshly begun session.
const DEFAULT_COLOR: &str = "#000000";

impl Caret {
    /// A caret with default fields: a collapsed selection at the
    /// document start, black, at revision 0, never active.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            index: 0,
            length: 0,
            color: DEFAULT_COLOR.to_string(),
            rev_num: RevNum::ZERO,
            last_active: TimeMs::EPOCH,
        }
    }

    /// Validate field contents (currently just the color syntax).
    pub fn validate(&self) -> Result<(), OtError> {
        if self.session_id.as_str().is_empty() {
            return Err(OtError::BadValue("empty session id".into()));
        }
        validate_color(&self.color)
    }

    /// Apply one field update in place.
    fn set_field(&mut self, field: &CaretField) {
        match field {
            CaretField::Index { value } => self.index = *value,
            CaretField::Length { value } => self.length = *value,
            CaretField::Color { value } => self.color = value.clone(),
            CaretField::RevNum { value } => self.rev_num = *value,
            CaretField::LastActive { value } => self.last_active = *value,
        }
    }

    /// The `set_field` ops that turn `self` into `newer`, in a fixed
    /// field order.
    fn field_diff(&self, newer: &Caret) -> Vec<CaretOp> {
        let mut ops = Vec::new();
        let id = &self.session_id;
        if self.index != newer.index {
            ops.push(CaretOp::set_index(id.clone(), newer.index));
        }
        if self.length != newer.length {
            ops.push(CaretOp::set_length(id.clone(), newer.length));
        }
        if self.color != newer.color {
            ops.push(CaretOp::SetField {
                session_id: id.clone(),
                field: CaretField::Color {
                    value: newer.color.clone(),
                },
            });
        }
        if self.rev_num != newer.rev_num {
            ops.push(CaretOp::SetField {
                session_id: id.clone(),
                field: CaretField::RevNum {
                    value: newer.rev_num,
                },
            });
        }
        if self.last_active != newer.last_active {
            ops.push(CaretOp::SetField {
                session_id: id.clone(),
                field: CaretField::LastActive {
                    value: newer.last_active,
                },
            });
        }
        ops
    }
}

/// One caret field update, tagged by field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum CaretField {
    /// Selection start.
    Index {
        /// The new value.
        value: u64,
    },
    /// Selection length.
    Length {
        /// The new value.
        value: u64,
    },
    /// Display color, lowercase `#rrggbb`.
    Color {
        /// The new value.
        value: String,
    },
    /// Revision the caret is positioned against.
    RevNum {
        /// The new value.
        value: RevNum,
    },
    /// Last activity time.
    LastActive {
        /// The new value.
        value: TimeMs,
    },
}

/// One caret op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CaretOp {
    /// Add (or wholly replace) a session's caret.
    BeginSession {
        /// The full caret value.
        caret: Caret,
    },
    /// Remove a session's caret.
    EndSession {
        /// The session to remove.
        session_id: SessionId,
    },
    /// Update one field of an existing session's caret.
    SetField {
        /// The session to update.
        session_id: SessionId,
        /// The field update.
        #[serde(flatten)]
        field: CaretField,
    },
}

impl CaretOp {
    /// A `begin_session` op.
    pub fn begin_session(caret: Caret) -> Result<Self, OtError> {
        caret.validate()?;
        Ok(Self::BeginSession { caret })
    }

    /// An `end_session` op.
    pub fn end_session(session_id: SessionId) -> Self {
        Self::EndSession { session_id }
    }

    /// A `set_field` op for the selection start.
    pub fn set_index(session_id: SessionId, value: u64) -> Self {
        Self::SetField {
            session_id,
            field: CaretField::Index { value },
        }
    }

    /// A `set_field` op for the selection length.
    pub fn set_length(session_id: SessionId, value: u64) -> Self {
        Self::SetField {
            session_id,
            field: CaretField::Length { value },
        }
    }

    /// A `set_field` op for the color. Validates the color syntax.
    pub fn set_color(session_id: SessionId, value: impl Into<String>) -> Result<Self, OtError> {
        let value = value.into();
        validate_color(&value)?;
        Ok(Self::SetField {
            session_id,
            field: CaretField::Color { value },
        })
    }

    /// A `set_field` op for the tracked revision.
    pub fn set_rev_num(session_id: SessionId, value: RevNum) -> Self {
        Self::SetField {
            session_id,
            field: CaretField::RevNum { value },
        }
    }

    /// A `set_field` op for the activity time.
    pub fn set_last_active(session_id: SessionId, value: TimeMs) -> Self {
        Self::SetField {
            session_id,
            field: CaretField::LastActive { value },
        }
    }
}

/// Marker for the Caret flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carets;

impl Carets {
    /// Fold ops into a session map. `begin_session` adds or replaces;
    /// `set_field` requires the session to exist; `end_session`
    /// removes (tolerating absence).
    fn fold(
        mut map: BTreeMap<SessionId, Caret>,
        ops: &[CaretOp],
    ) -> Result<BTreeMap<SessionId, Caret>, OtError> {
        for op in ops {
            match op {
                CaretOp::BeginSession { caret } => {
                    map.insert(caret.session_id.clone(), caret.clone());
                }
                CaretOp::EndSession { session_id } => {
                    map.remove(session_id);
                }
                CaretOp::SetField { session_id, field } => {
                    let caret = map.get_mut(session_id).ok_or_else(|| {
                        OtError::BadUse(format!("set_field on unknown session: {session_id}"))
                    })?;
                    caret.set_field(field);
                }
            }
        }
        Ok(map)
    }

    fn emit(map: BTreeMap<SessionId, Caret>) -> Vec<CaretOp> {
        map.into_values()
            .map(|caret| CaretOp::BeginSession { caret })
            .collect()
    }
}

impl Flavor for Carets {
    type Op = CaretOp;

    const NAME: &'static str = "caret";

    fn validate_op(op: &CaretOp) -> Result<(), OtError> {
        match op {
            CaretOp::BeginSession { caret } => caret.validate(),
            CaretOp::EndSession { session_id } => {
                if session_id.as_str().is_empty() {
                    return Err(OtError::BadValue("empty session id".into()));
                }
                Ok(())
            }
            CaretOp::SetField { session_id, field } => {
                if session_id.as_str().is_empty() {
                    return Err(OtError::BadValue("empty session id".into()));
                }
                if let CaretField::Color { value } = field {
                    validate_color(value)?;
                }
                Ok(())
            }
        }
    }

    fn is_document(ops: &[CaretOp]) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        ops.iter().all(|op| match op {
            CaretOp::BeginSession { caret } => seen.insert(caret.session_id.clone()),
            _ => false,
        })
    }

    fn compose(a: &[CaretOp], b: &[CaretOp], want_document: bool) -> Result<Vec<CaretOp>, OtError> {
        if !want_document {
            // Sequential application needs no resolution yet.
            let mut ops = a.to_vec();
            ops.extend_from_slice(b);
            return Ok(ops);
        }
        let map = Self::fold(Self::fold(BTreeMap::new(), a)?, b)?;
        Ok(Self::emit(map))
    }

    fn diff(old: &[CaretOp], new: &[CaretOp]) -> Result<Vec<CaretOp>, OtError> {
        let old = Self::fold(BTreeMap::new(), old)?;
        let new = Self::fold(BTreeMap::new(), new)?;
        let mut ops = Vec::new();
        for (session_id, before) in &old {
            match new.get(session_id) {
                None => ops.push(CaretOp::end_session(session_id.clone())),
                Some(after) => ops.extend(before.field_diff(after)),
            }
        }
        for (session_id, caret) in &new {
            if !old.contains_key(session_id) {
                ops.push(CaretOp::BeginSession {
                    caret: caret.clone(),
                });
            }
        }
        Ok(ops)
    }
}

fn validate_color(color: &str) -> Result<(), OtError> {
    let ok = color.len() == 7
        && color.starts_with('#')
        && color[1..]
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch));
    if ok {
        Ok(())
    } else {
        Err(OtError::BadValue(format!("bad caret color: {color:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caret(id: &str) -> Caret {
        Caret::new(SessionId::new(id))
    }

    #[test]
    fn new_carets_get_defaults() {
        let c = caret("s1");
        assert_eq!(c.index, 0);
        assert_eq!(c.length, 0);
        assert_eq!(c.color, "#000000");
        assert_eq!(c.rev_num, RevNum::ZERO);
        assert_eq!(c.last_active, TimeMs::EPOCH);
    }

    #[test]
    fn color_syntax_is_enforced() {
        assert!(CaretOp::set_color(SessionId::new("s"), "#00ff88").is_ok());
        for bad in ["", "#fff", "#00FF88", "00ff88x", "#00ff8g"] {
            assert!(CaretOp::set_color(SessionId::new("s"), bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn document_requires_distinct_begin_sessions() {
        let doc = vec![
            CaretOp::begin_session(caret("a")).unwrap(),
            CaretOp::begin_session(caret("b")).unwrap(),
        ];
        assert!(Carets::is_document(&doc));
        let dup = vec![
            CaretOp::begin_session(caret("a")).unwrap(),
            CaretOp::begin_session(caret("a")).unwrap(),
        ];
        assert!(!Carets::is_document(&dup));
        assert!(!Carets::is_document(&[CaretOp::end_session(SessionId::new("a"))]));
    }

    #[test]
    fn document_compose_applies_field_updates() {
        let doc = vec![CaretOp::begin_session(caret("a")).unwrap()];
        let update = vec![CaretOp::set_index(SessionId::new("a"), 5)];
        let next = Carets::compose(&doc, &update, true).unwrap();
        match &next[0] {
            CaretOp::BeginSession { caret } => assert_eq!(caret.index, 5),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn document_compose_rejects_unknown_session() {
        let update = vec![CaretOp::set_index(SessionId::new("ghost"), 5)];
        let err = Carets::compose(&[], &update, true).unwrap_err();
        assert!(matches!(err, OtError::BadUse(_)));
    }

    #[test]
    fn end_session_removes() {
        let doc = vec![
            CaretOp::begin_session(caret("a")).unwrap(),
            CaretOp::begin_session(caret("b")).unwrap(),
        ];
        let next =
            Carets::compose(&doc, &[CaretOp::end_session(SessionId::new("a"))], true).unwrap();
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn non_document_compose_concatenates() {
        let a = vec![CaretOp::set_index(SessionId::new("s"), 1)];
        let b = vec![CaretOp::set_length(SessionId::new("s"), 2)];
        let ops = Carets::compose(&a, &b, false).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn diff_emits_one_op_per_changed_field() {
        let before = vec![CaretOp::begin_session(caret("a")).unwrap()];
        let mut moved = caret("a");
        moved.index = 9;
        let after = vec![CaretOp::BeginSession { caret: moved }];
        let ops = Carets::diff(&before, &after).unwrap();
        assert_eq!(ops, vec![CaretOp::set_index(SessionId::new("a"), 9)]);
    }

    #[test]
    fn diff_emits_begin_and_end_for_membership_changes() {
        let before = vec![CaretOp::begin_session(caret("old")).unwrap()];
        let after = vec![CaretOp::begin_session(caret("new")).unwrap()];
        let ops = Carets::diff(&before, &after).unwrap();
        assert_eq!(
            ops,
            vec![
                CaretOp::end_session(SessionId::new("old")),
                CaretOp::begin_session(caret("new")).unwrap(),
            ]
        );
    }

    #[test]
    fn serde_roundtrip() {
        let ops = vec![
            CaretOp::begin_session(caret("a")).unwrap(),
            CaretOp::set_color(SessionId::new("a"), "#12ab34").unwrap(),
            CaretOp::set_last_active(SessionId::new("a"), TimeMs::from_millis(99)),
            CaretOp::end_session(SessionId::new("a")),
        ];
        let encoded = serde_json::to_string(&ops).unwrap();
        let decoded: Vec<CaretOp> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, ops);
    }
}
