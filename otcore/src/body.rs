//! The Body flavor: rich-text ops with retain/insert/delete semantics
//! and styling-mark attributes.
//!
//! Positions and lengths are in content units: one unit per text
//! character, one per embed.

use crate::attr::{self, AttrMap};
use crate::error::OtError;
use crate::flavor::{Flavor, TransformFlavor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One rich-text op.
///
/// `Text` and `Embed` are collectively the "insert" ops; a document
/// delta consists of inserts only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BodyOp {
    /// Insert a run of text, optionally styled.
    Text {
        /// The text. Never empty.
        text: String,
        /// Styling marks. Never contains nulls on content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<AttrMap>,
    },
    /// Insert one embedded object (image, horizontal rule, mention…).
    Embed {
        /// The embed type tag, interpreted by the client library.
        embed: String,
        /// The embed payload, a plain data value.
        value: Value,
        /// Styling marks. Never contains nulls on content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<AttrMap>,
    },
    /// Keep `count` units, optionally restyling them. A `null` mark
    /// value removes that mark from the retained content.
    Retain {
        /// How many units to keep. At least 1.
        count: u64,
        /// Mark changes to apply to the retained content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<AttrMap>,
    },
    /// Remove `count` units.
    Delete {
        /// How many units to remove. At least 1.
        count: u64,
    },
}

impl BodyOp {
    /// A plain text insert. The text must be non-empty.
    pub fn text(text: impl Into<String>) -> Result<Self, OtError> {
        Self::text_with(text, None)
    }

    /// A styled text insert. Null mark values are dropped.
    pub fn text_with(text: impl Into<String>, attributes: Option<AttrMap>) -> Result<Self, OtError> {
        let text = text.into();
        if text.is_empty() {
            return Err(OtError::BadValue("empty text insert".into()));
        }
        Ok(Self::Text {
            text,
            attributes: attr::strip_nulls(attributes),
        })
    }

    /// An embed insert.
    pub fn embed(
        kind: impl Into<String>,
        value: Value,
        attributes: Option<AttrMap>,
    ) -> Result<Self, OtError> {
        let embed = kind.into();
        if embed.is_empty() {
            return Err(OtError::BadValue("empty embed type".into()));
        }
        Ok(Self::Embed {
            embed,
            value,
            attributes: attr::strip_nulls(attributes),
        })
    }

    /// A plain retain.
    pub fn retain(count: u64) -> Result<Self, OtError> {
        Self::retain_with(count, None)
    }

    /// A restyling retain. Null mark values mean "remove this mark".
    pub fn retain_with(count: u64, attributes: Option<AttrMap>) -> Result<Self, OtError> {
        if count == 0 {
            return Err(OtError::BadValue("retain count 0".into()));
        }
        Ok(Self::Retain {
            count,
            attributes: attr::normalize(attributes),
        })
    }

    /// A delete.
    pub fn delete(count: u64) -> Result<Self, OtError> {
        if count == 0 {
            return Err(OtError::BadValue("delete count 0".into()));
        }
        Ok(Self::Delete { count })
    }

    /// Whether this op inserts content.
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::Embed { .. })
    }

    /// Length in content units: characters for text, 1 for an embed,
    /// the count for retain/delete.
    pub fn len(&self) -> u64 {
        match self {
            Self::Text { text, .. } => text.chars().count() as u64,
            Self::Embed { .. } => 1,
            Self::Retain { count, .. } | Self::Delete { count } => *count,
        }
    }
}

/// Marker for the Body flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Body;

impl Flavor for Body {
    type Op = BodyOp;

    const NAME: &'static str = "body";

    fn validate_op(op: &BodyOp) -> Result<(), OtError> {
        match op {
            BodyOp::Text { text, attributes } => {
                if text.is_empty() {
                    return Err(OtError::BadValue("empty text insert".into()));
                }
                validate_content_attrs(attributes)
            }
            BodyOp::Embed { embed, attributes, .. } => {
                if embed.is_empty() {
                    return Err(OtError::BadValue("empty embed type".into()));
                }
                validate_content_attrs(attributes)
            }
            BodyOp::Retain { count, attributes } => {
                if *count == 0 {
                    return Err(OtError::BadValue("retain count 0".into()));
                }
                if attributes.as_ref().is_some_and(|map| map.is_empty()) {
                    return Err(OtError::BadValue("empty attribute map".into()));
                }
                Ok(())
            }
            BodyOp::Delete { count } => {
                if *count == 0 {
                    return Err(OtError::BadValue("delete count 0".into()));
                }
                Ok(())
            }
        }
    }

    fn is_document(ops: &[BodyOp]) -> bool {
        ops.iter().all(BodyOp::is_insert)
    }

    fn compose(a: &[BodyOp], b: &[BodyOp], want_document: bool) -> Result<Vec<BodyOp>, OtError> {
        let mut x = Cursor::new(a);
        let mut y = Cursor::new(b);
        let mut out = Builder::new();
        loop {
            if matches!(y.peek(), Some(op) if op.is_insert()) {
                out.push(y.take_rest());
                continue;
            }
            if matches!(x.peek(), Some(BodyOp::Delete { .. })) {
                out.push(x.take_rest());
                continue;
            }
            match (x.peek(), y.peek()) {
                (None, None) => break,
                (Some(_), None) => out.push(x.take_rest()),
                (None, Some(_)) => out.push(y.take_rest()),
                (Some(_), Some(yo)) => {
                    let n = x.remaining().min(y.remaining());
                    match yo.clone() {
                        BodyOp::Retain { attributes, .. } => {
                            let piece = x.take(n);
                            y.take(n);
                            out.push(restyle(piece, attributes.as_ref()));
                        }
                        BodyOp::Delete { .. } => {
                            let piece = x.take(n);
                            y.take(n);
                            if matches!(piece, BodyOp::Retain { .. }) {
                                out.push(BodyOp::Delete { count: n });
                            }
                        }
                        _ => unreachable!("inserts handled above"),
                    }
                }
            }
        }
        let ops = out.finish();
        if want_document && !Self::is_document(&ops) {
            return Err(OtError::BadValue(
                "composition does not produce a document".into(),
            ));
        }
        Ok(ops)
    }

    fn rebase(delta: &[BodyOp], intervening: &[BodyOp]) -> Result<Vec<BodyOp>, OtError> {
        Self::transform(delta, intervening, false)
    }

    fn diff(old: &[BodyOp], new: &[BodyOp]) -> Result<Vec<BodyOp>, OtError> {
        let a = flatten(old)?;
        let b = flatten(new)?;
        let prefix = a
            .iter()
            .zip(b.iter())
            .take_while(|(left, right)| left == right)
            .count();
        let max_suffix = a.len().min(b.len()) - prefix;
        let suffix = a
            .iter()
            .rev()
            .zip(b.iter().rev())
            .take(max_suffix)
            .take_while(|(left, right)| left == right)
            .count();

        let mut out = Builder::new();
        if prefix > 0 {
            out.push(BodyOp::Retain {
                count: prefix as u64,
                attributes: None,
            });
        }
        for op in chunk(&b[prefix..b.len() - suffix]) {
            out.push(op);
        }
        let removed = a.len() - prefix - suffix;
        if removed > 0 {
            out.push(BodyOp::Delete {
                count: removed as u64,
            });
        }
        Ok(out.finish())
    }

    fn normalize(ops: &[BodyOp]) -> Vec<BodyOp> {
        let mut out = Builder::new();
        for op in ops {
            out.push(op.clone());
        }
        out.finish()
    }
}

impl TransformFlavor for Body {
    fn transform(
        this: &[BodyOp],
        other: &[BodyOp],
        this_is_first: bool,
    ) -> Result<Vec<BodyOp>, OtError> {
        let mut s = Cursor::new(this);
        let mut o = Cursor::new(other);
        let mut out = Builder::new();
        loop {
            let s_insert = matches!(s.peek(), Some(op) if op.is_insert());
            let o_insert = matches!(o.peek(), Some(op) if op.is_insert());
            if o_insert && (!s_insert || !this_is_first) {
                let skipped = o.take_rest();
                out.push(BodyOp::Retain {
                    count: skipped.len(),
                    attributes: None,
                });
                continue;
            }
            if s_insert {
                out.push(s.take_rest());
                continue;
            }
            match (s.peek(), o.peek()) {
                (None, _) => break,
                (Some(_), None) => out.push(s.take_rest()),
                (Some(_), Some(_)) => {
                    let n = s.remaining().min(o.remaining());
                    let ours = s.take(n);
                    let theirs = o.take(n);
                    match (ours, theirs) {
                        (
                            BodyOp::Retain { attributes: sa, .. },
                            BodyOp::Retain { attributes: oa, .. },
                        ) => out.push(BodyOp::Retain {
                            count: n,
                            attributes: attr::transform(sa.as_ref(), oa.as_ref(), this_is_first),
                        }),
                        // They deleted what we would retain or delete.
                        (BodyOp::Retain { .. }, BodyOp::Delete { .. }) => {}
                        (BodyOp::Delete { .. }, BodyOp::Delete { .. }) => {}
                        (BodyOp::Delete { .. }, BodyOp::Retain { .. }) => {
                            out.push(BodyOp::Delete { count: n })
                        }
                        _ => unreachable!("inserts handled above"),
                    }
                }
            }
        }
        Ok(out.finish())
    }
}

/// Apply a retain's mark changes to a piece of content or a retain.
fn restyle(piece: BodyOp, marks: Option<&AttrMap>) -> BodyOp {
    match piece {
        BodyOp::Text { text, attributes } => BodyOp::Text {
            text,
            attributes: attr::compose(attributes.as_ref(), marks, false),
        },
        BodyOp::Embed {
            embed,
            value,
            attributes,
        } => BodyOp::Embed {
            embed,
            value,
            attributes: attr::compose(attributes.as_ref(), marks, false),
        },
        BodyOp::Retain { count, attributes } => BodyOp::Retain {
            count,
            attributes: attr::compose(attributes.as_ref(), marks, true),
        },
        BodyOp::Delete { .. } => unreachable!("deletes are never restyled"),
    }
}

/// A unit of document content: one character or one embed.
#[derive(Debug, Clone, PartialEq)]
enum Unit {
    Char {
        ch: char,
        attrs: Option<AttrMap>,
    },
    Embed {
        embed: String,
        value: Value,
        attrs: Option<AttrMap>,
    },
}

/// Explode a document delta into units. Fails on non-insert ops.
fn flatten(ops: &[BodyOp]) -> Result<Vec<Unit>, OtError> {
    let mut units = Vec::new();
    for op in ops {
        match op {
            BodyOp::Text { text, attributes } => {
                units.extend(text.chars().map(|ch| Unit::Char {
                    ch,
                    attrs: attributes.clone(),
                }));
            }
            BodyOp::Embed {
                embed,
                value,
                attributes,
            } => units.push(Unit::Embed {
                embed: embed.clone(),
                value: value.clone(),
                attrs: attributes.clone(),
            }),
            _ => {
                return Err(OtError::BadUse(
                    "diff is defined only for document deltas".into(),
                ));
            }
        }
    }
    Ok(units)
}

/// Re-assemble units into insert ops, merging adjacent characters that
/// share attributes.
fn chunk(units: &[Unit]) -> Vec<BodyOp> {
    let mut ops: Vec<BodyOp> = Vec::new();
    for unit in units {
        match unit {
            Unit::Char { ch, attrs } => match ops.last_mut() {
                Some(BodyOp::Text { text, attributes }) if attributes == attrs => text.push(*ch),
                _ => ops.push(BodyOp::Text {
                    text: ch.to_string(),
                    attributes: attrs.clone(),
                }),
            },
            Unit::Embed { embed, value, attrs } => ops.push(BodyOp::Embed {
                embed: embed.clone(),
                value: value.clone(),
                attributes: attrs.clone(),
            }),
        }
    }
    ops
}

fn validate_content_attrs(attrs: &Option<AttrMap>) -> Result<(), OtError> {
    if let Some(map) = attrs {
        if map.is_empty() {
            return Err(OtError::BadValue("empty attribute map".into()));
        }
        if map.values().any(Value::is_null) {
            return Err(OtError::BadValue("null styling mark on insert".into()));
        }
    }
    Ok(())
}

/// Walks an op sequence in content units, splitting ops as needed.
struct Cursor<'a> {
    ops: &'a [BodyOp],
    idx: usize,
    offset: u64,
}

impl<'a> Cursor<'a> {
    fn new(ops: &'a [BodyOp]) -> Self {
        Self {
            ops,
            idx: 0,
            offset: 0,
        }
    }

    fn peek(&self) -> Option<&'a BodyOp> {
        self.ops.get(self.idx)
    }

    /// Units remaining in the current op.
    fn remaining(&self) -> u64 {
        self.peek().map(|op| op.len() - self.offset).unwrap_or(0)
    }

    /// Take `n` units (1 ≤ n ≤ remaining) from the current op.
    fn take(&mut self, n: u64) -> BodyOp {
        debug_assert!(n >= 1 && n <= self.remaining());
        let op = &self.ops[self.idx];
        let piece = match op {
            BodyOp::Text { text, attributes } => {
                let start = self.offset as usize;
                let taken: String = text.chars().skip(start).take(n as usize).collect();
                BodyOp::Text {
                    text: taken,
                    attributes: attributes.clone(),
                }
            }
            BodyOp::Embed { .. } => op.clone(),
            BodyOp::Retain { attributes, .. } => BodyOp::Retain {
                count: n,
                attributes: attributes.clone(),
            },
            BodyOp::Delete { .. } => BodyOp::Delete { count: n },
        };
        self.offset += n;
        if self.offset == op.len() {
            self.idx += 1;
            self.offset = 0;
        }
        piece
    }

    /// Take whatever remains of the current op.
    fn take_rest(&mut self) -> BodyOp {
        let n = self.remaining();
        self.take(n)
    }
}

/// Accumulates ops, merging contiguous compatible runs and chopping a
/// trailing mark-less retain.
struct Builder {
    ops: Vec<BodyOp>,
}

impl Builder {
    fn new() -> Self {
        Self { ops: Vec::new() }
    }

    fn push(&mut self, op: BodyOp) {
        if op.len() == 0 {
            return;
        }
        match (self.ops.last_mut(), &op) {
            (
                Some(BodyOp::Text { text, attributes }),
                BodyOp::Text {
                    text: more,
                    attributes: more_attrs,
                },
            ) if attributes == more_attrs => text.push_str(more),
            (
                Some(BodyOp::Retain { count, attributes }),
                BodyOp::Retain {
                    count: more,
                    attributes: more_attrs,
                },
            ) if attributes == more_attrs => *count += more,
            (Some(BodyOp::Delete { count }), BodyOp::Delete { count: more }) => *count += more,
            _ => self.ops.push(op),
        }
    }

    fn finish(mut self) -> Vec<BodyOp> {
        if matches!(
            self.ops.last(),
            Some(BodyOp::Retain {
                attributes: None,
                ..
            })
        ) {
            self.ops.pop();
        }
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> BodyOp {
        BodyOp::text(s).unwrap()
    }

    fn bold() -> AttrMap {
        [("bold".to_string(), json!(true))].into_iter().collect()
    }

    fn unbold() -> AttrMap {
        [("bold".to_string(), Value::Null)].into_iter().collect()
    }

    #[test]
    fn constructors_validate() {
        assert!(BodyOp::text("").is_err());
        assert!(BodyOp::retain(0).is_err());
        assert!(BodyOp::delete(0).is_err());
        assert!(BodyOp::embed("", json!({}), None).is_err());
    }

    #[test]
    fn insert_constructors_strip_null_marks() {
        let op = BodyOp::text_with("x", Some(unbold())).unwrap();
        assert_eq!(op, text("x"));
    }

    #[test]
    fn validate_rejects_null_marks_on_content() {
        let op = BodyOp::Text {
            text: "x".into(),
            attributes: Some(unbold()),
        };
        assert!(Body::validate_op(&op).is_err());
    }

    #[test]
    fn lengths_are_in_units() {
        assert_eq!(text("héllo").len(), 5);
        assert_eq!(
            BodyOp::embed("image", json!({"url": "x"}), None).unwrap().len(),
            1
        );
    }

    #[test]
    fn compose_hello_world() {
        let a = vec![text("Hello ")];
        let b = vec![BodyOp::retain(6).unwrap(), text("world")];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![text("Hello world")]);
    }

    #[test]
    fn compose_delete_in_middle() {
        let a = vec![text("abcdef")];
        let b = vec![BodyOp::retain(2).unwrap(), BodyOp::delete(2).unwrap()];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![text("abef")]);
    }

    #[test]
    fn compose_restyles_content() {
        let a = vec![text("abc")];
        let b = vec![BodyOp::retain_with(2, Some(bold())).unwrap()];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(
            doc,
            vec![
                BodyOp::text_with("ab", Some(bold())).unwrap(),
                text("c"),
            ]
        );
    }

    #[test]
    fn compose_null_mark_unstyles_content() {
        let a = vec![BodyOp::text_with("ab", Some(bold())).unwrap()];
        let b = vec![BodyOp::retain_with(2, Some(unbold())).unwrap()];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![text("ab")]);
    }

    #[test]
    fn compose_of_retains_keeps_null_marks() {
        let a = vec![BodyOp::retain_with(1, Some(bold())).unwrap()];
        let b = vec![BodyOp::retain_with(1, Some(unbold())).unwrap()];
        let ops = Body::compose(&a, &b, false).unwrap();
        assert_eq!(ops, vec![BodyOp::retain_with(1, Some(unbold())).unwrap()]);
    }

    #[test]
    fn compose_wants_document_rejects_leftover_retain() {
        let a = vec![text("ab")];
        let b = vec![BodyOp::retain(5).unwrap(), text("x")];
        assert!(Body::compose(&a, &b, true).is_err());
        assert!(Body::compose(&a, &b, false).is_ok());
    }

    #[test]
    fn compose_with_empty_is_identity() {
        let a = vec![text("ab"), BodyOp::embed("rule", json!(null), None).unwrap()];
        assert_eq!(Body::compose(&a, &[], false).unwrap(), a);
        assert_eq!(Body::compose(&[], &a, false).unwrap(), a);
    }

    #[test]
    fn transform_tie_break_orders_insertions() {
        let base_first = vec![text("A")];
        let base_second = vec![text("B")];
        // The second-priority side retains past the first's insertion.
        let rebased = Body::transform(&base_second, &base_first, false).unwrap();
        assert_eq!(rebased, vec![BodyOp::retain(1).unwrap(), text("B")]);
        // The first-priority side's ops stand as written.
        let rebased = Body::transform(&base_first, &base_second, true).unwrap();
        assert_eq!(rebased, vec![text("A")]);
    }

    #[test]
    fn transform_converges() {
        let a = vec![BodyOp::retain(2).unwrap(), text("X"), BodyOp::delete(1).unwrap()];
        let b = vec![BodyOp::delete(1).unwrap(), text("YY")];
        let base = vec![text("abcd")];
        let left = Body::compose(
            &Body::compose(&base, &a, true).unwrap(),
            &Body::transform(&b, &a, false).unwrap(),
            true,
        )
        .unwrap();
        let right = Body::compose(
            &Body::compose(&base, &b, true).unwrap(),
            &Body::transform(&a, &b, true).unwrap(),
            true,
        )
        .unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn transform_delete_vs_delete_is_noop() {
        let a = vec![BodyOp::delete(3).unwrap()];
        let b = vec![BodyOp::delete(3).unwrap()];
        assert_eq!(Body::transform(&a, &b, false).unwrap(), vec![]);
    }

    #[test]
    fn transform_retain_marks_vs_delete_resolves_to_delete() {
        let restyle = vec![BodyOp::retain_with(3, Some(bold())).unwrap()];
        let wipe = vec![BodyOp::delete(3).unwrap()];
        // Our restyle of deleted content vanishes…
        assert_eq!(Body::transform(&restyle, &wipe, false).unwrap(), vec![]);
        // …while our delete of restyled content still deletes.
        assert_eq!(
            Body::transform(&wipe, &restyle, false).unwrap(),
            vec![BodyOp::delete(3).unwrap()]
        );
    }

    #[test]
    fn transform_attribute_conflict_respects_priority() {
        let ours = vec![BodyOp::retain_with(1, Some(bold())).unwrap()];
        let theirs = vec![BodyOp::retain_with(
            1,
            Some([("bold".to_string(), json!(false))].into_iter().collect()),
        )
        .unwrap()];
        assert_eq!(Body::transform(&ours, &theirs, false).unwrap(), vec![]);
        assert_eq!(
            Body::transform(&ours, &theirs, true).unwrap(),
            vec![BodyOp::retain_with(1, Some(bold())).unwrap()]
        );
    }

    #[test]
    fn diff_turns_old_into_new() {
        let old = vec![text("the quick fox")];
        let new = vec![text("the lazy fox")];
        let patch = Body::diff(&old, &new).unwrap();
        assert_eq!(Body::compose(&old, &patch, true).unwrap(), new);
    }

    #[test]
    fn diff_of_equal_documents_is_empty() {
        let doc = vec![text("same"), BodyOp::embed("rule", json!(null), None).unwrap()];
        assert_eq!(Body::diff(&doc, &doc).unwrap(), vec![]);
    }

    #[test]
    fn diff_sees_attribute_changes() {
        let old = vec![text("ab")];
        let new = vec![BodyOp::text_with("a", Some(bold())).unwrap(), text("b")];
        let patch = Body::diff(&old, &new).unwrap();
        assert_eq!(Body::compose(&old, &patch, true).unwrap(), new);
    }

    #[test]
    fn diff_rejects_non_documents() {
        let not_doc = vec![BodyOp::retain(1).unwrap()];
        assert!(Body::diff(&not_doc, &[]).is_err());
    }

    #[test]
    fn normalize_merges_runs_and_chops_trailing_retain() {
        let ops = vec![
            text("ab"),
            text("cd"),
            BodyOp::delete(1).unwrap(),
            BodyOp::delete(2).unwrap(),
            BodyOp::retain(4).unwrap(),
        ];
        assert_eq!(
            Body::normalize(&ops),
            vec![text("abcd"), BodyOp::delete(3).unwrap()]
        );
    }

    #[test]
    fn compose_restyles_an_embed() {
        let a = vec![BodyOp::embed("image", json!({"url": "u"}), None).unwrap()];
        let b = vec![BodyOp::retain_with(1, Some(bold())).unwrap()];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(
            doc,
            vec![BodyOp::embed("image", json!({"url": "u"}), Some(bold())).unwrap()]
        );
    }

    #[test]
    fn compose_deletes_through_an_embed() {
        let a = vec![
            text("ab"),
            BodyOp::embed("rule", json!(null), None).unwrap(),
            text("cd"),
        ];
        let b = vec![BodyOp::retain(1).unwrap(), BodyOp::delete(3).unwrap()];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![text("ad")]);
    }

    #[test]
    fn compose_splits_multibyte_text_on_unit_boundaries() {
        let a = vec![text("héllo")];
        let b = vec![BodyOp::retain(2).unwrap(), BodyOp::delete(2).unwrap()];
        let doc = Body::compose(&a, &b, true).unwrap();
        assert_eq!(doc, vec![text("héo")]);
    }

    #[test]
    fn transform_insert_lands_inside_the_other_sides_survivors() {
        // Base "abcd": we insert at 3, they delete "bc".
        let ours = vec![BodyOp::retain(3).unwrap(), text("X")];
        let theirs = vec![BodyOp::retain(1).unwrap(), BodyOp::delete(2).unwrap()];
        let rebased = Body::transform(&ours, &theirs, false).unwrap();
        assert_eq!(rebased, vec![BodyOp::retain(1).unwrap(), text("X")]);
        // Applying onto "ad" puts the insert where "abc|d" collapsed to "a|d".
        let doc = Body::compose(&vec![text("ad")], &rebased, true).unwrap();
        assert_eq!(doc, vec![text("aXd")]);
    }

    #[test]
    fn transform_preserves_embeds_across_concurrent_edits() {
        // Base "ab": we append an embed at the end, they delete "a".
        let ours = vec![
            BodyOp::retain(2).unwrap(),
            BodyOp::embed("image", json!({"url": "u"}), None).unwrap(),
        ];
        let theirs = vec![BodyOp::delete(1).unwrap()];
        let rebased = Body::transform(&ours, &theirs, false).unwrap();
        assert_eq!(
            rebased,
            vec![
                BodyOp::retain(1).unwrap(),
                BodyOp::embed("image", json!({"url": "u"}), None).unwrap(),
            ]
        );
    }

    #[test]
    fn serde_roundtrip_preserves_ops() {
        let ops = vec![
            BodyOp::text_with("hi", Some(bold())).unwrap(),
            BodyOp::embed("image", json!({"url": "u"}), None).unwrap(),
            BodyOp::retain_with(2, Some(unbold())).unwrap(),
            BodyOp::delete(1).unwrap(),
        ];
        let encoded = serde_json::to_string(&ops).unwrap();
        let decoded: Vec<BodyOp> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, ops);
    }
}
