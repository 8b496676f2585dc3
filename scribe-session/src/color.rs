//! Caret display colors.

use otcore::SessionId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The caret color palette. Distinguishable on a white page and
/// acceptable on the usual dark themes.
const PALETTE: [&str; 8] = [
    "#d62728", "#1f77b4", "#2ca02c", "#9467bd", "#e377c2", "#8c564b", "#ff7f0e", "#17a2b8",
];

/// Pick a stable color for a session. Collisions are fine; colors are
/// a reading aid, not an identity.
pub fn pick(session_id: &SessionId) -> &'static str {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    PALETTE[(hasher.finish() % PALETTE.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_are_stable() {
        let id = SessionId::new("s-42");
        assert_eq!(pick(&id), pick(&id));
    }

    #[test]
    fn palette_entries_are_valid_caret_colors() {
        for color in PALETTE {
            otcore::CaretOp::set_color(SessionId::new("s"), color).unwrap();
        }
    }
}
