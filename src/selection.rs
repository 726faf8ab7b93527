//! Selection state machine.
//!
//! Tracks two disjoint structures keyed by region index: the pending set
//! (clicked but not yet committed) and the applied map (regions the backend
//! has already painted, with their committed color). Clicking an applied
//! region always re-opens it for editing before any modifier logic runs.

use std::collections::{BTreeMap, BTreeSet};

/// Committed or palette color, RGB.
pub type Rgb = [u8; 3];

/// How a resolved click mutates the pending set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickModifier {
    /// Plain left click: the incoming indices become the whole selection.
    Replace,
    /// Shift + left click: union with the current selection.
    Add,
    /// Right click: remove the incoming indices from the selection.
    Remove,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pending: BTreeSet<usize>,
    applied: BTreeMap<usize, Rgb>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one resolved click. Incoming indices that are currently in the
    /// applied map are removed from it first, regardless of modifier, then
    /// the modifier is applied to the pending set.
    pub fn resolve_click(&mut self, indices: &[usize], modifier: ClickModifier) {
        for &index in indices {
            self.applied.remove(&index);
        }

        match modifier {
            ClickModifier::Replace => {
                self.pending.clear();
                self.pending.extend(indices.iter().copied());
            }
            ClickModifier::Add => {
                self.pending.extend(indices.iter().copied());
            }
            ClickModifier::Remove => {
                for index in indices {
                    self.pending.remove(index);
                }
            }
        }
    }

    /// Record a successful server-side paint: move every pending index into
    /// the applied map with `color` and empty the pending set. Call only
    /// after the apply-colors round trip succeeded; a failed round trip must
    /// leave both structures untouched by never reaching this.
    pub fn commit(&mut self, color: Rgb) {
        for index in std::mem::take(&mut self.pending) {
            self.applied.insert(index, color);
        }
    }

    /// New upload: both structures start empty before any response lands.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.applied.clear();
    }

    pub fn pending(&self) -> &BTreeSet<usize> {
        &self.pending
    }

    pub fn applied(&self) -> &BTreeMap<usize, Rgb> {
        &self.applied
    }

    pub fn is_pending(&self, index: usize) -> bool {
        self.pending.contains(&index)
    }

    pub fn applied_color(&self, index: usize) -> Option<Rgb> {
        self.applied.get(&index).copied()
    }

    pub fn pending_indices(&self) -> Vec<usize> {
        self.pending.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = [255, 0, 0];
    const GREEN: Rgb = [0, 255, 0];

    fn disjoint(state: &SelectionState) -> bool {
        state.pending().iter().all(|i| !state.applied().contains_key(i))
    }

    #[test]
    fn replace_swaps_selection() {
        let mut state = SelectionState::new();
        state.resolve_click(&[0, 1], ClickModifier::Replace);
        state.resolve_click(&[2], ClickModifier::Replace);
        assert_eq!(state.pending_indices(), vec![2]);
    }

    #[test]
    fn add_unions_and_remove_differences() {
        let mut state = SelectionState::new();
        state.resolve_click(&[0, 1], ClickModifier::Replace);
        state.resolve_click(&[2], ClickModifier::Add);
        assert_eq!(state.pending_indices(), vec![0, 1, 2]);

        state.resolve_click(&[1, 7], ClickModifier::Remove);
        assert_eq!(state.pending_indices(), vec![0, 2]);
    }

    #[test]
    fn remove_of_absent_index_is_a_noop() {
        let mut state = SelectionState::new();
        state.resolve_click(&[42], ClickModifier::Remove);
        assert!(state.pending().is_empty());
        assert!(state.applied().is_empty());
    }

    #[test]
    fn replace_with_empty_resolution_clears_selection() {
        let mut state = SelectionState::new();
        state.resolve_click(&[0, 1], ClickModifier::Replace);
        state.resolve_click(&[], ClickModifier::Replace);
        assert!(state.pending().is_empty());
    }

    #[test]
    fn commit_moves_pending_into_applied() {
        let mut state = SelectionState::new();
        state.resolve_click(&[0, 1], ClickModifier::Replace);
        state.commit(RED);

        assert!(state.pending().is_empty());
        assert_eq!(state.applied_color(0), Some(RED));
        assert_eq!(state.applied_color(1), Some(RED));
        assert_eq!(state.applied().len(), 2);
    }

    #[test]
    fn click_reopens_applied_region_before_modifier() {
        let mut state = SelectionState::new();
        state.resolve_click(&[1], ClickModifier::Replace);
        state.commit(GREEN);

        // Right click on the applied region: re-opened and not reselected.
        state.resolve_click(&[1], ClickModifier::Remove);
        assert_eq!(state.applied_color(1), None);
        assert!(!state.is_pending(1));

        // Left click on an applied region re-opens it and selects it.
        state.resolve_click(&[1], ClickModifier::Replace);
        state.commit(GREEN);
        state.resolve_click(&[1], ClickModifier::Replace);
        assert_eq!(state.applied_color(1), None);
        assert!(state.is_pending(1));
    }

    #[test]
    fn pending_and_applied_stay_disjoint() {
        let mut state = SelectionState::new();
        let script: &[(&[usize], ClickModifier)] = &[
            (&[0, 1, 2], ClickModifier::Replace),
            (&[3], ClickModifier::Add),
            (&[1], ClickModifier::Remove),
            (&[0, 3], ClickModifier::Add),
            (&[2], ClickModifier::Replace),
        ];
        for &(indices, modifier) in script {
            state.resolve_click(indices, modifier);
            assert!(disjoint(&state));
        }
        state.commit(RED);
        assert!(disjoint(&state));
        state.resolve_click(&[2, 5], ClickModifier::Add);
        assert!(disjoint(&state));
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = SelectionState::new();
        state.resolve_click(&[0], ClickModifier::Replace);
        state.commit(RED);
        state.resolve_click(&[1], ClickModifier::Add);
        state.reset();
        assert!(state.pending().is_empty());
        assert!(state.applied().is_empty());
    }
}
