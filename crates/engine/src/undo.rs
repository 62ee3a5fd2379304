use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use condfmt_core::{Clock, Rule, SystemClock};

/// One snapshot of the rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    pub rules: Vec<Rule>,
    pub description: String,
    pub timestamp: u64,
}

/// Linear snapshot history with a cursor. Pushing drops every state after the
/// cursor; once `max_depth` states are held the oldest is evicted.
pub struct UndoManager {
    states: VecDeque<HistoryState>,
    cursor: usize,
    max_depth: usize,
    clock: Box<dyn Clock>,
}

impl UndoManager {
    pub fn new(initial: &[Rule], max_depth: usize) -> Self {
        Self::with_clock(initial, max_depth, SystemClock)
    }

    pub fn with_clock(initial: &[Rule], max_depth: usize, clock: impl Clock + 'static) -> Self {
        let mut manager = Self {
            states: VecDeque::new(),
            cursor: 0,
            max_depth: max_depth.max(1),
            clock: Box::new(clock),
        };
        manager.push(initial, "Initial state");
        manager
    }

    pub fn push(&mut self, rules: &[Rule], description: impl Into<String>) {
        self.states.truncate(self.cursor + 1);
        self.states.push_back(HistoryState {
            rules: rules.to_vec(),
            description: description.into(),
            timestamp: self.clock.now_ms(),
        });
        // Enforce depth limit by dropping oldest entry
        if self.states.len() > self.max_depth {
            self.states.pop_front();
        }
        self.cursor = self.states.len() - 1;
    }

    pub fn undo(&mut self) -> Option<&HistoryState> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.states.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&HistoryState> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.states.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.states.len()
    }

    pub fn current(&self) -> &HistoryState {
        &self.states[self.cursor]
    }

    pub fn states(&self) -> impl Iterator<Item = &HistoryState> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Up to `steps` states on each side of the cursor, oldest first.
    pub fn preview(&self, steps: usize) -> Vec<&HistoryState> {
        let start = self.cursor.saturating_sub(steps);
        let end = (self.cursor + steps + 1).min(self.states.len());
        self.states.range(start..end).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condfmt_core::ManualClock;
    use proptest::prelude::*;

    fn list(n: usize) -> Vec<Rule> {
        (0..n).map(|i| Rule::equals(format!("r{i}"), "x")).collect()
    }

    #[test]
    fn starts_with_initial_state() {
        let history = UndoManager::new(&list(1), 50);
        assert_eq!(history.len(), 1);
        assert_eq!(history.current().description, "Initial state");
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_redo_walk_the_stack() {
        let clock = ManualClock::starting_at(100);
        let mut history = UndoManager::with_clock(&list(0), 50, clock.clone());
        clock.advance(5);
        history.push(&list(1), "one");
        clock.advance(5);
        history.push(&list(2), "two");

        assert_eq!(history.current().timestamp, 110);
        assert_eq!(history.undo().map(|s| s.rules.len()), Some(1));
        assert_eq!(history.undo().map(|s| s.rules.len()), Some(0));
        assert!(history.undo().is_none());
        assert_eq!(history.redo().map(|s| s.description.as_str()), Some("one"));
        assert!(history.can_redo());
    }

    #[test]
    fn push_after_undo_drops_redo_branch() {
        let mut history = UndoManager::new(&list(0), 50);
        history.push(&list(1), "one");
        history.push(&list(2), "two");
        history.undo();
        history.push(&list(3), "three");

        assert!(!history.can_redo());
        let descriptions: Vec<_> = history.states().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Initial state", "one", "three"]);
    }

    #[test]
    fn oldest_state_is_evicted_at_capacity() {
        let mut history = UndoManager::new(&list(0), 3);
        for n in 1..=4 {
            history.push(&list(n), format!("step {n}"));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.states().next().map(|s| s.rules.len()), Some(2));
    }

    #[test]
    fn preview_is_clamped_to_the_stack() {
        let mut history = UndoManager::new(&list(0), 50);
        for n in 1..=8 {
            history.push(&list(n), format!("step {n}"));
        }
        history.undo();
        history.undo();
        // cursor at 6 of 0..=8
        let window: Vec<_> = history.preview(2).iter().map(|s| s.rules.len()).collect();
        assert_eq!(window, vec![4, 5, 6, 7, 8]);
        assert_eq!(history.preview(50).len(), 9);
    }

    proptest! {
        #[test]
        fn undo_then_redo_returns_to_the_same_state(
            pushes in 1usize..80,
            depth in 1usize..60,
            undos in 0usize..80,
        ) {
            let mut history = UndoManager::new(&list(0), depth);
            for n in 1..=pushes {
                history.push(&list(n), format!("step {n}"));
            }
            prop_assert!(history.len() <= depth);

            let top = history.current().clone();
            let mut walked = 0;
            for _ in 0..undos {
                if history.undo().is_some() {
                    walked += 1;
                }
            }
            for _ in 0..walked {
                prop_assert!(history.redo().is_some());
            }
            prop_assert_eq!(history.current(), &top);
            prop_assert!(!history.can_redo());
        }
    }
}
