use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::rule::Rule;

/// Identity-level comparison of two rule lists: ids that appeared, ids that
/// disappeared, and ids whose rule changed structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl RuleDiff {
    pub fn between(before: &[Rule], after: &[Rule]) -> Self {
        let old: BTreeMap<&str, &Rule> = before.iter().map(|r| (r.id.as_str(), r)).collect();
        let new: BTreeMap<&str, &Rule> = after.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut diff = RuleDiff::default();
        for rule in after {
            match old.get(rule.id.as_str()) {
                None => push_unique(&mut diff.added, &rule.id),
                Some(prev) if *prev != rule => push_unique(&mut diff.modified, &rule.id),
                Some(_) => {}
            }
        }
        for rule in before {
            if !new.contains_key(rule.id.as_str()) {
                push_unique(&mut diff.removed, &rule.id);
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Added + removed + modified.
    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    pub fn changed_ids(&self) -> BTreeSet<&str> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.modified)
            .map(String::as_str)
            .collect()
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Style;

    #[test]
    fn classifies_changes() {
        let before = vec![
            Rule::between("r1", 0, 10),
            Rule::between("r2", 5, 15),
            Rule::equals("r3", "x"),
        ];
        let after = vec![
            Rule::between("r1", 0, 15),
            Rule::equals("r3", "x"),
            Rule::contains("r4", "y"),
        ];
        let diff = RuleDiff::between(&before, &after);
        assert_eq!(diff.added, vec!["r4"]);
        assert_eq!(diff.removed, vec!["r2"]);
        assert_eq!(diff.modified, vec!["r1"]);
        assert_eq!(diff.total(), 3);
        assert_eq!(
            diff.changed_ids().into_iter().collect::<Vec<_>>(),
            vec!["r1", "r2", "r4"]
        );
    }

    #[test]
    fn reordering_is_not_a_change() {
        let a = vec![Rule::equals("a", "x"), Rule::equals("b", "y")];
        let b = vec![a[1].clone(), a[0].clone()];
        assert!(RuleDiff::between(&a, &b).is_empty());
    }

    #[test]
    fn style_only_edit_counts_as_modified() {
        let a = vec![Rule::equals("a", "x")];
        let b = vec![Rule::equals("a", "x").with_style(Style::background("#f00"))];
        assert_eq!(RuleDiff::between(&a, &b).modified, vec!["a"]);
    }
}
