//! Applying several fixes in one go, ordered by how much each one buys.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use condfmt_core::{Rule, RuleDiff};

use crate::suggest::FixSuggestion;
use crate::validate::{ValidationWarning, WarningKey};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub rules_added: usize,
    pub rules_removed: usize,
    pub rules_modified: usize,
    pub warnings_resolved: usize,
}

impl BatchSummary {
    /// Added rules weigh 2, modified 1.5, removed 1.
    pub fn complexity(&self) -> f64 {
        2.0 * self.rules_added as f64 + self.rules_removed as f64 + 1.5 * self.rules_modified as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFixResult {
    pub rules: Vec<Rule>,
    pub applied_fixes: Vec<FixSuggestion>,
    pub remaining_warnings: Vec<ValidationWarning>,
    pub summary: BatchSummary,
}

/// Apply `fixes` in the given order. A fix that leaves the list unchanged is
/// skipped. A warning counts as resolved once any applied fix touches one of
/// its rules.
pub fn analyze_batch(
    fixes: &[FixSuggestion],
    rules: &[Rule],
    warnings: &[ValidationWarning],
) -> BatchFixResult {
    let mut current = rules.to_vec();
    let mut applied = Vec::new();
    let mut resolved: BTreeSet<WarningKey> = BTreeSet::new();

    for fix in fixes {
        let next = fix.apply(&current);
        if next == current {
            debug!(fix = %fix.id, "fix is a no-op on the current rules, skipping");
            continue;
        }
        let touched = touched_ids(&current, &next);
        for warning in warnings {
            if warning.rule_ids.iter().any(|id| touched.contains(id.as_str())) {
                resolved.insert(warning.key());
            }
        }
        debug!(fix = %fix.id, resolved = resolved.len(), "applied batch fix");
        applied.push(fix.clone());
        current = next;
    }

    let diff = RuleDiff::between(rules, &current);
    let remaining_warnings = warnings
        .iter()
        .filter(|w| !resolved.contains(&w.key()))
        .cloned()
        .collect();

    BatchFixResult {
        summary: BatchSummary {
            rules_added: diff.added.len(),
            rules_removed: diff.removed.len(),
            rules_modified: diff.modified.len(),
            warnings_resolved: resolved.len(),
        },
        rules: current,
        applied_fixes: applied,
        remaining_warnings,
    }
}

/// Order `fixes` by warnings resolved (most first), then by complexity
/// (cheapest first). Each fix is scored alone against `rules`; ties keep the
/// input order.
pub fn rank_fixes(
    fixes: &[FixSuggestion],
    rules: &[Rule],
    warnings: &[ValidationWarning],
) -> Vec<FixSuggestion> {
    let mut scored: Vec<(BatchSummary, &FixSuggestion)> = fixes
        .iter()
        .map(|fix| {
            let summary = analyze_batch(std::slice::from_ref(fix), rules, warnings).summary;
            (summary, fix)
        })
        .collect();
    scored.sort_by(|(a, _), (b, _)| {
        b.warnings_resolved
            .cmp(&a.warnings_resolved)
            .then_with(|| a.complexity().total_cmp(&b.complexity()))
    });
    scored.into_iter().map(|(_, fix)| fix.clone()).collect()
}

/// Ids whose rule changed, appeared or disappeared, plus ids that moved
/// relative to the rules present on both sides.
fn touched_ids<'a>(before: &'a [Rule], after: &'a [Rule]) -> BTreeSet<&'a str> {
    let diff = RuleDiff::between(before, after);
    let mut touched: BTreeSet<&str> = BTreeSet::new();
    for id in diff.changed_ids() {
        if let Some(rule) = before.iter().chain(after).find(|r| r.id == id) {
            touched.insert(rule.id.as_str());
        }
    }

    let kept = |list: &'a [Rule]| -> Vec<&'a str> {
        list.iter()
            .map(|r| r.id.as_str())
            .filter(|id| before.iter().any(|r| r.id == *id) && after.iter().any(|r| r.id == *id))
            .collect()
    };
    let old_order: BTreeMap<&str, usize> =
        kept(before).into_iter().enumerate().map(|(i, id)| (id, i)).collect();
    for (i, id) in kept(after).into_iter().enumerate() {
        if old_order.get(id) != Some(&i) {
            touched.insert(id);
        }
    }
    touched
}
