//! Candidate fixes for a single validation warning.
//!
//! A fix carries its transformation as data ([`FixAction`]), so applying it is
//! a pure function of the input list: nothing is captured from the list the fix
//! was generated against except the rule values the fix writes.

use serde::{Deserialize, Serialize};

use condfmt_core::{Rule, RuleValue};

use crate::validate::{ValidationWarning, WarningKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixKind {
    MergeRanges,
    SplitRange,
    CombineRules,
    PrioritizeRule,
    RemoveUnreachable,
    ReorderRules,
    RemoveEmpty,
    DefaultValue,
}

/// Coarse effect of a fix, used to spot fixes that undo each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectClass {
    Merge,
    Split,
    Modify,
}

impl EffectClass {
    pub fn contradicts(self, other: EffectClass) -> bool {
        matches!(
            (self, other),
            (EffectClass::Merge, EffectClass::Split) | (EffectClass::Split, EffectClass::Merge)
        )
    }
}

impl FixKind {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::MergeRanges => "merge-ranges",
            Self::SplitRange => "split-range",
            Self::CombineRules => "combine-rules",
            Self::PrioritizeRule => "prioritize-rule",
            Self::RemoveUnreachable => "remove-unreachable",
            Self::ReorderRules => "reorder-rules",
            Self::RemoveEmpty => "remove-empty",
            Self::DefaultValue => "default-value",
        }
    }

    pub fn effect_class(&self) -> EffectClass {
        match self {
            Self::MergeRanges | Self::CombineRules => EffectClass::Merge,
            Self::SplitRange => EffectClass::Split,
            _ => EffectClass::Modify,
        }
    }
}

/// A rule-list transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FixAction {
    /// Drop every rule in `remove` and put `replacement` where the first of
    /// them stood. No-op when none of them is present.
    Replace {
        remove: Vec<String>,
        replacement: Vec<Rule>,
    },
    Remove { rule_ids: Vec<String> },
    /// Move `rule_id` directly in front of `anchor_id`.
    MoveBefore { rule_id: String, anchor_id: String },
    SetOperands {
        rule_id: String,
        value1: RuleValue,
        value2: Option<RuleValue>,
    },
}

impl FixAction {
    pub fn apply(&self, rules: &[Rule]) -> Vec<Rule> {
        match self {
            FixAction::Replace {
                remove,
                replacement,
            } => {
                let is_removed = |r: &Rule| remove.iter().any(|id| *id == r.id);
                let Some(first) = rules.iter().position(is_removed) else {
                    return rules.to_vec();
                };
                let mut out: Vec<Rule> = rules.iter().filter(|r| !is_removed(r)).cloned().collect();
                let at = rules[..first].iter().filter(|r| !is_removed(r)).count();
                out.splice(at..at, replacement.iter().cloned());
                out
            }
            FixAction::Remove { rule_ids } => rules
                .iter()
                .filter(|r| !rule_ids.contains(&r.id))
                .cloned()
                .collect(),
            FixAction::MoveBefore { rule_id, anchor_id } => {
                let Some(from) = rules.iter().position(|r| r.id == *rule_id) else {
                    return rules.to_vec();
                };
                if !rules.iter().any(|r| r.id == *anchor_id) || rule_id == anchor_id {
                    return rules.to_vec();
                }
                let mut out = rules.to_vec();
                let moved = out.remove(from);
                let to = out
                    .iter()
                    .position(|r| r.id == *anchor_id)
                    .unwrap_or(out.len());
                out.insert(to, moved);
                out
            }
            FixAction::SetOperands {
                rule_id,
                value1,
                value2,
            } => rules
                .iter()
                .map(|r| {
                    if r.id == *rule_id {
                        Rule {
                            value1: value1.clone(),
                            value2: value2.clone(),
                            ..r.clone()
                        }
                    } else {
                        r.clone()
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    pub id: String,
    pub kind: FixKind,
    pub description: String,
    pub impact: String,
    /// Rules of the input list this fix rewrites or removes.
    pub target_rule_ids: Vec<String>,
    pub action: FixAction,
}

impl FixSuggestion {
    fn new(
        kind: FixKind,
        targets: Vec<String>,
        description: &str,
        impact: &str,
        action: FixAction,
    ) -> Self {
        Self {
            id: format!("{}:{}", kind.slug(), targets.join(",")),
            kind,
            description: description.to_string(),
            impact: impact.to_string(),
            target_rule_ids: targets,
            action,
        }
    }

    pub fn apply(&self, rules: &[Rule]) -> Vec<Rule> {
        self.action.apply(rules)
    }

    pub fn effect_class(&self) -> EffectClass {
        self.kind.effect_class()
    }

    pub fn targets(&self, rule_id: &str) -> bool {
        self.target_rule_ids.iter().any(|id| id == rule_id)
    }
}

/// Up to two ranked fixes for `warning`. Warnings that reference rules missing
/// from `rules`, and kinds with no automatic fix, yield nothing.
pub fn generate_fixes(warning: &ValidationWarning, rules: &[Rule]) -> Vec<FixSuggestion> {
    match warning.kind {
        WarningKind::OverlappingRanges => overlap_fixes(warning, rules),
        WarningKind::ConflictingConditions => conflict_fixes(warning, rules),
        WarningKind::UnreachableRule => unreachable_fixes(warning, rules),
        WarningKind::EmptyValue => empty_value_fixes(warning, rules),
        WarningKind::InvalidNumber | WarningKind::InvalidDate => Vec::new(),
    }
}

fn find<'a>(rules: &'a [Rule], id: &str) -> Option<&'a Rule> {
    rules.iter().find(|r| r.id == id)
}

fn pair<'a>(warning: &ValidationWarning, rules: &'a [Rule]) -> Option<(&'a Rule, &'a Rule)> {
    match warning.rule_ids.as_slice() {
        [a, b] => Some((find(rules, a)?, find(rules, b)?)),
        _ => None,
    }
}

fn overlap_fixes(warning: &ValidationWarning, rules: &[Rule]) -> Vec<FixSuggestion> {
    let Some((first, second)) = pair(warning, rules) else {
        return Vec::new();
    };
    let (Some((min1, max1)), Some((min2, max2))) = (first.range(), second.range()) else {
        return Vec::new();
    };
    let targets = vec![first.id.clone(), second.id.clone()];

    let merged = Rule::between(first.id.clone(), min1.min(min2), max1.max(max2))
        .with_style(first.style.clone());
    let mut fixes = vec![FixSuggestion::new(
        FixKind::MergeRanges,
        targets.clone(),
        "Merge overlapping ranges into a single rule",
        "Combines both rules into one with the most inclusive range",
        FixAction::Replace {
            remove: targets.clone(),
            replacement: vec![merged],
        },
    )];

    let mut bounds = vec![min1, max1, min2, max2];
    bounds.sort_by(f64::total_cmp);
    bounds.dedup();
    if bounds.len() >= 2 {
        let segments = bounds
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                Rule::between(format!("split-{}-{i}", first.id), w[0], w[1])
                    .with_style(first.style.clone())
            })
            .collect();
        fixes.push(FixSuggestion::new(
            FixKind::SplitRange,
            targets.clone(),
            "Split into non-overlapping ranges",
            "Creates multiple rules with distinct ranges",
            FixAction::Replace {
                remove: targets,
                replacement: segments,
            },
        ));
    }
    fixes
}

fn conflict_fixes(warning: &ValidationWarning, rules: &[Rule]) -> Vec<FixSuggestion> {
    let Some((first, second)) = pair(warning, rules) else {
        return Vec::new();
    };
    let targets = vec![first.id.clone(), second.id.clone()];
    let combined = first.clone().with_style(first.style.fill_from(&second.style));

    vec![
        FixSuggestion::new(
            FixKind::CombineRules,
            targets.clone(),
            "Combine conflicting rules",
            "Merges rules with the same conditions",
            FixAction::Replace {
                remove: targets,
                replacement: vec![combined],
            },
        ),
        FixSuggestion::new(
            FixKind::PrioritizeRule,
            vec![second.id.clone()],
            "Keep only the first rule",
            "Removes the redundant rule",
            FixAction::Remove {
                rule_ids: vec![second.id.clone()],
            },
        ),
    ]
}

fn unreachable_fixes(warning: &ValidationWarning, rules: &[Rule]) -> Vec<FixSuggestion> {
    let Some(id) = warning.rule_ids.first() else {
        return Vec::new();
    };
    let Some(index) = rules.iter().position(|r| r.id == *id) else {
        return Vec::new();
    };

    let mut fixes = vec![FixSuggestion::new(
        FixKind::RemoveUnreachable,
        vec![id.clone()],
        "Remove unreachable rule",
        "Removes rule that will never be applied",
        FixAction::Remove {
            rule_ids: vec![id.clone()],
        },
    )];
    if let Some(anchor) = index.checked_sub(1).map(|i| &rules[i]) {
        fixes.push(FixSuggestion::new(
            FixKind::ReorderRules,
            vec![id.clone()],
            "Reorder rules",
            "Changes rule order to make all rules reachable",
            FixAction::MoveBefore {
                rule_id: id.clone(),
                anchor_id: anchor.id.clone(),
            },
        ));
    }
    fixes
}

fn empty_value_fixes(warning: &ValidationWarning, rules: &[Rule]) -> Vec<FixSuggestion> {
    let Some(rule) = warning.rule_ids.first().and_then(|id| find(rules, id)) else {
        return Vec::new();
    };

    let mut fixes = vec![FixSuggestion::new(
        FixKind::RemoveEmpty,
        vec![rule.id.clone()],
        "Remove empty rule",
        "Removes rule with no value",
        FixAction::Remove {
            rule_ids: vec![rule.id.clone()],
        },
    )];
    // Text operators default to "", which would leave the rule empty.
    let (value1, value2) = rule.operator.default_operands();
    if !value1.is_empty() {
        fixes.push(FixSuggestion::new(
            FixKind::DefaultValue,
            vec![rule.id.clone()],
            "Add default value",
            "Adds a default value based on the operator",
            FixAction::SetOperands {
                rule_id: rule.id.clone(),
                value1,
                value2,
            },
        ));
    }
    fixes
}
