//! Interactions between fixes selected for the same rule list.

use serde::{Deserialize, Serialize};

use condfmt_core::Rule;

use crate::suggest::{FixAction, FixSuggestion};
use crate::validate::conditions_overlap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Two fixes rewrite the same rules, or undo each other.
    Direct,
    /// A fix rewrites rules whose conditions overlap rules it leaves alone.
    Override,
    /// A fix disturbs rules that depend on its targets. Never produced by
    /// [`detect_conflicts`]; kept so recorded history stays decodable.
    Indirect,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Override => "override",
            Self::Indirect => "indirect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResolutionAction {
    /// Run the fix actions one after another, in order.
    Sequential { actions: Vec<FixAction> },
    /// Overlay the style of each overridden rule onto the rules it overlaps.
    MergeStyles { overridden: Vec<Rule> },
}

impl ResolutionAction {
    pub fn apply(&self, rules: &[Rule]) -> Vec<Rule> {
        match self {
            ResolutionAction::Sequential { actions } => actions
                .iter()
                .fold(rules.to_vec(), |acc, action| action.apply(&acc)),
            ResolutionAction::MergeStyles { overridden } => rules
                .iter()
                .map(|rule| {
                    match overridden
                        .iter()
                        .find(|o| o.id != rule.id && conditions_overlap(rule, o))
                    {
                        Some(o) => rule.clone().with_style(rule.style.overlay(&o.style)),
                        None => rule.clone(),
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub description: String,
    pub action: ResolutionAction,
}

impl ConflictResolution {
    pub fn apply(&self, rules: &[Rule]) -> Vec<Rule> {
        self.action.apply(rules)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixConflict {
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub description: String,
    pub fix_ids: Vec<String>,
    pub impact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
}

/// Identity of a conflict across detection passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConflictKey {
    pub kind: ConflictKind,
    pub fix_ids: Vec<String>,
    pub description: String,
}

impl FixConflict {
    pub fn key(&self) -> ConflictKey {
        let mut fix_ids = self.fix_ids.clone();
        fix_ids.sort();
        ConflictKey {
            kind: self.kind,
            fix_ids,
            description: self.description.clone(),
        }
    }

    pub fn involves(&self, fix_id: &str) -> bool {
        self.fix_ids.iter().any(|id| id == fix_id)
    }
}

/// Conflicts among `fixes` when applied to `rules`.
///
/// A fix none of whose targets is present in `rules` is a no-op there and
/// takes no part. Each unordered pair of fixes is compared once.
pub fn detect_conflicts(fixes: &[FixSuggestion], rules: &[Rule]) -> Vec<FixConflict> {
    let live: Vec<&FixSuggestion> = fixes
        .iter()
        .filter(|f| rules.iter().any(|r| f.targets(&r.id)))
        .collect();

    let mut conflicts = direct_conflicts(&live);
    conflicts.extend(override_conflicts(&live, rules));
    conflicts
}

fn direct_conflicts(fixes: &[&FixSuggestion]) -> Vec<FixConflict> {
    let mut conflicts = Vec::new();
    for (i, first) in fixes.iter().enumerate() {
        for second in &fixes[i + 1..] {
            if first.target_rule_ids.iter().any(|id| second.targets(id)) {
                conflicts.push(FixConflict {
                    kind: ConflictKind::Direct,
                    severity: ConflictSeverity::High,
                    description: "Multiple fixes modify the same rules".to_string(),
                    fix_ids: vec![first.id.clone(), second.id.clone()],
                    impact: "Changes may override each other".to_string(),
                    resolution: Some(ConflictResolution {
                        description: "Apply fixes sequentially".to_string(),
                        action: ResolutionAction::Sequential {
                            actions: vec![first.action.clone(), second.action.clone()],
                        },
                    }),
                });
            }
            if first.effect_class().contradicts(second.effect_class()) {
                conflicts.push(FixConflict {
                    kind: ConflictKind::Direct,
                    severity: ConflictSeverity::High,
                    description: "Fixes have contradictory effects".to_string(),
                    fix_ids: vec![first.id.clone(), second.id.clone()],
                    impact: "Changes may nullify each other".to_string(),
                    resolution: None,
                });
            }
        }
    }
    conflicts
}

fn override_conflicts(fixes: &[&FixSuggestion], rules: &[Rule]) -> Vec<FixConflict> {
    let mut conflicts = Vec::new();
    for fix in fixes {
        let affected: Vec<&Rule> = rules.iter().filter(|r| fix.targets(&r.id)).collect();
        let overridden: Vec<Rule> = rules
            .iter()
            .filter(|r| !fix.targets(&r.id))
            .filter(|r| affected.iter().any(|a| conditions_overlap(a, r)))
            .cloned()
            .collect();
        if overridden.is_empty() {
            continue;
        }
        conflicts.push(FixConflict {
            kind: ConflictKind::Override,
            severity: ConflictSeverity::Medium,
            description: "Fix overrides existing rules".to_string(),
            fix_ids: vec![fix.id.clone()],
            impact: format!("Will override {} existing rules", overridden.len()),
            resolution: Some(ConflictResolution {
                description: "Merge with existing rules".to_string(),
                action: ResolutionAction::MergeStyles { overridden },
            }),
        });
    }
    conflicts
}
