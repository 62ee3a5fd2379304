//! Automatic resolution: run whole-list strategies until conflicts stop
//! going down.

use serde::{Deserialize, Serialize};
use tracing::debug;

use condfmt_core::{Operator, Rule, RuleDiff, RuleValue};

use crate::config::DEFAULT_MAX_PASSES;
use crate::conflict::{FixConflict, detect_conflicts};
use crate::suggest::FixSuggestion;
use crate::validate::{conditions_overlap, ranges_overlap};

/// A rule-list transformation applied by the resolver. Each strategy reads the
/// whole list and returns a new one; fixes are passed for context only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    MergeOverlapping,
    OptimizeRanges,
    ReorderRules,
    CombineStyles,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 4] = [
        ResolutionStrategy::MergeOverlapping,
        ResolutionStrategy::OptimizeRanges,
        ResolutionStrategy::ReorderRules,
        ResolutionStrategy::CombineStyles,
    ];

    /// Every strategy, highest confidence first.
    pub fn by_confidence() -> Vec<ResolutionStrategy> {
        let mut all = Self::ALL.to_vec();
        all.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
        all
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::MergeOverlapping => "merge-overlapping",
            Self::OptimizeRanges => "optimize-ranges",
            Self::ReorderRules => "reorder-rules",
            Self::CombineStyles => "combine-styles",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MergeOverlapping => "Merge Overlapping Rules",
            Self::OptimizeRanges => "Optimize Range Boundaries",
            Self::ReorderRules => "Reorder by Specificity",
            Self::CombineStyles => "Combine Compatible Styles",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::MergeOverlapping => "Merges rules whose conditions overlap and whose styles agree",
            Self::OptimizeRanges => "Moves overlapping ranges into the closest free gap",
            Self::ReorderRules => "Puts more specific rules ahead of broader ones",
            Self::CombineStyles => "Fills style gaps from rules matching the same values",
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::MergeOverlapping => 0.9,
            Self::OptimizeRanges => 0.8,
            Self::ReorderRules => 0.7,
            Self::CombineStyles => 0.85,
        }
    }

    pub fn apply(&self, rules: &[Rule], _fixes: &[FixSuggestion]) -> Vec<Rule> {
        match self {
            Self::MergeOverlapping => merge_overlapping(rules),
            Self::OptimizeRanges => optimize_ranges(rules),
            Self::ReorderRules => reorder_by_specificity(rules),
            Self::CombineStyles => combine_styles(rules),
        }
    }
}

/// One strategy run that changed the rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyApplication {
    pub strategy: ResolutionStrategy,
    pub pass: usize,
    pub before: Vec<Rule>,
    pub after: Vec<Rule>,
    pub conflicts_before: Vec<FixConflict>,
    pub conflicts_after: Vec<FixConflict>,
}

impl StrategyApplication {
    /// Conflicts present before the run and gone after it.
    pub fn resolved_conflicts(&self) -> Vec<FixConflict> {
        let after: Vec<_> = self.conflicts_after.iter().map(FixConflict::key).collect();
        self.conflicts_before
            .iter()
            .filter(|c| !after.contains(&c.key()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSummary {
    pub rules_modified: usize,
    pub conflicts_resolved: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub resolved_rules: Vec<Rule>,
    pub applied_strategies: Vec<ResolutionStrategy>,
    pub remaining_conflicts: Vec<FixConflict>,
    pub summary: ResolutionSummary,
    pub applications: Vec<StrategyApplication>,
}

impl ResolutionResult {
    pub fn applied_strategy_ids(&self) -> Vec<&'static str> {
        self.applied_strategies.iter().map(|s| s.id()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct AutoResolver {
    max_passes: usize,
}

impl Default for AutoResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PASSES)
    }
}

impl AutoResolver {
    pub fn new(max_passes: usize) -> Self {
        Self { max_passes }
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Apply every strategy in confidence order, pass after pass, while the
    /// conflict count keeps dropping. A pass that does not lower the count is
    /// discarded, so the result never has more conflicts than `conflicts`.
    pub fn resolve(
        &self,
        rules: &[Rule],
        fixes: &[FixSuggestion],
        conflicts: &[FixConflict],
    ) -> ResolutionResult {
        let order = ResolutionStrategy::by_confidence();
        let mut current = rules.to_vec();
        let mut remaining = conflicts.to_vec();
        let mut applied = Vec::new();
        let mut applications = Vec::new();
        let mut resolved = 0;

        for pass in 1..=self.max_passes {
            let mut working = current.clone();
            let mut outstanding = remaining.clone();
            let mut pass_applications = Vec::new();

            for strategy in &order {
                let next = strategy.apply(&working, fixes);
                if next == working {
                    continue;
                }
                let after = detect_conflicts(fixes, &next);
                pass_applications.push(StrategyApplication {
                    strategy: *strategy,
                    pass,
                    before: std::mem::replace(&mut working, next.clone()),
                    after: next,
                    conflicts_before: std::mem::replace(&mut outstanding, after.clone()),
                    conflicts_after: after,
                });
            }

            if outstanding.len() >= remaining.len() {
                debug!(
                    pass,
                    conflicts = remaining.len(),
                    strategies = pass_applications.len(),
                    "resolution pass made no progress, stopping"
                );
                break;
            }

            debug!(
                pass,
                before = remaining.len(),
                after = outstanding.len(),
                "resolution pass"
            );
            resolved += remaining.len() - outstanding.len();
            applied.extend(pass_applications.iter().map(|a| a.strategy));
            applications.extend(pass_applications);
            current = working;
            remaining = outstanding;
        }

        let confidence = if applied.is_empty() {
            1.0
        } else {
            applied.iter().map(ResolutionStrategy::confidence).sum::<f64>() / applied.len() as f64
        };

        ResolutionResult {
            summary: ResolutionSummary {
                rules_modified: RuleDiff::between(rules, &current).total(),
                conflicts_resolved: resolved,
                confidence,
            },
            resolved_rules: current,
            applied_strategies: applied,
            remaining_conflicts: remaining,
            applications,
        }
    }
}

/// [`AutoResolver::resolve`] with the default pass limit.
pub fn auto_resolve(
    rules: &[Rule],
    fixes: &[FixSuggestion],
    conflicts: &[FixConflict],
) -> ResolutionResult {
    AutoResolver::default().resolve(rules, fixes, conflicts)
}

fn can_merge(a: &Rule, b: &Rule) -> bool {
    conditions_overlap(a, b) && !a.style.clashes_with(&b.style)
}

/// `a` absorbs `b`: widest range, or the shorter (more general) pattern.
fn merge_pair(a: &Rule, b: &Rule) -> Rule {
    let mut merged = a.clone().with_style(a.style.fill_from(&b.style));
    match a.operator {
        Operator::Between => {
            if let (Some((min1, max1)), Some((min2, max2))) = (a.range(), b.range()) {
                merged.value1 = RuleValue::Number(min1.min(min2));
                merged.value2 = Some(RuleValue::Number(max1.max(max2)));
            }
        }
        Operator::Contains => {
            if b.value1.as_text().len() < a.value1.as_text().len() {
                merged.value1 = b.value1.clone();
            }
        }
        _ => {}
    }
    merged
}

fn merge_overlapping(rules: &[Rule]) -> Vec<Rule> {
    let mut consumed = vec![false; rules.len()];
    let mut out = Vec::with_capacity(rules.len());
    for i in 0..rules.len() {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;
        let mut current = rules[i].clone();
        for j in i + 1..rules.len() {
            if !consumed[j] && can_merge(&current, &rules[j]) {
                current = merge_pair(&current, &rules[j]);
                consumed[j] = true;
            }
        }
        out.push(current);
    }
    out
}

/// Move each overlapping range into the free gap between the other ranges
/// that needs the least boundary movement. Ranges with no wide-enough gap
/// stay put.
fn optimize_ranges(rules: &[Rule]) -> Vec<Rule> {
    let mut out = rules.to_vec();
    for i in 0..out.len() {
        let Some((min, max)) = out[i].range() else {
            continue;
        };
        let mut others: Vec<(f64, f64)> = out
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter_map(|(_, r)| r.range())
            .collect();
        if !others.iter().any(|r| ranges_overlap((min, max), *r)) {
            continue;
        }
        others.sort_by(|a, b| a.0.total_cmp(&b.0));

        let width = max - min;
        let best = others
            .windows(2)
            .map(|w| (w[0].1, w[1].0))
            .filter(|(start, end)| end > start && end - start >= width)
            .min_by(|a, b| {
                let cost = |(s, e): &(f64, f64)| (s - min).abs() + (e - max).abs();
                cost(a).total_cmp(&cost(b))
            });
        if let Some((start, end)) = best {
            out[i].value1 = RuleValue::Number(start);
            out[i].value2 = Some(RuleValue::Number(end));
        }
    }
    out
}

fn reorder_by_specificity(rules: &[Rule]) -> Vec<Rule> {
    let mut out = rules.to_vec();
    out.sort_by_key(|r| std::cmp::Reverse(r.operator.specificity()));
    out
}

fn combine_styles(rules: &[Rule]) -> Vec<Rule> {
    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let style = rules
                .iter()
                .enumerate()
                .filter(|(j, other)| {
                    *j != i
                        && conditions_overlap(rule, other)
                        && rule.style.shares_property_with(&other.style)
                })
                .fold(rule.style.clone(), |acc, (_, other)| acc.fill_from(&other.style));
            rule.clone().with_style(style)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use condfmt_core::{ColumnType, Style};
    use proptest::prelude::*;

    use crate::suggest::{FixKind, generate_fixes};
    use crate::validate::validate_rules;

    fn all_fixes(rules: &[Rule], column: ColumnType) -> Vec<FixSuggestion> {
        validate_rules(rules, column)
            .iter()
            .flat_map(|w| generate_fixes(w, rules))
            .collect()
    }

    #[test]
    fn catalog_is_ordered_by_confidence() {
        let ids: Vec<_> = ResolutionStrategy::by_confidence().iter().map(|s| s.id()).collect();
        assert_eq!(
            ids,
            vec!["merge-overlapping", "combine-styles", "optimize-ranges", "reorder-rules"]
        );
    }

    #[test]
    fn compatible_overlaps_are_merged_away() {
        let red = Style::background("#f00");
        let rules = vec![
            Rule::between("a", 0, 10).with_style(red.clone()),
            Rule::between("b", 5, 15).with_style(red.clone()),
            Rule::between("c", 8, 20),
        ];
        let warning = validate_rules(&rules, ColumnType::Number)
            .into_iter()
            .find(|w| w.rule_ids == vec!["a", "b"])
            .expect("a/b overlap");
        let fixes: Vec<_> = generate_fixes(&warning, &rules)
            .into_iter()
            .filter(|f| f.kind == FixKind::SplitRange)
            .collect();
        let conflicts = detect_conflicts(&fixes, &rules);
        assert_eq!(conflicts.len(), 1);

        let result = auto_resolve(&rules, &fixes, &conflicts);
        assert_eq!(result.applied_strategy_ids(), vec!["merge-overlapping"]);
        assert_eq!(result.resolved_rules.len(), 1);
        assert_eq!(result.resolved_rules[0].range(), Some((0.0, 20.0)));
        assert_eq!(result.resolved_rules[0].style, red);
        assert!(result.remaining_conflicts.is_empty());
        assert_eq!(result.summary.conflicts_resolved, 1);
        assert_eq!(result.summary.rules_modified, 3);
        assert!((result.summary.confidence - 0.9).abs() < 1e-9);

        assert_eq!(result.applications.len(), 1);
        assert_eq!(result.applications[0].resolved_conflicts(), conflicts);
    }

    #[test]
    fn no_progress_leaves_rules_untouched() {
        let rules = vec![
            Rule::between("r1", 0, 10).with_style(Style::background("#fff")),
            Rule::between("r2", 5, 15).with_style(Style::background("#000")),
        ];
        let fixes = all_fixes(&rules, ColumnType::Number);
        let conflicts = detect_conflicts(&fixes, &rules);
        assert_eq!(conflicts.len(), 2);

        let result = auto_resolve(&rules, &fixes, &conflicts);
        assert_eq!(result.resolved_rules, rules);
        assert!(result.applied_strategies.is_empty());
        assert_eq!(result.remaining_conflicts, conflicts);
        assert_eq!(result.summary.confidence, 1.0);
        assert_eq!(result.summary.rules_modified, 0);
    }

    #[test]
    fn reorder_is_stable_by_specificity() {
        let rules = vec![
            Rule::contains("c1", "x"),
            Rule::between("b1", 0, 1),
            Rule::equals("e1", "y"),
            Rule::contains("c2", "z"),
            Rule::equals("e2", "w"),
        ];
        let ids: Vec<_> = reorder_by_specificity(&rules)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["e1", "e2", "b1", "c1", "c2"]);
    }

    #[test]
    fn optimize_moves_range_into_nearest_gap() {
        let rules = vec![
            Rule::between("a", 0, 10),
            Rule::between("b", 20, 30),
            Rule::between("moving", 8, 13),
        ];
        let out = optimize_ranges(&rules);
        assert_eq!(out[2].range(), Some((10.0, 20.0)));
        // `a` is visited first and finds no gap ten wide.
        assert_eq!(out[0], rules[0]);
    }

    #[test]
    fn combine_fills_missing_style_properties() {
        let rules = vec![
            Rule::equals("a", "x").with_style(Style {
                background_color: Some("#f00".into()),
                bold: Some(true),
                ..Style::default()
            }),
            Rule::equals("b", "x").with_style(Style {
                background_color: Some("#0f0".into()),
                italic: Some(true),
                ..Style::default()
            }),
        ];
        let out = combine_styles(&rules);
        assert_eq!(out[0].style.background_color.as_deref(), Some("#f00"));
        assert_eq!(out[0].style.italic, Some(true));
        assert_eq!(out[1].style.background_color.as_deref(), Some("#0f0"));
        assert_eq!(out[1].style.bold, Some(true));
    }

    #[test]
    fn zero_passes_is_a_no_op() {
        let rules = vec![Rule::between("a", 0, 10), Rule::between("b", 5, 15)];
        let fixes = all_fixes(&rules, ColumnType::Number);
        let conflicts = detect_conflicts(&fixes, &rules);
        let result = AutoResolver::new(0).resolve(&rules, &fixes, &conflicts);
        assert_eq!(result.resolved_rules, rules);
        assert_eq!(result.remaining_conflicts.len(), conflicts.len());
    }

    fn arb_rule(index: usize) -> impl Strategy<Value = Rule> {
        let id = format!("r{index}");
        let colors = prop::sample::select(vec![None, Some("#f00"), Some("#00f")]);
        (0u8..3, 0i32..20, 0i32..20, colors, prop::sample::select(vec!["ab", "abc", "b"]))
            .prop_map(move |(op, lo, hi, color, text)| {
                let rule = match op {
                    0 => Rule::between(id.clone(), lo, hi),
                    1 => Rule::equals(id.clone(), text),
                    _ => Rule::contains(id.clone(), text),
                };
                match color {
                    Some(c) => rule.with_style(Style::background(c)),
                    None => rule,
                }
            })
    }

    fn arb_rules() -> impl Strategy<Value = Vec<Rule>> {
        (1usize..6).prop_flat_map(|n| (0..n).map(arb_rule).collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn resolution_never_adds_conflicts(rules in arb_rules()) {
            let fixes = all_fixes(&rules, ColumnType::Number);
            let conflicts = detect_conflicts(&fixes, &rules);
            let result = auto_resolve(&rules, &fixes, &conflicts);
            prop_assert!(result.remaining_conflicts.len() <= conflicts.len());
            prop_assert_eq!(
                result.summary.conflicts_resolved,
                conflicts.len() - result.remaining_conflicts.len()
            );
            prop_assert!(result.applications.iter().all(|a| a.pass <= DEFAULT_MAX_PASSES));

            let again = auto_resolve(&rules, &fixes, &conflicts);
            prop_assert_eq!(again, result);
        }
    }
}
