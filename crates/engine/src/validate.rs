//! Structural checks over an ordered rule list.
//!
//! Every check runs on every pass and reports problems as warnings; malformed
//! operands are themselves the finding, so validation never fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use condfmt_core::{ColumnType, Operator, Rule, RuleValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WarningKind {
    #[serde(rename = "Empty value")]
    EmptyValue,
    #[serde(rename = "Overlapping ranges")]
    OverlappingRanges,
    #[serde(rename = "Conflicting conditions")]
    ConflictingConditions,
    #[serde(rename = "Unreachable rule")]
    UnreachableRule,
    #[serde(rename = "Invalid number")]
    InvalidNumber,
    #[serde(rename = "Invalid date")]
    InvalidDate,
}

impl WarningKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmptyValue => "Empty value",
            Self::OverlappingRanges => "Overlapping ranges",
            Self::ConflictingConditions => "Conflicting conditions",
            Self::UnreachableRule => "Unreachable rule",
            Self::InvalidNumber => "Invalid number",
            Self::InvalidDate => "Invalid date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub severity: Severity,
    pub kind: WarningKind,
    pub rule_ids: Vec<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Identity of a warning across validation passes: kind plus sorted rule ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WarningKey {
    pub kind: WarningKind,
    pub rule_ids: Vec<String>,
}

impl ValidationWarning {
    fn new(
        severity: Severity,
        kind: WarningKind,
        rule_ids: Vec<String>,
        description: impl Into<String>,
        suggestion: &str,
    ) -> Self {
        Self {
            severity,
            kind,
            rule_ids,
            description: description.into(),
            suggestion: Some(suggestion.to_string()),
        }
    }

    pub fn key(&self) -> WarningKey {
        let mut rule_ids = self.rule_ids.clone();
        rule_ids.sort();
        rule_ids.dedup();
        WarningKey {
            kind: self.kind,
            rule_ids,
        }
    }

    pub fn references(&self, rule_id: &str) -> bool {
        self.rule_ids.iter().any(|id| id == rule_id)
    }
}

/// Run every check against `rules`. Callers must not rely on the order of the
/// returned warnings.
pub fn validate_rules(rules: &[Rule], column_type: ColumnType) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for rule in rules {
        if rule.value1.is_empty() && rule.operator != Operator::NotContains {
            warnings.push(ValidationWarning::new(
                Severity::Error,
                WarningKind::EmptyValue,
                vec![rule.id.clone()],
                "Rule has no value specified",
                "Add a value to make the rule functional",
            ));
        }
    }

    if column_type == ColumnType::Number {
        for (i, a) in rules.iter().enumerate() {
            for (j, b) in rules.iter().enumerate().skip(i + 1) {
                if numeric_overlap(a, b) {
                    warnings.push(ValidationWarning::new(
                        Severity::Warning,
                        WarningKind::OverlappingRanges,
                        vec![a.id.clone(), b.id.clone()],
                        format!("Rules {} and {} have overlapping ranges", i + 1, j + 1),
                        "Consider adjusting ranges to avoid conflicts",
                    ));
                }
            }
        }
    }

    for (i, a) in rules.iter().enumerate() {
        for b in rules.iter().skip(i + 1) {
            if let Some(reason) = conflicting_conditions(a, b) {
                warnings.push(ValidationWarning::new(
                    Severity::Warning,
                    WarningKind::ConflictingConditions,
                    vec![a.id.clone(), b.id.clone()],
                    reason,
                    "Review rule order or combine rules",
                ));
            }
        }
    }

    for (i, pair) in rules.windows(2).enumerate() {
        if shadows(&pair[0], &pair[1]) {
            warnings.push(ValidationWarning::new(
                Severity::Error,
                WarningKind::UnreachableRule,
                vec![pair[1].id.clone()],
                format!("Rule {} will never be reached due to Rule {}", i + 2, i + 1),
                "Consider removing or reordering the rule",
            ));
        }
    }

    for rule in rules {
        if let Some(warning) = type_warning(rule, column_type) {
            warnings.push(warning);
        }
    }

    warnings
}

/// Closed-interval overlap of normalised `(min, max)` pairs: touching
/// endpoints count.
pub fn ranges_overlap((min1, max1): (f64, f64), (min2, max2): (f64, f64)) -> bool {
    min1.max(min2) <= max1.min(max2)
}

/// Both rules are `between` with numeric bounds and their intervals overlap.
pub fn numeric_overlap(a: &Rule, b: &Rule) -> bool {
    match (a.range(), b.range()) {
        (Some(ra), Some(rb)) => ranges_overlap(ra, rb),
        _ => false,
    }
}

/// Two rules that can match the same cell value: equal `equals` operands, or
/// `contains` patterns where one is a (case-insensitive) substring of the other.
pub fn conflicting_conditions(a: &Rule, b: &Rule) -> Option<&'static str> {
    match (a.operator, b.operator) {
        (Operator::Equals, Operator::Equals) if a.value1 == b.value1 => {
            Some("Multiple rules match the same exact value")
        }
        (Operator::Contains, Operator::Contains) if patterns_nest(&a.value1, &b.value1) => {
            Some("Overlapping text patterns")
        }
        _ => None,
    }
}

/// Same-operator overlap used when judging whether one rule overrides another:
/// intersecting ranges, equal `equals` operands or nested `contains` patterns.
pub fn conditions_overlap(a: &Rule, b: &Rule) -> bool {
    if a.operator != b.operator {
        return false;
    }
    match a.operator {
        Operator::Between => numeric_overlap(a, b),
        Operator::Equals | Operator::Contains => conflicting_conditions(a, b).is_some(),
        _ => false,
    }
}

/// `later` directly follows `earlier` and is reported as never firing: equal
/// `equals` operands, or an earlier `contains` pattern that includes the later
/// one (case-sensitive).
pub fn shadows(earlier: &Rule, later: &Rule) -> bool {
    match (earlier.operator, later.operator) {
        (Operator::Equals, Operator::Equals) => earlier.value1 == later.value1,
        (Operator::Contains, Operator::Contains) => earlier
            .value1
            .as_text()
            .contains(later.value1.as_text().as_ref()),
        _ => false,
    }
}

fn patterns_nest(a: &RuleValue, b: &RuleValue) -> bool {
    let a = a.as_text().to_lowercase();
    let b = b.as_text().to_lowercase();
    a.contains(&b) || b.contains(&a)
}

fn type_warning(rule: &Rule, column_type: ColumnType) -> Option<ValidationWarning> {
    let mut operands = std::iter::once(&rule.value1).chain(rule.value2.as_ref());
    match column_type {
        ColumnType::Number => operands
            .any(|v| !v.is_empty() && v.as_number().is_none())
            .then(|| {
                ValidationWarning::new(
                    Severity::Error,
                    WarningKind::InvalidNumber,
                    vec![rule.id.clone()],
                    "Non-numeric value used in numeric comparison",
                    "Use only numeric values for this column type",
                )
            }),
        ColumnType::Date => operands.any(|v| !is_valid_date_value(v)).then(|| {
            ValidationWarning::new(
                Severity::Error,
                WarningKind::InvalidDate,
                vec![rule.id.clone()],
                "Invalid date format used",
                "Use valid date format (YYYY-MM-DD)",
            )
        }),
        ColumnType::Text | ColumnType::Status => None,
    }
}

fn is_valid_date_value(value: &RuleValue) -> bool {
    match value {
        // Epoch milliseconds.
        RuleValue::Number(n) => n.is_finite(),
        RuleValue::Text(s) => is_valid_date(s),
    }
}

/// Accepts RFC 3339 timestamps and the common calendar layouts the editor
/// produces.
pub fn is_valid_date(s: &str) -> bool {
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    const DATETIME_FORMATS: [&str; 3] =
        ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

    let s = s.trim();
    DateTime::parse_from_rfc3339(s).is_ok()
        || DATE_FORMATS
            .iter()
            .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
}
