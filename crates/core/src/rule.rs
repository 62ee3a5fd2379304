use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::value::RuleValue;

/// Comparison operator of a conditional-formatting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Between,
    Contains,
    NotContains,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
        }
    }

    /// Value a rule gets when the user left it blank: `(value1, value2)`.
    pub fn default_operands(&self) -> (RuleValue, Option<RuleValue>) {
        match self {
            Self::GreaterThan | Self::LessThan => (RuleValue::Number(0.0), None),
            Self::Between => (RuleValue::Number(0.0), Some(RuleValue::Number(100.0))),
            Self::Equals | Self::NotEquals | Self::Contains | Self::NotContains => {
                (RuleValue::text(""), None)
            }
        }
    }

    /// Ordering weight used when rules are re-sorted; higher matches fewer values.
    pub fn specificity(&self) -> u32 {
        match self {
            Self::Equals => 100,
            Self::Between => 80,
            Self::Contains => 60,
            _ => 40,
        }
    }
}

/// Column the rule list is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    Text,
    Number,
    Date,
    Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Style {
    pub fn background(color: impl Into<String>) -> Self {
        Self {
            background_color: Some(color.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Keep every property already set on `self`, take the rest from `other`.
    pub fn fill_from(&self, other: &Style) -> Style {
        Style {
            background_color: self
                .background_color
                .clone()
                .or_else(|| other.background_color.clone()),
            text_color: self.text_color.clone().or_else(|| other.text_color.clone()),
            bold: self.bold.or(other.bold),
            italic: self.italic.or(other.italic),
            icon: self.icon.clone().or_else(|| other.icon.clone()),
        }
    }

    /// Every property set on `other` wins over `self`.
    pub fn overlay(&self, other: &Style) -> Style {
        other.fill_from(self)
    }

    /// True when both styles set the same property to different values.
    pub fn clashes_with(&self, other: &Style) -> bool {
        fn differs<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            matches!((a, b), (Some(x), Some(y)) if x != y)
        }
        differs(&self.background_color, &other.background_color)
            || differs(&self.text_color, &other.text_color)
            || differs(&self.bold, &other.bold)
            || differs(&self.italic, &other.italic)
            || differs(&self.icon, &other.icon)
    }

    /// True when both styles set at least one common property.
    pub fn shares_property_with(&self, other: &Style) -> bool {
        (self.background_color.is_some() && other.background_color.is_some())
            || (self.text_color.is_some() && other.text_color.is_some())
            || (self.bold.is_some() && other.bold.is_some())
            || (self.italic.is_some() && other.italic.is_some())
            || (self.icon.is_some() && other.icon.is_some())
    }
}

/// One condition + style entry of an ordered, first-match-wins rule list.
///
/// Rules are values: transformations return new lists instead of editing
/// rules in place, and `==` is full structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub operator: Operator,
    pub value1: RuleValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<RuleValue>,
    #[serde(default)]
    pub style: Style,
}

impl Rule {
    /// Build a single-operand rule. `between` needs [`Rule::between`].
    pub fn new(
        id: impl Into<String>,
        operator: Operator,
        value: impl Into<RuleValue>,
    ) -> Result<Self, CoreError> {
        let id = id.into();
        if operator == Operator::Between {
            return Err(CoreError::InvalidRule(format!(
                "{id}: between takes two operands"
            )));
        }
        Ok(Self {
            id,
            operator,
            value1: value.into(),
            value2: None,
            style: Style::default(),
        })
    }

    pub fn between(
        id: impl Into<String>,
        low: impl Into<RuleValue>,
        high: impl Into<RuleValue>,
    ) -> Self {
        Self {
            id: id.into(),
            operator: Operator::Between,
            value1: low.into(),
            value2: Some(high.into()),
            style: Style::default(),
        }
    }

    pub fn equals(id: impl Into<String>, value: impl Into<RuleValue>) -> Self {
        Self::single(id, Operator::Equals, value)
    }

    pub fn contains(id: impl Into<String>, value: impl Into<RuleValue>) -> Self {
        Self::single(id, Operator::Contains, value)
    }

    fn single(id: impl Into<String>, operator: Operator, value: impl Into<RuleValue>) -> Self {
        Self {
            id: id.into(),
            operator,
            value1: value.into(),
            value2: None,
            style: Style::default(),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// `value2` is present iff the operator is `between`.
    pub fn check_shape(&self) -> Result<(), CoreError> {
        match (self.operator, &self.value2) {
            (Operator::Between, None) => Err(CoreError::InvalidRule(format!(
                "{}: between rule without upper bound",
                self.id
            ))),
            (op, Some(_)) if op != Operator::Between => Err(CoreError::InvalidRule(format!(
                "{}: {} rule with a second operand",
                self.id,
                op.as_str()
            ))),
            _ => Ok(()),
        }
    }

    /// Closed numeric interval `[min, max]` of a `between` rule, normalised so
    /// that `min <= max`. A missing upper bound collapses to `value1`.
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.operator != Operator::Between {
            return None;
        }
        let a = self.value1.as_number()?;
        let b = match &self.value2 {
            Some(v) if !v.is_empty() => v.as_number()?,
            _ => a,
        };
        Some((a.min(b), a.max(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_normalised() {
        assert_eq!(Rule::between("a", 10, 0).range(), Some((0.0, 10.0)));
        assert_eq!(Rule::between("a", "3", "7").range(), Some((3.0, 7.0)));
        assert_eq!(Rule::between("a", "x", 7).range(), None);
        assert_eq!(Rule::equals("a", 3).range(), None);
    }

    #[test]
    fn shape_invariant() {
        assert!(Rule::between("a", 0, 1).check_shape().is_ok());
        assert!(Rule::equals("a", "x").check_shape().is_ok());
        let mut bad = Rule::equals("a", "x");
        bad.value2 = Some(RuleValue::from(1));
        assert!(bad.check_shape().is_err());
        assert!(Rule::new("b", Operator::Between, 1).is_err());
    }

    #[test]
    fn style_fill_keeps_own_properties() {
        let a = Style {
            background_color: Some("#fff".into()),
            ..Style::default()
        };
        let b = Style {
            background_color: Some("#000".into()),
            bold: Some(true),
            ..Style::default()
        };
        let filled = a.fill_from(&b);
        assert_eq!(filled.background_color.as_deref(), Some("#fff"));
        assert_eq!(filled.bold, Some(true));

        let overlaid = a.overlay(&b);
        assert_eq!(overlaid.background_color.as_deref(), Some("#000"));
        assert!(a.clashes_with(&b));
        assert!(a.shares_property_with(&b));
        assert!(!Style::default().shares_property_with(&b));
    }

    #[test]
    fn wire_format_uses_camel_case() -> Result<(), serde_json::Error> {
        let rule = Rule::between("r1", 0, 10).with_style(Style::background("#fff"));
        let json = serde_json::to_value(&rule)?;
        assert_eq!(json["operator"], "between");
        assert_eq!(json["style"]["backgroundColor"], "#fff");
        assert!(json["style"].get("bold").is_none());

        let back: Rule = serde_json::from_value(json)?;
        assert_eq!(back, rule);
        Ok(())
    }
}
