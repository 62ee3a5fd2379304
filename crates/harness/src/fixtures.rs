//! Rule lists that trigger each validation finding.

use condfmt_core::{Operator, Rule, Style};

/// Fixed start time for `ManualClock`s in tests.
pub const EPOCH_MS: u64 = 1_700_000_000_000;

pub fn red() -> Style {
    Style::background("#f00")
}

pub fn bold() -> Style {
    Style {
        bold: Some(true),
        ..Style::default()
    }
}

/// Two ranges that overlap on [5, 10] and disagree on background colour.
pub fn overlapping_ranges() -> Vec<Rule> {
    vec![
        Rule::between("r1", 0, 10).with_style(Style::background("#fff")),
        Rule::between("r2", 5, 15).with_style(Style::background("#000")),
    ]
}

/// Three overlapping ranges with compatible styles: the resolver can fold
/// them into one.
pub fn mergeable_ranges() -> Vec<Rule> {
    vec![
        Rule::between("a", 0, 10).with_style(red()),
        Rule::between("b", 5, 15).with_style(red()),
        Rule::between("c", 8, 20).with_style(bold()),
    ]
}

/// Two `equals` rules on the same value; the second is unreachable.
pub fn duplicate_equals() -> Vec<Rule> {
    vec![
        Rule::equals("done-green", "Done").with_style(Style::background("#0f0")),
        Rule::equals("done-bold", "Done").with_style(bold()),
    ]
}

/// `contains "err"` directly after `contains "error"` is unreachable.
pub fn shadowed_contains() -> Vec<Rule> {
    vec![
        Rule::equals("ok", "fine"),
        Rule::contains("error", "error").with_style(red()),
        Rule::contains("err", "err").with_style(bold()),
    ]
}

/// Rules with blank operands, one per operator family.
pub fn blank_rules() -> Vec<Rule> {
    vec![
        Rule::between("blank-range", "", ""),
        Rule::equals("blank-eq", ""),
        Rule {
            id: "blank-gt".into(),
            operator: Operator::GreaterThan,
            value1: "".into(),
            value2: None,
            style: Style::default(),
        },
    ]
}
