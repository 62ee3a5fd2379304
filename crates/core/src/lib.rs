pub mod clock;
pub mod diff;
pub mod error;
pub mod ids;
pub mod rule;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use diff::RuleDiff;
pub use error::CoreError;
pub use ids::*;
pub use rule::{ColumnType, Operator, Rule, Style};
pub use value::RuleValue;
