pub mod engine;
pub mod impact;
pub mod issue;
pub mod rule;
pub mod rules;

pub use engine::{CancelToken, RuleEngine};
pub use impact::trace_impact;
pub use issue::*;
pub use rule::*;
