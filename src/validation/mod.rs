//! Declarative field validation.
//!
//! - **Rule**: [`ValidationRule`] with its [`Check`] payload, [`Trigger`] and [`Scope`]
//! - **Check**: context-free checks and regex aliases
//! - **Engine**: rule evaluation in short-circuit or batch mode

pub mod check;
pub mod engine;
pub mod rule;

pub use check::{check_value, compile_pattern, matches_regex, regex_alias};
pub use engine::{validate, UniqueLookup, ValidationContext};
pub use rule::{Check, LengthRule, Operation, Scope, Trigger, ValidationRule, ValidatorFn};
