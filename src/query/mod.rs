//! Query options, primary key resolution and SQL templating.
//!
//! - **Options**: the resolved [`QueryOptions`] bag a model hands to its engine
//! - **Primary Key**: [`PrimaryKey`] descriptors and [`Lookup`] argument resolution
//! - **Template**: table placeholder and positional argument substitution

pub mod options;
pub mod primary_key;
pub mod template;

pub use options::{FieldSelection, Limit, Page, QueryOptions};
pub use primary_key::{resolve_lookup, take_update_condition, Lookup, PrimaryKey};
pub use template::{expand_placeholders, format_positional, rewrite_table_tokens};
