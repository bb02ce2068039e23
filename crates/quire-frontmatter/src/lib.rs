//! Front matter extraction, variable interpolation and value expansion.
//!
//! This crate splits source files into a YAML front matter block and a body,
//! and evaluates `%variable` references inside the block. Expandable fields
//! such as `permalink` may reference array-typed siblings and expand into
//! several values, one per element.

pub mod derived;
pub mod error;
pub mod expander;
pub mod frontmatter;
pub mod value;

pub use derived::{insert_date_variables, insert_file_variables};
pub use error::FrontMatterError;
pub use expander::{referenced_variables, Expander, DEFAULT_EXPANDABLE_FIELDS, MAX_DEPTH};
pub use frontmatter::{extract_frontmatter, parse_document, parse_yaml_block, Document, ExtractError};
pub use value::{ExpandedValue, FrontMatter, Iterators, Value};
