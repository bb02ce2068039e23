//! Errors raised while evaluating front matter.

/// Errors that can occur when interpolating or expanding front matter.
///
/// `key_path` is the dotted path of the field being evaluated (`permalink`,
/// `meta.title`, `tags[1]`). The file the block came from is attached by the
/// caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrontMatterError {
    #[error("Undefined variable '%{name}' referenced in '{key_path}'")]
    VariableUndefined { name: String, key_path: String },

    #[error("Variable '%{name}' referenced in '{key_path}' has an unsupported type ({found})")]
    UnsupportedVariableType {
        name: String,
        key_path: String,
        found: &'static str,
    },

    #[error("Variable '%{name}' in '{key_path}' exceeds the maximum resolution depth; check for self-referencing variables")]
    RecursionLimit { name: String, key_path: String },

    #[error("Expandable field '{key_path}' must be a string or a list of strings, found {found}")]
    InvalidExpandableValue {
        key_path: String,
        found: &'static str,
    },

    #[error("Front matter nesting at '{key_path}' is too deep")]
    NestingTooDeep { key_path: String },

    #[error("Could not parse date '{value}' in '{key_path}'")]
    InvalidDate { value: String, key_path: String },
}

impl FrontMatterError {
    /// The key path the error originated from.
    pub fn key_path(&self) -> &str {
        match self {
            Self::VariableUndefined { key_path, .. }
            | Self::UnsupportedVariableType { key_path, .. }
            | Self::RecursionLimit { key_path, .. }
            | Self::InvalidExpandableValue { key_path, .. }
            | Self::NestingTooDeep { key_path }
            | Self::InvalidDate { key_path, .. } => key_path,
        }
    }
}
