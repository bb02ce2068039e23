//! Frontmatter extraction.

use crate::value::{FrontMatter, Value};

/// A source document split into its front matter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Parsed front matter (empty if the file had none)
    pub front_matter: FrontMatter,

    /// Whether the file declared a front matter block at all
    pub has_front_matter: bool,

    /// Content after the front matter block
    pub body: String,
}

/// Errors that can occur when extracting frontmatter.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unclosed frontmatter block - missing closing ---")]
    Unclosed,

    #[error("Invalid YAML in frontmatter: {0}")]
    InvalidYaml(String),

    #[error("Frontmatter must be a mapping, found {0}")]
    NotAMapping(&'static str),
}

/// Split a leading `---` block off a source file and parse it.
///
/// The block opens with a `---` line and closes with the next line that is
/// exactly `---` or `...`. Sources without an opening line are all body.
pub fn extract_frontmatter(source: &str) -> Result<(Option<FrontMatter>, &str), ExtractError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let trimmed = source.trim_start_matches(['\n', '\r']);

    let Some(after_open) = strip_delimiter_line(trimmed, "---") else {
        return Ok((None, source));
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content == "---" || content == "..." {
            let yaml = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            let front_matter = parse_yaml_block(yaml)?;
            return Ok((Some(front_matter), body.trim_start_matches(['\n', '\r'])));
        }
        offset += line.len();
    }

    Err(ExtractError::Unclosed)
}

/// The text after `delimiter` when it fills the whole first line.
fn strip_delimiter_line<'a>(text: &'a str, delimiter: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(delimiter)?;
    let rest = rest.trim_start_matches([' ', '\t']);

    if rest.is_empty() {
        Some(rest)
    } else if let Some(rest) = rest.strip_prefix("\r\n") {
        Some(rest)
    } else {
        rest.strip_prefix('\n')
    }
}

/// Parse a YAML document into a block. An empty document is an empty block.
pub fn parse_yaml_block(yaml: &str) -> Result<FrontMatter, ExtractError> {
    if yaml.trim().is_empty() {
        return Ok(FrontMatter::new());
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| ExtractError::InvalidYaml(e.to_string()))?;

    match Value::from(value) {
        Value::Block(block) => Ok(block),
        Value::Null => Ok(FrontMatter::new()),
        other => Err(ExtractError::NotAMapping(other.type_name())),
    }
}

/// Split a source file into a [`Document`].
pub fn parse_document(source: &str) -> Result<Document, ExtractError> {
    let (front_matter, body) = extract_frontmatter(source)?;

    Ok(Document {
        has_front_matter: front_matter.is_some(),
        front_matter: front_matter.unwrap_or_default(),
        body: body.to_string(),
    })
}
