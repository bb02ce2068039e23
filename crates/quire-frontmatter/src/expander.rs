//! Variable interpolation and value expansion.
//!
//! A `%name` token inside a front matter string is replaced by the value of the
//! sibling key `name`. Expandable fields (by default only `permalink`) may also
//! reference array-typed siblings, in which case the field turns into one
//! [`ExpandedValue`] per array element, each recording the binding that
//! produced it. Several array references compose as a cartesian product.
//!
//! ```text
//! meals: [breakfast, lunch]          permalink:
//! permalink: /menu/%meals/     =>      - /menu/breakfast/  {meals: breakfast}
//!                                      - /menu/lunch/      {meals: lunch}
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::FrontMatterError;
use crate::value::{ExpandedValue, FrontMatter, Iterators, Value};

/// Fields that are always expandable.
pub const DEFAULT_EXPANDABLE_FIELDS: &[&str] = &["permalink"];

/// Maximum block nesting and variable resolution depth.
pub const MAX_DEPTH: usize = 32;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\?)%([A-Za-z]+)").expect("Invalid variable regex"));

/// A piece of a front matter string.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment<'a> {
    /// Literal text, with escapes already stripped
    Text(&'a str),
    /// A `%name` reference
    Variable(&'a str),
}

/// Split a string into literal text and variable references.
///
/// `\%name` is literal text and is emitted as `%name`.
fn tokenize(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in VARIABLE_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };

        if whole.start() > last {
            segments.push(Segment::Text(&text[last..whole.start()]));
        }

        let escaped = caps.get(1).is_some_and(|m| !m.is_empty());
        if escaped {
            segments.push(Segment::Text(&text[whole.start() + 1..whole.end()]));
        } else {
            segments.push(Segment::Variable(name.as_str()));
        }

        last = whole.end();
    }

    if last < text.len() {
        segments.push(Segment::Text(&text[last..]));
    }

    segments
}

/// Names of all unescaped variables referenced by a string, in order of appearance.
pub fn referenced_variables(text: &str) -> Vec<&str> {
    tokenize(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name),
            Segment::Text(_) => None,
        })
        .collect()
}

/// A piece of an expandable statement after scalar substitution.
#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    /// Reference to an array sibling, filled in per element
    Iterate(String),
}

/// Dotted path to the field being evaluated, for diagnostics.
#[derive(Debug, Default)]
struct KeyPath(Vec<String>);

impl KeyPath {
    fn push(&mut self, key: &str) {
        self.0.push(key.to_string());
    }

    fn push_index(&mut self, index: usize) {
        self.0.push(format!("[{}]", index));
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn render(&self) -> String {
        let mut rendered = String::new();
        for segment in &self.0 {
            if !rendered.is_empty() && !segment.starts_with('[') {
                rendered.push('.');
            }
            rendered.push_str(segment);
        }
        rendered
    }
}

/// Front matter interpolation and expansion engine.
#[derive(Debug, Clone)]
pub struct Expander {
    expandable: HashSet<String>,
    expansion_used: bool,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    /// Create an expander with the default expandable fields.
    pub fn new() -> Self {
        Self::with_expandable_fields(std::iter::empty::<String>())
    }

    /// Create an expander with additional expandable fields.
    ///
    /// `permalink` stays expandable regardless of `fields`.
    pub fn with_expandable_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut expandable: HashSet<String> = DEFAULT_EXPANDABLE_FIELDS
            .iter()
            .map(|field| field.to_string())
            .collect();
        expandable.extend(fields.into_iter().map(Into::into));

        Self {
            expandable,
            expansion_used: false,
        }
    }

    /// Whether `key` is treated as an expandable field.
    pub fn is_expandable(&self, key: &str) -> bool {
        self.expandable.contains(key)
    }

    /// Whether the last call to [`Expander::expand`] iterated over an array.
    pub fn has_expansion(&self) -> bool {
        self.expansion_used
    }

    /// Evaluate a block, returning the interpolated and expanded copy.
    ///
    /// Expandable fields become [`Value::Expanded`]; everything else keeps its
    /// shape with variables substituted. On error nothing is returned, so a
    /// partially evaluated block is never observable.
    pub fn expand(&mut self, block: &FrontMatter) -> Result<FrontMatter, FrontMatterError> {
        self.expansion_used = false;

        let mut path = KeyPath::default();
        let result = self.expand_block(block, &mut path, 0);

        if result.is_err() {
            self.expansion_used = false;
        }

        result
    }

    fn expand_block(
        &mut self,
        scope: &FrontMatter,
        path: &mut KeyPath,
        depth: usize,
    ) -> Result<FrontMatter, FrontMatterError> {
        if depth > MAX_DEPTH {
            return Err(FrontMatterError::NestingTooDeep {
                key_path: path.render(),
            });
        }

        let mut evaluated = FrontMatter::new();

        for (key, value) in scope {
            path.push(key);

            let result = match value {
                Value::Expanded(_) => Ok(value.clone()),
                // Only top-level fields expand
                _ if depth == 0 && self.is_expandable(key) => {
                    self.expand_field(scope, value, path).map(Value::Expanded)
                }
                Value::String(text) => self.interpolate(scope, text, path, 0).map(Value::String),
                Value::List(items) => self
                    .interpolate_list(scope, items, path, depth)
                    .map(Value::List),
                Value::Block(nested) => self
                    .expand_block(nested, path, depth + 1)
                    .map(Value::Block),
                other => Ok(other.clone()),
            };

            path.pop();
            evaluated.insert(key.clone(), result?);
        }

        Ok(evaluated)
    }

    /// Interpolate strings inside a list; lists do not open a new scope.
    fn interpolate_list(
        &mut self,
        scope: &FrontMatter,
        items: &[Value],
        path: &mut KeyPath,
        depth: usize,
    ) -> Result<Vec<Value>, FrontMatterError> {
        if depth > MAX_DEPTH {
            return Err(FrontMatterError::NestingTooDeep {
                key_path: path.render(),
            });
        }

        let mut evaluated = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            path.push_index(index);

            let result = match item {
                Value::String(text) => self.interpolate(scope, text, path, 0).map(Value::String),
                Value::List(nested) => self
                    .interpolate_list(scope, nested, path, depth + 1)
                    .map(Value::List),
                Value::Block(nested) => self
                    .expand_block(nested, path, depth + 1)
                    .map(Value::Block),
                other => Ok(other.clone()),
            };

            path.pop();
            evaluated.push(result?);
        }

        Ok(evaluated)
    }

    /// Strict substitution of every variable in `text`.
    fn interpolate(
        &self,
        scope: &FrontMatter,
        text: &str,
        path: &KeyPath,
        depth: usize,
    ) -> Result<String, FrontMatterError> {
        let mut output = String::with_capacity(text.len());

        for segment in tokenize(text) {
            match segment {
                Segment::Text(literal) => output.push_str(literal),
                Segment::Variable(name) => {
                    output.push_str(&self.resolve(scope, name, path, depth)?);
                }
            }
        }

        Ok(output)
    }

    /// Resolve one variable to its interpolated text.
    fn resolve(
        &self,
        scope: &FrontMatter,
        name: &str,
        path: &KeyPath,
        depth: usize,
    ) -> Result<String, FrontMatterError> {
        if depth >= MAX_DEPTH {
            return Err(FrontMatterError::RecursionLimit {
                name: name.to_string(),
                key_path: path.render(),
            });
        }

        let value = scope
            .get(name)
            .ok_or_else(|| FrontMatterError::VariableUndefined {
                name: name.to_string(),
                key_path: path.render(),
            })?;

        match value {
            // referenced strings may carry variables of their own
            Value::String(text) => self.interpolate(scope, text, path, depth + 1),
            other => other
                .interpolated()
                .ok_or_else(|| FrontMatterError::UnsupportedVariableType {
                    name: name.to_string(),
                    key_path: path.render(),
                    found: other.type_name(),
                }),
        }
    }

    /// Turn an expandable field into its list of expanded values.
    fn expand_field(
        &mut self,
        scope: &FrontMatter,
        value: &Value,
        path: &mut KeyPath,
    ) -> Result<Vec<ExpandedValue>, FrontMatterError> {
        let statements = match value {
            Value::List(items) => {
                let mut statements = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push_index(index);
                    let statement = statement_text(item, path);
                    path.pop();
                    statements.push(statement?);
                }
                statements
            }
            other => vec![statement_text(other, path)?],
        };

        let templates = statements
            .iter()
            .map(|statement| self.template_parts(scope, statement, path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut variables: Vec<&str> = Vec::new();
        for part in templates.iter().flatten() {
            if let Part::Iterate(name) = part {
                if !variables.contains(&name.as_str()) {
                    variables.push(name);
                }
            }
        }

        let mut candidates: Vec<(usize, Iterators)> = (0..templates.len())
            .map(|index| (index, Iterators::new()))
            .collect();

        for name in variables {
            let elements = expansion_elements(scope, name, path)?;
            self.expansion_used = true;

            let mut next = Vec::with_capacity(candidates.len() * elements.len());
            for (index, iterators) in &candidates {
                for element in elements {
                    let mut bound = iterators.clone();
                    bound.insert(name.to_string(), element.clone());
                    next.push((*index, bound));
                }
            }
            candidates = next;
        }

        Ok(candidates
            .into_iter()
            .map(|(index, iterators)| ExpandedValue {
                evaluated: render_parts(&templates[index], &iterators),
                iterators,
            })
            .collect())
    }

    /// Substitute scalar references and keep array references for expansion.
    fn template_parts(
        &self,
        scope: &FrontMatter,
        statement: &str,
        path: &KeyPath,
    ) -> Result<Vec<Part>, FrontMatterError> {
        let mut parts = Vec::new();

        for segment in tokenize(statement) {
            let part = match segment {
                Segment::Text(literal) => Part::Literal(literal.to_string()),
                Segment::Variable(name) => match scope.get(name) {
                    Some(Value::List(_)) => Part::Iterate(name.to_string()),
                    // a boolean would be left as an unresolved token
                    Some(Value::Bool(_)) => {
                        return Err(FrontMatterError::UnsupportedVariableType {
                            name: name.to_string(),
                            key_path: path.render(),
                            found: "boolean",
                        });
                    }
                    _ => Part::Literal(self.resolve(scope, name, path, 0)?),
                },
            };
            parts.push(part);
        }

        Ok(parts)
    }
}

/// The raw text of one candidate statement of an expandable field.
fn statement_text(value: &Value, path: &KeyPath) -> Result<String, FrontMatterError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Integer(_) | Value::Float(_) | Value::Null => Ok(value.interpolated().unwrap_or_default()),
        other => Err(FrontMatterError::InvalidExpandableValue {
            key_path: path.render(),
            found: other.type_name(),
        }),
    }
}

/// The elements of an array referenced at an expansion site; must be flat.
fn expansion_elements<'a>(
    scope: &'a FrontMatter,
    name: &str,
    path: &KeyPath,
) -> Result<&'a [Value], FrontMatterError> {
    let unsupported = |found: &'static str| FrontMatterError::UnsupportedVariableType {
        name: name.to_string(),
        key_path: path.render(),
        found,
    };

    let elements = match scope.get(name) {
        Some(Value::List(elements)) => elements,
        Some(other) => return Err(unsupported(other.type_name())),
        None => {
            return Err(FrontMatterError::VariableUndefined {
                name: name.to_string(),
                key_path: path.render(),
            });
        }
    };

    for element in elements {
        match element {
            Value::List(_) | Value::Block(_) => return Err(unsupported("multidimensional array")),
            Value::Bool(_) => return Err(unsupported("boolean")),
            Value::Expanded(_) => return Err(unsupported(element.type_name())),
            _ => {}
        }
    }

    Ok(elements)
}

fn render_parts(parts: &[Part], iterators: &Iterators) -> String {
    let mut rendered = String::new();
    for part in parts {
        match part {
            Part::Literal(text) => rendered.push_str(text),
            Part::Iterate(name) => {
                let value = iterators
                    .get(name)
                    .and_then(Value::interpolated)
                    .unwrap_or_default();
                rendered.push_str(&value);
            }
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(yaml: &str) -> FrontMatter {
        FrontMatter::from_mapping(serde_yaml::from_str(yaml).unwrap())
    }

    fn expanded<'a>(fm: &'a FrontMatter, key: &str) -> &'a [ExpandedValue] {
        fm.get(key).and_then(Value::as_expanded).unwrap()
    }

    fn evaluated(values: &[ExpandedValue]) -> Vec<&str> {
        values.iter().map(|v| v.evaluated.as_str()).collect()
    }

    #[test]
    fn tokenizes_variables_and_escapes() {
        assert_eq!(
            tokenize("/blog/%year/\\%raw-%a1"),
            vec![
                Segment::Text("/blog/"),
                Segment::Variable("year"),
                Segment::Text("/"),
                Segment::Text("%raw"),
                Segment::Text("-"),
                Segment::Variable("a"),
                Segment::Text("1"),
            ]
        );
        assert_eq!(referenced_variables("%fname %lname \\%not"), vec!["fname", "lname"]);
    }

    #[test]
    fn block_without_tokens_is_unchanged() {
        let fm = block("title: Hello\ncount: 3\ndraft: false\ntags: [a, b]\nmeta:\n  x: y\n");

        let mut expander = Expander::new();
        let result = expander.expand(&fm).unwrap();

        assert_eq!(result, fm);
        assert!(!expander.has_expansion());
    }

    #[test]
    fn escaped_token_is_kept_literally() {
        let fm = block("notavar: nope\ntext: 'costs 5 \\%notavar'\n");

        let result = Expander::new().expand(&fm).unwrap();

        assert_eq!(result.get_str("text"), Some("costs 5 %notavar"));
    }

    #[test]
    fn interpolates_sibling_values() {
        let fm = block("fname: Jane\nlname: Doe\nname: '%fname %lname'\n");

        let result = Expander::new().expand(&fm).unwrap();

        assert_eq!(result.get_str("name"), Some("Jane Doe"));
    }

    #[test]
    fn resolves_chained_references() {
        let fm = block("greeting: 'Hi %name'\nname: '%fname'\nfname: Jane\n");

        let result = Expander::new().expand(&fm).unwrap();

        assert_eq!(result.get_str("greeting"), Some("Hi Jane"));
    }

    #[test]
    fn interpolates_numbers() {
        let fm = block("year: 2016\nversion: 1.5\nlabel: 'v%version (%year)'\n");

        let result = Expander::new().expand(&fm).unwrap();

        assert_eq!(result.get_str("label"), Some("v1.5 (2016)"));
    }

    #[test]
    fn permalink_without_arrays_does_not_expand() {
        let fm = block(
            "year: '2016'\nmonth: '01'\nday: '01'\ntitle: recap\npermalink: /blog/%year/%month/%day/%title\n",
        );

        let mut expander = Expander::new();
        let result = expander.expand(&fm).unwrap();

        assert!(!expander.has_expansion());
        assert_eq!(
            expanded(&result, "permalink"),
            &[ExpandedValue::literal("/blog/2016/01/01/recap")]
        );
    }

    #[test]
    fn literal_permalink_list_keeps_order() {
        let fm = block("permalink: [/canonical/, /redirect/, /redirect-me/]\n");

        let mut expander = Expander::new();
        let result = expander.expand(&fm).unwrap();

        assert!(!expander.has_expansion());
        assert_eq!(
            evaluated(expanded(&result, "permalink")),
            vec!["/canonical/", "/redirect/", "/redirect-me/"]
        );
    }

    #[test]
    fn expands_array_references() {
        let fm = block("meals: [breakfast, lunch, dinner]\npermalink: /menu/%meals/\n");

        let mut expander = Expander::new();
        let result = expander.expand(&fm).unwrap();
        let values = expanded(&result, "permalink");

        assert!(expander.has_expansion());
        assert_eq!(
            evaluated(values),
            vec!["/menu/breakfast/", "/menu/lunch/", "/menu/dinner/"]
        );
        for (value, meal) in values.iter().zip(["breakfast", "lunch", "dinner"]) {
            assert_eq!(value.iterators.len(), 1);
            assert_eq!(value.iterators.get("meals"), Some(&Value::from(meal)));
        }
    }

    #[test]
    fn multiple_arrays_form_a_cartesian_product() {
        let fm = block("lang: [en, fr]\nsize: [1, 2]\nsection: docs\npermalink: /%section/%lang/%size/\n");

        let mut expander = Expander::new();
        let result = expander.expand(&fm).unwrap();
        let values = expanded(&result, "permalink");

        assert_eq!(
            evaluated(values),
            vec!["/docs/en/1/", "/docs/en/2/", "/docs/fr/1/", "/docs/fr/2/"]
        );
        assert_eq!(values[1].iterators.get("lang"), Some(&Value::from("en")));
        assert_eq!(values[1].iterators.get("size"), Some(&Value::Integer(2)));
    }

    #[test]
    fn statement_order_is_outer_loop() {
        let fm = block("meals: [lunch, dinner]\npermalink: [/menu/%meals/, /old/%meals.html]\n");

        let result = Expander::new().expand(&fm).unwrap();

        assert_eq!(
            evaluated(expanded(&result, "permalink")),
            vec![
                "/menu/lunch/",
                "/menu/dinner/",
                "/old/lunch.html",
                "/old/dinner.html"
            ]
        );
    }

    #[test]
    fn undefined_variable_reports_key() {
        let fm = block("var: '%foobar'\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert_eq!(
            err,
            FrontMatterError::VariableUndefined {
                name: "foobar".to_string(),
                key_path: "var".to_string(),
            }
        );
    }

    #[test]
    fn nested_blocks_do_not_see_parent_scope() {
        let fm = block("title: Outer\nmeta:\n  label: '%title'\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert_eq!(err.key_path(), "meta.label");
        assert!(matches!(err, FrontMatterError::VariableUndefined { .. }));
    }

    #[test]
    fn nested_blocks_resolve_their_own_keys() {
        let fm = block("meta:\n  title: Inner\n  label: 'about %title'\n");

        let result = Expander::new().expand(&fm).unwrap();
        let meta = result.get("meta").and_then(Value::as_block).unwrap();

        assert_eq!(meta.get_str("label"), Some("about Inner"));
    }

    #[test]
    fn nested_permalink_is_a_plain_field() {
        let fm = block("meta:\n  a: b\n  permalink: /x/%a\n");

        let mut expander = Expander::new();
        let result = expander.expand(&fm).unwrap();
        let meta = result.get("meta").and_then(Value::as_block).unwrap();

        assert_eq!(meta.get("permalink"), Some(&Value::String("/x/b".into())));
        assert!(!expander.has_expansion());

        let fm = block("meta:\n  a: [1, 2]\n  permalink: /x/%a\n");
        let err = expander.expand(&fm).unwrap_err();

        assert_eq!(err.key_path(), "meta.permalink");
        assert!(matches!(err, FrontMatterError::UnsupportedVariableType { .. }));
        assert!(!expander.has_expansion());
    }

    #[test]
    fn list_elements_are_interpolated() {
        let fm = block("name: quire\ntags: ['%name', static, '%missing']\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert_eq!(err.key_path(), "tags[2]");
    }

    #[test]
    fn multidimensional_array_is_rejected() {
        let fm = block("a: [[1, 2]]\npermalink: /x/%a\n");

        let mut expander = Expander::new();
        let err = expander.expand(&fm).unwrap_err();

        assert!(matches!(
            err,
            FrontMatterError::UnsupportedVariableType { ref name, .. } if name == "a"
        ));
        assert!(!expander.has_expansion());
    }

    #[test]
    fn array_in_plain_field_is_rejected() {
        let fm = block("tags: [a, b]\ntitle: '%tags'\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert_eq!(
            err,
            FrontMatterError::UnsupportedVariableType {
                name: "tags".to_string(),
                key_path: "title".to_string(),
                found: "array",
            }
        );
    }

    #[test]
    fn boolean_in_expandable_field_is_rejected() {
        let fm = block("draft: true\npermalink: /%draft/\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert!(matches!(
            err,
            FrontMatterError::UnsupportedVariableType { found: "boolean", .. }
        ));
    }

    #[test]
    fn self_reference_hits_recursion_limit() {
        let fm = block("a: '%b'\nb: '%a'\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert!(matches!(err, FrontMatterError::RecursionLimit { .. }));
        assert_eq!(err.key_path(), "a");
    }

    #[test]
    fn custom_expandable_fields() {
        let fm = block("langs: [en, de]\nredirect_from: /old/%langs/\n");

        let mut expander = Expander::with_expandable_fields(["redirect_from"]);
        let result = expander.expand(&fm).unwrap();

        assert!(expander.is_expandable("permalink"));
        assert!(expander.has_expansion());
        assert_eq!(
            evaluated(expanded(&result, "redirect_from")),
            vec!["/old/en/", "/old/de/"]
        );
    }

    #[test]
    fn expandable_map_value_is_rejected() {
        let fm = block("permalink:\n  path: /x/\n");

        let err = Expander::new().expand(&fm).unwrap_err();

        assert!(matches!(
            err,
            FrontMatterError::InvalidExpandableValue { found: "map", .. }
        ));
    }

    #[test]
    fn has_expansion_resets_between_runs() {
        let mut expander = Expander::new();

        expander
            .expand(&block("x: [1, 2]\npermalink: /%x/\n"))
            .unwrap();
        assert!(expander.has_expansion());

        expander.expand(&block("permalink: /plain/\n")).unwrap();
        assert!(!expander.has_expansion());
    }
}
