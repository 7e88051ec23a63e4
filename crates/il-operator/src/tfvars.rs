//! Terraform variable files: rendering inline values and resolving external files.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::VariableResolutionError;
use crate::resource::{ObjectKey, VariableSource};
use crate::source::ExternalSources;
use crate::tracker::TrackerKey;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap());

static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(.*)$").unwrap());

static HEREDOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<-?([A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap());

/// Path reported for errors in inline variables.
const INLINE: &str = "<inline>";

/// The effective variable set of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariables {
    /// Declared variable names, sorted and unique.
    pub names: Vec<String>,
    /// Content of the generated `.tfvars` file.
    pub content: String,
}

/// Renders inline variables as `name = value` lines in key order.
pub fn render_inline(
    variables: &BTreeMap<String, Value>,
) -> Result<String, VariableResolutionError> {
    let mut out = String::new();
    for (name, value) in variables {
        if !IDENTIFIER.is_match(name) {
            return Err(VariableResolutionError::Malformed {
                path: INLINE.to_string(),
                line: 0,
                reason: format!("'{}' is not a valid variable name", name),
            });
        }
        out.push_str(name);
        out.push_str(" = ");
        render_value(value, &mut out);
        out.push('\n');
    }
    Ok(out)
}

fn render_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => render_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_string(key, out);
                out.push_str(": ");
                render_value(item, out);
            }
            out.push('}');
        }
    }
}

/// Quoted HCL string literal for `s`.
pub fn hcl_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    render_string(s, &mut out);
    out
}

/// Template sequences are escaped so values stay literal.
fn render_string(s: &str, out: &mut String) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Checks that `content` is a sequence of top-level `name = value`
/// assignments and returns the names in declaration order.
///
/// This is a structural check (balanced brackets, terminated strings and
/// heredocs, no duplicates), not a full HCL parser.
pub fn parse_variable_names(path: &str, content: &str) -> Result<Vec<String>, VariableResolutionError> {
    let malformed = |line: usize, reason: String| VariableResolutionError::Malformed {
        path: path.to_string(),
        line,
        reason,
    };

    let mut names: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut depth: usize = 0;
    let mut heredoc: Option<String> = None;
    let mut in_comment = false;
    let mut last_line = 0;

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;

        if let Some(marker) = &heredoc {
            if raw.trim() == marker {
                heredoc = None;
            }
            continue;
        }

        let mut line = raw;
        if in_comment {
            match line.find("*/") {
                Some(end) => {
                    in_comment = false;
                    line = &line[end + 2..];
                }
                None => continue,
            }
        }

        let trimmed = line.trim();
        if depth == 0 {
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("/*") {
                match rest.find("*/") {
                    Some(end) if rest[end + 2..].trim().is_empty() => {}
                    Some(_) => {
                        return Err(malformed(line_no, "content after block comment".to_string()))
                    }
                    None => in_comment = true,
                }
                continue;
            }

            let captures = ASSIGNMENT.captures(trimmed).ok_or_else(|| {
                malformed(line_no, "expected a top-level 'name = value' assignment".to_string())
            })?;
            let name = captures[1].to_string();
            let value = captures.get(2).map_or("", |m| m.as_str());
            if value.trim().is_empty() {
                return Err(malformed(line_no, format!("variable '{}' has no value", name)));
            }
            if !seen.insert(name.clone()) {
                return Err(malformed(line_no, format!("variable '{}' is set more than once", name)));
            }
            names.push(name);

            let state = scan(value, depth).map_err(|reason| malformed(line_no, reason))?;
            depth = state.depth;
            heredoc = state.heredoc;
        } else {
            let state = scan(line, depth).map_err(|reason| malformed(line_no, reason))?;
            depth = state.depth;
            heredoc = state.heredoc;
        }
    }

    if heredoc.is_some() {
        return Err(malformed(last_line, "unterminated heredoc".to_string()));
    }
    if depth > 0 {
        return Err(malformed(last_line, "unclosed bracket".to_string()));
    }
    if in_comment {
        return Err(malformed(last_line, "unterminated block comment".to_string()));
    }
    Ok(names)
}

struct ScanState {
    depth: usize,
    heredoc: Option<String>,
}

/// Tracks bracket depth across one line of an expression.
fn scan(text: &str, mut depth: usize) -> Result<ScanState, String> {
    let mut in_string = false;
    let mut escaped = false;
    let mut prev = '\0';
    let mut code_end = text.len();

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            prev = c;
            continue;
        }

        match c {
            '"' => in_string = true,
            '#' => {
                code_end = i;
                break;
            }
            '/' if prev == '/' => {
                code_end = i - 1;
                break;
            }
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced '{}'", c))?;
            }
            _ => {}
        }
        prev = c;
    }

    if in_string {
        return Err("unterminated string".to_string());
    }

    let heredoc = HEREDOC
        .captures(&text[..code_end])
        .map(|captures| captures[1].to_string());
    Ok(ScanState { depth, heredoc })
}

/// Produces the variable set of a component from inline values or an
/// external file.
pub struct TfvarsResolver<'a> {
    sources: &'a ExternalSources,
}

impl<'a> TfvarsResolver<'a> {
    pub fn new(sources: &'a ExternalSources) -> Self {
        Self { sources }
    }

    /// Resolves `source` on behalf of `object`.
    ///
    /// File sources are read at the current remote revision; whether a fetch
    /// was needed never affects the result.
    pub async fn resolve(
        &self,
        object: &ObjectKey,
        source: VariableSource<'_>,
    ) -> Result<ResolvedVariables, VariableResolutionError> {
        match source {
            VariableSource::Inline(variables) => Ok(ResolvedVariables {
                names: variables.keys().cloned().collect(),
                content: render_inline(variables)?,
            }),
            VariableSource::File(file) => {
                let key = TrackerKey::new(object.clone(), &file.source, &file.path)
                    .at(file.reference.as_deref());
                let external = self
                    .sources
                    .read_file(&key)
                    .await?;

                let mut names = parse_variable_names(&file.path, &external.content)?;
                names.sort();
                log::debug!(
                    "Read {} variables from {}:{} at {}",
                    names.len(),
                    file.source,
                    file.path,
                    external.revision
                );
                Ok(ResolvedVariables {
                    names,
                    content: external.content,
                })
            }
        }
    }
}
