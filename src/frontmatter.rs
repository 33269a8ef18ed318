use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use tracing::debug;

// ---- Types ----

/// A single front-matter value: a scalar or a sequence of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontMatterValue {
    Text(String),
    List(Vec<String>),
}

/// The metadata block at the top of a note, keyed by field name.
///
/// Keys are kept sorted, so a rewritten block is stable across saves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontMatter(BTreeMap<String, FrontMatterValue>);

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&FrontMatterValue> {
        self.0.get(key)
    }

    /// Scalar value for `key`. Empty strings count as absent.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(FrontMatterValue::Text(text)) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    /// Sequence value for `key`. A scalar is read as a one-item sequence.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(FrontMatterValue::List(items)) => items.clone(),
            Some(FrontMatterValue::Text(text)) if !text.is_empty() => vec![text.clone()],
            _ => Vec::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FrontMatterValue) {
        self.0.insert(key.into(), value);
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, FrontMatterValue::Text(value.into()));
    }

    pub fn set_list(&mut self, key: impl Into<String>, items: Vec<String>) {
        self.insert(key, FrontMatterValue::List(items));
    }

    pub fn remove(&mut self, key: &str) -> Option<FrontMatterValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FrontMatterValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, FrontMatterValue)> for FrontMatter {
    fn from_iter<I: IntoIterator<Item = (String, FrontMatterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of splitting a raw note into metadata and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub metadata: FrontMatter,
    pub body: String,
}

// ---- Decoding ----

/// Split a raw note into its front matter and body.
///
/// Never fails: text without a complete `---` block comes back as the
/// body with empty metadata.
pub fn decode(raw: &str) -> Decoded {
    match split_block(raw) {
        Some((block, body)) => Decoded {
            metadata: parse_block(block),
            body: body.to_string(),
        },
        None => Decoded {
            metadata: FrontMatter::new(),
            body: raw.to_string(),
        },
    }
}

/// Locate the block between the opening `---` line and the next `---` line.
/// Returns (block, body).
fn split_block(raw: &str) -> Option<(&str, &str)> {
    let rest = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_block(block: &str) -> FrontMatter {
    if block.trim().is_empty() {
        return FrontMatter::new();
    }

    match serde_yaml::from_str::<serde_yaml::Mapping>(block) {
        Ok(mapping) => from_mapping(mapping),
        Err(e) => {
            debug!(error = %e, "front matter is not strict YAML, reading it line by line");
            parse_lines(block)
        }
    }
}

fn from_mapping(mapping: serde_yaml::Mapping) -> FrontMatter {
    let mut metadata = FrontMatter::new();
    for (key, value) in mapping {
        let Some(key) = scalar_text(&key) else {
            continue;
        };
        match value {
            // `key:` with nothing after it opens an (empty) sequence
            YamlValue::Null => metadata.set_list(key, Vec::new()),
            YamlValue::Sequence(items) => {
                metadata.set_list(key, items.iter().filter_map(scalar_text).collect())
            }
            other => match scalar_text(&other) {
                Some(text) => metadata.set_text(key, text),
                None => debug!(key = %key, "skipping nested front matter value"),
            },
        }
    }
    metadata
}

fn scalar_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Tagged(tagged) => scalar_text(&tagged.value),
        YamlValue::Null | YamlValue::Sequence(_) | YamlValue::Mapping(_) => None,
    }
}

/// Lenient reader for blocks YAML rejects: `key: value` scalars, and
/// `key:` followed by indented `- item` lines.
fn parse_lines(block: &str) -> FrontMatter {
    let mut metadata = FrontMatter::new();
    let mut open_list: Option<String> = None;

    for line in block.lines() {
        let indented = line.starts_with([' ', '\t']);
        let trimmed = line.trim();

        if indented {
            if let (Some(key), Some(item)) = (open_list.as_ref(), trimmed.strip_prefix('-')) {
                let item = unquote(item.trim());
                if let Some(FrontMatterValue::List(items)) = metadata.0.get_mut(key) {
                    items.push(item.to_string());
                }
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = value.trim();
        if value.is_empty() {
            metadata.set_list(key, Vec::new());
            open_list = Some(key.to_string());
        } else {
            metadata.set_text(key, unquote(value));
            open_list = None;
        }
    }

    metadata
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ---- Encoding ----

/// Serialize `metadata` as a `---` block followed by `body` verbatim.
pub fn encode(body: &str, metadata: &FrontMatter) -> String {
    let mut out = String::from("---\n");
    for (key, value) in metadata.iter() {
        let key = yaml_scalar(key);
        match value {
            FrontMatterValue::Text(text) => {
                out.push_str(&format!("{}: {}\n", key, yaml_scalar(text)));
            }
            FrontMatterValue::List(items) => {
                out.push_str(&format!("{}:\n", key));
                for item in items {
                    out.push_str(&format!("  - {}\n", yaml_scalar(item)));
                }
            }
        }
    }
    out.push_str("---\n");
    out.push_str(body);
    out
}

/// Render a string as a single-line YAML scalar, quoting only when a
/// plain scalar would read back as something else.
fn yaml_scalar(text: &str) -> String {
    if text.chars().any(needs_escape) {
        return double_quoted(text);
    }
    serde_yaml::to_string(text)
        .map(|s| s.trim_end_matches('\n').to_string())
        .unwrap_or_else(|_| double_quoted(text))
}

/// Characters a YAML reader would fold, reject or normalize if written raw.
fn needs_escape(c: char) -> bool {
    c.is_control() || matches!(c, '\u{2028}' | '\u{2029}' | '\u{feff}')
}

/// YAML double-quoted scalar with every non-printable character escaped.
fn double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if needs_escape(c) => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ---- Tests ----
