use std::fmt;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// Pseudo-column binding the time to live of written rows.
pub const TTL_COLUMN: &str = "__ttl";
/// Pseudo-column binding the write timestamp of statements.
pub const TIMESTAMP_COLUMN: &str = "__timestamp";

/// Part of a record a field path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSource {
    Key,
    Value,
    Header,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::Key => "key",
            FieldSource::Value => "value",
            FieldSource::Header => "header",
        }
    }
}

/// Dotted address of a record field, such as `value.address.city` or `header.trace`.
///
/// An empty path addresses the whole key or value payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub source: FieldSource,
    pub segments: Vec<String>,
}

impl FieldPath {
    pub fn new(source: FieldSource, segments: Vec<String>) -> Self {
        Self { source, segments }
    }

    /// Parses a path whose first segment is `key`, `value` or `header`.
    pub fn parse(text: &str) -> SinkResult<Self> {
        let mut segments = split_unquoted(text.trim(), '.')?
            .into_iter()
            .map(|segment| unquote(segment.trim()))
            .collect::<SinkResult<Vec<_>>>()?;

        if segments.iter().any(String::is_empty) {
            bail!(
                ErrorKind::InvalidMapping,
                "Invalid field path",
                format!("`{text}` contains an empty segment")
            );
        }

        let source = match segments.first().map(String::as_str) {
            Some("key") => FieldSource::Key,
            Some("value") => FieldSource::Value,
            Some("header") => FieldSource::Header,
            _ => bail!(
                ErrorKind::InvalidMapping,
                "Invalid field path",
                format!("`{text}` must start with `key`, `value` or `header`")
            ),
        };
        segments.remove(0);

        if source == FieldSource::Header && segments.len() != 1 {
            bail!(
                ErrorKind::InvalidMapping,
                "Invalid field path",
                format!("`{text}` must name exactly one header")
            );
        }

        Ok(Self { source, segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source.as_str())?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// What a mapped column is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingTarget {
    Field(FieldPath),
    /// A function call such as `now()`, written into the statement text as is.
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub column: String,
    pub target: MappingTarget,
}

/// Column to field associations of one table, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<MappingEntry>,
}

impl FieldMapping {
    /// Parses a `column=target` list such as `id=key, name=value.name, written=now()`.
    ///
    /// Unquoted column names are case-insensitive and stored in lower case; quoted names
    /// (`"Name"`) are kept verbatim.
    pub fn parse(text: &str) -> SinkResult<Self> {
        let mut entries: Vec<MappingEntry> = Vec::new();

        for entry in split_unquoted(text, ',')? {
            let entry = entry.trim();
            let Some((column, target)) = split_once_unquoted(entry, '=') else {
                bail!(
                    ErrorKind::InvalidMapping,
                    "Invalid mapping entry",
                    format!("`{entry}` is not a `column=field` pair")
                );
            };

            let column = parse_column(column.trim())?;
            if entries.iter().any(|existing| existing.column == column) {
                bail!(
                    ErrorKind::InvalidMapping,
                    "Duplicate mapped column",
                    format!("column `{column}` is mapped more than once")
                );
            }

            let target = parse_target(target.trim())?;
            if matches!(target, MappingTarget::Function(_))
                && (column == TTL_COLUMN || column == TIMESTAMP_COLUMN)
            {
                bail!(
                    ErrorKind::InvalidMapping,
                    "Invalid mapping entry",
                    format!("`{column}` must be mapped to a record field")
                );
            }

            entries.push(MappingEntry { column, target });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn get(&self, column: &str) -> Option<&MappingTarget> {
        self.entries
            .iter()
            .find(|entry| entry.column == column)
            .map(|entry| &entry.target)
    }

    /// Returns the entries bound to record fields, excluding pseudo-columns.
    pub fn field_entries(&self) -> impl Iterator<Item = (&str, &FieldPath)> {
        self.entries.iter().filter_map(|entry| match &entry.target {
            MappingTarget::Field(path) if !is_pseudo_column(&entry.column) => {
                Some((entry.column.as_str(), path))
            }
            _ => None,
        })
    }

    pub fn function_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|entry| match &entry.target {
            MappingTarget::Function(function) => Some((entry.column.as_str(), function.as_str())),
            MappingTarget::Field(_) => None,
        })
    }

    pub fn ttl_field(&self) -> Option<&FieldPath> {
        match self.get(TTL_COLUMN) {
            Some(MappingTarget::Field(path)) => Some(path),
            _ => None,
        }
    }

    pub fn timestamp_field(&self) -> Option<&FieldPath> {
        match self.get(TIMESTAMP_COLUMN) {
            Some(MappingTarget::Field(path)) => Some(path),
            _ => None,
        }
    }
}

pub fn is_pseudo_column(column: &str) -> bool {
    column == TTL_COLUMN || column == TIMESTAMP_COLUMN
}

fn parse_column(text: &str) -> SinkResult<String> {
    if text.is_empty() {
        bail!(ErrorKind::InvalidMapping, "Invalid mapping entry", "empty column name");
    }

    if text.starts_with('"') {
        unquote(text)
    } else {
        Ok(text.to_lowercase())
    }
}

fn parse_target(text: &str) -> SinkResult<MappingTarget> {
    if let Some(name) = text.strip_suffix("()") {
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            bail!(
                ErrorKind::InvalidMapping,
                "Invalid function",
                format!("`{text}` is not a function call")
            );
        }
        return Ok(MappingTarget::Function(text.to_string()));
    }

    if text.is_empty() {
        bail!(ErrorKind::InvalidMapping, "Invalid mapping entry", "empty field path");
    }

    Ok(MappingTarget::Field(FieldPath::parse(text)?))
}

/// Removes the quotes of a `"quoted"` identifier, where `""` stands for one quote.
fn unquote(text: &str) -> SinkResult<String> {
    let Some(inner) = text.strip_prefix('"') else {
        return Ok(text.to_string());
    };

    let Some(inner) = inner.strip_suffix('"') else {
        bail!(
            ErrorKind::InvalidMapping,
            "Invalid quoted identifier",
            format!("`{text}` has no closing quote")
        );
    };

    Ok(inner.replace("\"\"", "\""))
}

/// Splits on a separator outside of double quotes.
fn split_unquoted(text: &str, separator: char) -> SinkResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;

    for (index, ch) in text.char_indices() {
        if ch == '"' {
            quoted = !quoted;
        } else if ch == separator && !quoted {
            parts.push(&text[start..index]);
            start = index + ch.len_utf8();
        }
    }

    if quoted {
        bail!(
            ErrorKind::InvalidMapping,
            "Invalid quoted identifier",
            format!("`{text}` has an unbalanced quote")
        );
    }

    parts.push(&text[start..]);
    Ok(parts)
}

fn split_once_unquoted(text: &str, separator: char) -> Option<(&str, &str)> {
    let mut quoted = false;
    for (index, ch) in text.char_indices() {
        if ch == '"' {
            quoted = !quoted;
        } else if ch == separator && !quoted {
            return Some((&text[..index], &text[index + ch.len_utf8()..]));
        }
    }
    None
}
