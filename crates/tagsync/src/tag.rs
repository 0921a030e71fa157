//! Tag codec: the textual identity attribute and its structured form.
//!
//! Grammar: `ts/<uuid>[/<name>(;<name>)*]`, at most [`MAX_TAG_LEN`] bytes.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Every TagSync attribute value starts with this prefix.
pub const TAG_PREFIX: &str = "ts/";

/// Attribute size ceiling imposed by the storage layer.
pub const MAX_TAG_LEN: usize = 250;

const NAME_SEPARATOR: char = ';';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("encoded tag is {len} bytes, limit is {MAX_TAG_LEN}")]
    TooLong { len: usize },

    #[error("invalid tag name '{0}': names must be non-empty and contain no ';' or '/'")]
    InvalidName(String),

    #[error("malformed tag '{0}'")]
    Malformed(String),
}

/// Decoded identity: a UUID plus ordered, de-duplicated group names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub names: Vec<String>,
}

impl Tag {
    /// Fresh identity with a random v4 UUID.
    pub fn generate(names: Vec<String>) -> Result<Self, TagError> {
        Self::new(Uuid::new_v4(), names)
    }

    /// Build a tag, validating names and collapsing duplicates to their first occurrence.
    pub fn new(id: Uuid, names: Vec<String>) -> Result<Self, TagError> {
        let mut tag = Tag {
            id,
            names: Vec::with_capacity(names.len()),
        };
        tag.add_names(names)?;
        Ok(tag)
    }

    /// Encode into the attribute value.
    pub fn encode(&self) -> Result<String, TagError> {
        encode(&self.id, &self.names)
    }

    /// Append names not already present. The id never changes.
    pub fn add_names<I, S>(&mut self, names: I) -> Result<(), TagError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            validate_name(&name)?;
            if !self.names.contains(&name) {
                self.names.push(name);
            }
        }
        Ok(())
    }

    /// Drop the listed names, returning the ones that were actually removed.
    pub fn remove_names(&mut self, names: &[String]) -> Vec<String> {
        let (removed, kept): (Vec<String>, Vec<String>) = std::mem::take(&mut self.names)
            .into_iter()
            .partition(|n| names.contains(n));
        self.names = kept;
        removed
    }

    pub fn clear_names(&mut self) {
        self.names.clear();
    }

    /// True if `filter` is empty or shares at least one name with this tag.
    pub fn matches(&self, filter: &[String]) -> bool {
        filter.is_empty() || self.names.iter().any(|n| filter.contains(n))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TAG_PREFIX, self.id)?;
        if !self.names.is_empty() {
            write!(f, "/{}", self.names.join(";"))?;
        }
        Ok(())
    }
}

/// Encode `(id, names)` into `ts/<id>` or `ts/<id>/<n1;n2...>`.
pub fn encode(id: &Uuid, names: &[String]) -> Result<String, TagError> {
    let mut seen: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        validate_name(name)?;
        if !seen.contains(&name.as_str()) {
            seen.push(name);
        }
    }

    let encoded = if seen.is_empty() {
        format!("{}{}", TAG_PREFIX, id)
    } else {
        format!("{}{}/{}", TAG_PREFIX, id, seen.join(";"))
    };

    if encoded.len() > MAX_TAG_LEN {
        return Err(TagError::TooLong { len: encoded.len() });
    }
    Ok(encoded)
}

/// Decode an attribute value.
///
/// `Ok(None)` means the value is not a TagSync tag at all (no `ts/` prefix).
/// A prefixed value that cannot be parsed is `Err(TagError::Malformed)`.
pub fn decode(raw: &str) -> Result<Option<Tag>, TagError> {
    if !is_tag(raw) {
        return Ok(None);
    }

    let mut parts = raw.splitn(3, '/');
    let _prefix = parts.next();
    let id_part = parts
        .next()
        .ok_or_else(|| TagError::Malformed(raw.to_string()))?;
    let id = Uuid::parse_str(id_part).map_err(|_| TagError::Malformed(raw.to_string()))?;

    let mut names: Vec<String> = Vec::new();
    if let Some(names_part) = parts.next() {
        for name in names_part.split(NAME_SEPARATOR).filter(|n| !n.is_empty()) {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
    }

    Ok(Some(Tag { id, names }))
}

/// True if the value carries the TagSync prefix (well-formed or not).
pub fn is_tag(raw: &str) -> bool {
    raw.starts_with(TAG_PREFIX)
}

/// Match an encoded tag string against a name filter. Non-tags never match.
pub fn matches(raw: &str, filter: &[String]) -> bool {
    match decode(raw) {
        Ok(Some(tag)) => tag.matches(filter),
        _ => false,
    }
}

/// Split a user-supplied name list on `,` or `;`, trimming and dropping empty items.
pub fn parse_name_list(arg: &str) -> Vec<String> {
    arg.split([',', ';'])
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_name(name: &str) -> Result<(), TagError> {
    if name.is_empty() || name.contains(NAME_SEPARATOR) || name.contains('/') {
        return Err(TagError::InvalidName(name.to_string()));
    }
    Ok(())
}
