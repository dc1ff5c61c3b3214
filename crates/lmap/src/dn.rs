//! Distinguished name handling for directory entries.
//!
//! Entries are addressed by a [`DistinguishedName`]; the first component is the entry's
//! relative name (RDN), the rest is the parent's name. Children caches are keyed by the
//! canonical string form of the RDN so lookups do not depend on incidental whitespace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use lmap_core::Error as CoreError;

/// Reasons a distinguished name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// Nothing but whitespace.
    #[error("empty distinguished name")]
    Empty,
    /// A component is empty or has no `=`.
    #[error("malformed name component `{0}`")]
    InvalidComponent(String),
    /// Nothing before the `=`.
    #[error("no attribute type in `{0}`")]
    MissingAttribute(String),
    /// Nothing after the `=`.
    #[error("no value for attribute `{0}`")]
    MissingValue(String),
    /// Trailing backslash.
    #[error("dangling escape at end of name")]
    UnterminatedEscape,
    /// A hex escape without two hex digits, or hex bytes that are not UTF-8.
    #[error("invalid escape sequence in `{0}`")]
    InvalidEscape(String),
    /// A relative name was expected but several components were given.
    #[error("expected a single relative name, got `{0}`")]
    NotRelative(String),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// One attribute/value pair of a relative distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Pairs `attribute` with an unescaped `value`.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion of the RDN (e.g. `ou`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Attribute value portion of the RDN (unescaped).
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Attribute types compare without regard to ASCII case.
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Strongly-typed distinguished name.
///
/// Keeps a canonical string next to the parsed components. Parsing is strict so malformed
/// names are rejected before they reach the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses `input` and normalises whitespace around separators.
    ///
    /// # Errors
    ///
    /// Fails on empty input, empty components, missing `=` parts and dangling escapes.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = split_unescaped(raw, ',')?
            .into_iter()
            .map(parse_component)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: rdns_to_string(&rdns),
            rdns,
        })
    }

    /// Parses a single relative name such as `ou=people`.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError::NotRelative`] when the input has more than one
    /// component, or any parse error from [`DistinguishedName::parse`].
    pub fn parse_rdn(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let parsed = Self::parse(input.as_ref())?;
        if parsed.rdns.len() != 1 {
            return Err(DistinguishedNameError::NotRelative(
                input.as_ref().to_string(),
            ));
        }
        Ok(parsed)
    }

    /// Canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Components from the entry itself up to the root; each holds the `+`-joined pairs.
    #[must_use]
    pub fn rdns(&self) -> &[Vec<RelativeDistinguishedName>] {
        &self.rdns
    }

    /// Canonical string of the first component, the key used in children caches.
    #[must_use]
    pub fn rdn(&self) -> String {
        rdns_to_string(&self.rdns[..1])
    }

    /// Attribute/value pairs that make up the first component.
    #[must_use]
    pub fn naming_attributes(&self) -> &[RelativeDistinguishedName] {
        &self.rdns[0]
    }

    /// Value of the leftmost pair whose attribute type is `attribute`.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .flatten()
            .find(|rdn| rdn.matches_attribute(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Name of the containing entry, `None` for a single-component name.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        let rdns = self.rdns[1..].to_vec();
        Some(Self {
            raw: rdns_to_string(&rdns),
            rdns,
        })
    }

    /// Name of the entry `rdn` directly beneath this one.
    ///
    /// # Errors
    ///
    /// Returns an error if `rdn` is not a single well-formed relative name.
    pub fn child(&self, rdn: &str) -> std::result::Result<Self, DistinguishedNameError> {
        Ok(Self::parse_rdn(rdn)?.join(self))
    }

    /// Places `suffix` to the right of this name.
    #[must_use]
    pub fn join(mut self, suffix: &DistinguishedName) -> Self {
        self.rdns.extend(suffix.rdns.iter().cloned());
        self.raw = rdns_to_string(&self.rdns);
        self
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Splits on `delimiter` outside escape sequences; pieces keep their escapes.
fn split_unescaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<&str>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut chars = input.char_indices();

    while let Some((idx, ch)) = chars.next() {
        if ch == '\\' {
            chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        } else if ch == delimiter {
            parts.push(input[start..idx].trim());
            start = idx + ch.len_utf8();
        }
    }
    parts.push(input[start..].trim());

    if parts.iter().any(|part| part.is_empty()) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn parse_component(
    component: &str,
) -> std::result::Result<Vec<RelativeDistinguishedName>, DistinguishedNameError> {
    split_unescaped(component, '+')?
        .into_iter()
        .map(|pair| {
            let (attribute, value) = pair
                .split_once('=')
                .ok_or_else(|| DistinguishedNameError::InvalidComponent(pair.to_string()))?;
            let attribute = attribute.trim();
            let value = value.trim_start();
            if attribute.is_empty() {
                return Err(DistinguishedNameError::MissingAttribute(pair.to_string()));
            }
            if value.is_empty() {
                return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
            }
            Ok(RelativeDistinguishedName::new(attribute, unescape(value)?))
        })
        .collect()
}

/// Decodes `\<char>` and RFC 4514 `\<hex><hex>` escapes; hex pairs are raw UTF-8 bytes.
fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let invalid = || DistinguishedNameError::InvalidEscape(value.to_string());
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();
    let mut buf = [0; 4];

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let escaped = chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        if escaped.is_ascii_hexdigit() {
            let low = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            let pair = [escaped, low].iter().collect::<String>();
            bytes.push(u8::from_str_radix(&pair, 16).map_err(|_| invalid())?);
        } else {
            bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8(bytes).map_err(|_| invalid())
}

fn escape(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn rdns_to_string(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    rdns.iter()
        .map(|rdn| {
            rdn.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}
