//! Directory client contract consumed by [`Entry`](crate::Entry).
//!
//! The object-mapper never speaks the wire protocol itself. Everything remote goes through
//! [`DirectoryClient`], whose operations block until the server answered. [`LdapDirectory`]
//! (in the `ldap` module) is the production implementation; tests substitute mocks.
//!
//! [`LdapDirectory`]: crate::LdapDirectory

use crate::Result;
use std::collections::BTreeMap;
use std::time::Duration;

/// Attribute name to ordered value list. Single-valued attributes are one-element lists.
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// Search results keyed by distinguished name.
pub type SearchResults = BTreeMap<String, AttributeMap>;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

/// A single search against the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// LDAP filter; `None` matches every entry.
    pub filter: Option<String>,
    /// Attributes to return. `None` requests all user attributes, an empty list requests
    /// none (names only).
    pub attributes: Option<Vec<String>>,
    /// Opaque per-call timeout, forwarded to the client unmodified.
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    /// Creates a request with the given base and scope, all attributes, no filter.
    #[must_use]
    pub fn new(base: impl Into<String>, scope: SearchScope) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: None,
            attributes: None,
            timeout: None,
        }
    }

    /// Reads the single entry at `dn`.
    #[must_use]
    pub fn base(dn: impl Into<String>) -> Self {
        Self::new(dn, SearchScope::Base)
    }

    /// Lists the entries directly beneath `dn`.
    #[must_use]
    pub fn one_level(dn: impl Into<String>) -> Self {
        Self::new(dn, SearchScope::OneLevel)
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Requests no attributes at all; only names come back.
    #[must_use]
    pub fn names_only(mut self) -> Self {
        self.attributes = Some(Vec::new());
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One change to a named attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modification {
    /// Add an attribute that is not yet present.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Replace every value of an attribute.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
    /// Remove the whole attribute.
    Delete {
        /// Attribute to remove.
        attribute: String,
    },
}

impl Modification {
    /// Name of the attribute this modification targets.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Replace { attribute, .. }
            | Self::Delete { attribute } => attribute,
        }
    }

    /// New values, `None` for [`Modification::Delete`].
    #[must_use]
    pub fn values(&self) -> Option<&[String]> {
        match self {
            Self::Add { values, .. } | Self::Replace { values, .. } => Some(values),
            Self::Delete { .. } => None,
        }
    }
}

/// Blocking directory operations.
///
/// Every call either succeeds or fails with [`Error::Directory`](lmap_core::Error::Directory).
/// Implementations must not retry on their own.
#[cfg_attr(test, mockall::automock)]
pub trait DirectoryClient: Send + Sync {
    /// Authenticates the connection with a DN and password.
    fn simple_bind(&self, dn: &str, password: &str) -> Result<()>;

    /// Runs a search and returns every matching entry.
    fn search(&self, request: &SearchRequest) -> Result<SearchResults>;

    /// Creates the entry `dn` with the full attribute set.
    fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<()>;

    /// Applies a non-empty list of modifications to `dn` atomically.
    fn modify(&self, dn: &str, modifications: &[Modification]) -> Result<()>;

    /// Deletes the leaf entry `dn`.
    fn delete(&self, dn: &str) -> Result<()>;

    /// Renames `dn` to `new_rdn` beneath `new_parent`.
    fn rename(&self, dn: &str, new_rdn: &str, new_parent: &str) -> Result<()>;
}
