//! Attribute container for a single directory entry.
//!
//! An [`Entry`] caches the attributes of one directory record. The cache is filled lazily on
//! first access and stays authoritative until [`Entry::invalidate`] is called.
//!
//! Outside a transaction every mutation is written through to the directory as its own
//! modify call, and the cache only changes once the server accepted it. Inside a transaction
//! mutations touch the cache only; [`Entry::commit`] diffs the cache against the snapshot
//! taken by [`Entry::start_transaction`] and sends the result in one call.
//!
//! Entries are not synchronised. Sharing one across threads needs external locking.

use crate::client::{AttributeMap, DirectoryClient, Modification, SearchRequest};
use crate::diff::diff;
use crate::dn::DistinguishedName;
use crate::Result;
use lmap_core::Error;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One directory record: distinguished name, attribute cache, transaction snapshot and
/// children cache.
pub struct Entry {
    pub(crate) client: Option<Arc<dyn DirectoryClient>>,
    pub(crate) dn: Option<DistinguishedName>,
    pub(crate) attributes: Option<AttributeMap>,
    pub(crate) snapshot: Option<AttributeMap>,
    pub(crate) children: Option<BTreeMap<String, Entry>>,
    pub(crate) timeout: Option<Duration>,
}

impl Entry {
    /// Creates a detached, empty entry. Attach it with [`Entry::add`] once populated.
    #[must_use]
    pub fn new() -> Self {
        Self::with_attributes(AttributeMap::new())
    }

    /// Creates a detached entry holding `attributes`.
    #[must_use]
    pub fn with_attributes(attributes: AttributeMap) -> Self {
        Self {
            client: None,
            dn: None,
            attributes: Some(attributes),
            snapshot: None,
            children: None,
            timeout: None,
        }
    }

    /// Creates a handle on the existing entry `dn`. Nothing is fetched until first use.
    #[must_use]
    pub fn attached(client: Arc<dyn DirectoryClient>, dn: DistinguishedName) -> Self {
        Self {
            client: Some(client),
            dn: Some(dn),
            attributes: None,
            snapshot: None,
            children: None,
            timeout: None,
        }
    }

    /// Parses `dn` and creates a handle on it, typically the top of the subtree to work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `dn` is malformed.
    pub fn root(client: Arc<dyn DirectoryClient>, dn: &str) -> Result<Self> {
        Ok(Self::attached(client, DistinguishedName::parse(dn)?))
    }

    /// Sets the timeout forwarded with every search issued for this entry and for the
    /// children and search results derived from it.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Distinguished name, `None` while detached.
    #[must_use]
    pub const fn dn(&self) -> Option<&DistinguishedName> {
        self.dn.as_ref()
    }

    /// Canonical relative name, `None` while detached.
    #[must_use]
    pub fn rdn(&self) -> Option<String> {
        self.dn.as_ref().map(DistinguishedName::rdn)
    }

    /// Whether the entry exists in the directory tree.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.dn.is_some()
    }

    /// Whether a transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Search timeout, if one was set.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the values of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the attribute is absent, or any error from the lazy fetch.
    pub fn get(&mut self, name: &str) -> Result<&[String]> {
        self.load()?
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| missing_attribute(name))
    }

    /// Returns the values of `name`, or `default` when the attribute is absent.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn get_or(&mut self, name: &str, default: Vec<String>) -> Result<Vec<String>> {
        Ok(self.load()?.get(name).cloned().unwrap_or(default))
    }

    /// Returns the first value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the attribute is absent.
    pub fn first(&mut self, name: &str) -> Result<&str> {
        self.get(name)?
            .first()
            .map(String::as_str)
            .ok_or_else(|| missing_attribute(name))
    }

    /// Whether the attribute `name` is present.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn contains(&mut self, name: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(name))
    }

    /// Attribute names, in sorted order.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn keys(&mut self) -> Result<impl Iterator<Item = &str> + '_> {
        Ok(self.load()?.keys().map(String::as_str))
    }

    /// Number of attributes.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    /// Whether the entry has no attributes.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.load()?.is_empty())
    }

    /// The whole attribute cache.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn attributes(&mut self) -> Result<&AttributeMap> {
        Ok(self.load()?)
    }

    /// Sets `name` to `values`.
    ///
    /// Outside a transaction on an attached entry this issues one modify call (`Add` when the
    /// attribute is new, `Replace` otherwise) and updates the cache once it succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty value list and [`Error::Directory`]
    /// when the write-through fails; the cache is unchanged in both cases.
    pub fn set<V, S>(&mut self, name: impl Into<String>, values: V) -> Result<()>
    where
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "attribute `{name}` needs at least one value; use delete_attribute to remove it"
            )));
        }

        let exists = self.load()?.contains_key(&name);
        if !self.in_transaction() {
            let modification = if exists {
                Modification::Replace {
                    attribute: name.clone(),
                    values: values.clone(),
                }
            } else {
                Modification::Add {
                    attribute: name.clone(),
                    values: values.clone(),
                }
            };
            self.write_through(modification)?;
        }

        self.cache_mut().insert(name, values);
        Ok(())
    }

    /// Removes the attribute `name` and returns its former values.
    ///
    /// Outside a transaction on an attached entry this issues one `Delete` modification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the attribute is absent and [`Error::Directory`] when
    /// the write-through fails.
    pub fn delete_attribute(&mut self, name: &str) -> Result<Vec<String>> {
        if !self.load()?.contains_key(name) {
            return Err(missing_attribute(name));
        }
        if !self.in_transaction() {
            self.write_through(Modification::Delete {
                attribute: name.to_string(),
            })?;
        }
        Ok(self.cache_mut().remove(name).unwrap_or_default())
    }

    /// Opens a transaction by snapshotting the attribute cache, fetching it first if needed.
    ///
    /// Calling this while a transaction is open replaces the snapshot with the current cache;
    /// transactions do not nest.
    ///
    /// # Errors
    ///
    /// Returns any error from the lazy fetch.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            debug!(dn = %self.label(), "restarting open transaction");
        }
        let snapshot = self.load()?.clone();
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Sends every change made since [`Entry::start_transaction`] as one modify call and
    /// closes the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] when no transaction is open. On
    /// [`Error::Directory`] the transaction stays open with the cache untouched, so the caller
    /// can retry or roll back.
    pub fn commit(&mut self) -> Result<()> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Err(Error::TransactionState(format!(
                "commit on `{}` without an open transaction",
                self.label()
            )));
        };
        let current = self.attributes.as_ref().unwrap_or(snapshot);
        let modifications = diff(current, snapshot);

        if !modifications.is_empty() {
            if let Some((client, dn)) = self.remote() {
                debug!(dn = %dn, count = modifications.len(), "committing transaction");
                if let Err(err) = client.modify(dn.as_str(), &modifications) {
                    warn!(dn = %dn, error = %err, "commit failed; transaction left open");
                    return Err(err);
                }
            }
        }

        self.snapshot = None;
        Ok(())
    }

    /// Discards every change made since [`Entry::start_transaction`]. Nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] when no transaction is open.
    pub fn rollback(&mut self) -> Result<()> {
        let snapshot = self.snapshot.take().ok_or_else(|| {
            Error::TransactionState(format!(
                "rollback on `{}` without an open transaction",
                self.label()
            ))
        })?;
        self.attributes = Some(snapshot);
        Ok(())
    }

    /// Runs `f` inside a transaction: commits when it returns `Ok`, rolls back on `Err`.
    ///
    /// A failed commit leaves the transaction open, exactly like [`Entry::commit`].
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from starting or committing the transaction.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.start_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback()?;
                Err(err)
            }
        }
    }

    /// Drops the attribute cache so the next access fetches it again.
    ///
    /// Detached entries keep their attributes since there is nothing to fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] while a transaction is open.
    pub fn invalidate(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::TransactionState(format!(
                "cannot invalidate `{}` during a transaction",
                self.label()
            )));
        }
        if self.is_attached() {
            self.attributes = None;
        }
        Ok(())
    }

    pub(crate) fn load(&mut self) -> Result<&mut AttributeMap> {
        if self.attributes.is_none() {
            let fetched = self.fetch()?;
            self.attributes = Some(fetched);
        }
        Ok(self.cache_mut())
    }

    fn cache_mut(&mut self) -> &mut AttributeMap {
        self.attributes.get_or_insert_with(AttributeMap::new)
    }

    fn fetch(&self) -> Result<AttributeMap> {
        let Some((client, dn)) = self.remote() else {
            return Ok(AttributeMap::new());
        };
        debug!(dn = %dn, "fetching attributes");
        let request = SearchRequest::base(dn.as_str()).with_timeout(self.timeout);
        client
            .search(&request)?
            .into_values()
            .next()
            .ok_or_else(|| Error::NotFound(format!("entry `{dn}`")))
    }

    fn write_through(&self, modification: Modification) -> Result<()> {
        if let Some((client, dn)) = self.remote() {
            debug!(dn = %dn, attribute = modification.attribute(), "writing attribute");
            client.modify(dn.as_str(), &[modification])?;
        }
        Ok(())
    }

    pub(crate) fn remote(&self) -> Option<(&dyn DirectoryClient, &DistinguishedName)> {
        match (&self.client, &self.dn) {
            (Some(client), Some(dn)) => Some((client.as_ref(), dn)),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> String {
        self.dn
            .as_ref()
            .map_or_else(|| "<detached>".to_string(), ToString::to_string)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("dn", &self.dn)
            .field("attributes", &self.attributes)
            .field("in_transaction", &self.in_transaction())
            .field("children", &self.children.as_ref().map(BTreeMap::len))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<'{}': ", self.label())?;
        match &self.attributes {
            Some(attributes) => write!(f, "{attributes:?}")?,
            None => f.write_str("(not fetched)")?,
        }
        if let Some(children) = &self.children {
            write!(f, " with {:?}", children.keys().collect::<Vec<_>>())?;
        }
        f.write_str(">")
    }
}

fn missing_attribute(name: &str) -> Error {
    Error::NotFound(format!("attribute `{name}`"))
}
