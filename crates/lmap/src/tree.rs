//! Tree navigation: children, attach, move and recursive delete.
//!
//! Children caches are complete listings as of their last fetch. Changes made by other
//! clients are not detected, and [`Entry::move_to`] does not touch any parent's cache;
//! refetch with [`Entry::refresh_children`] where that matters.

use crate::client::{AttributeMap, DirectoryClient, SearchRequest, SearchScope};
use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::entry::Entry;
use crate::Result;
use lmap_core::Error;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attribute used for the RDN when a child is attached by plain name.
pub const DEFAULT_RDN_ATTRIBUTE: &str = "ou";

impl Entry {
    /// Immediate children keyed by canonical RDN, fetched on first use.
    ///
    /// Children are listed with a names-only search; their attributes are fetched lazily.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] for a detached entry, or the search error.
    pub fn children(&mut self) -> Result<&mut BTreeMap<String, Entry>> {
        if self.children.is_none() {
            let fetched = self.fetch_children()?;
            self.children = Some(fetched);
        }
        Ok(self.children.get_or_insert_with(BTreeMap::new))
    }

    /// Drops the children cache and lists the children again.
    ///
    /// # Errors
    ///
    /// Same as [`Entry::children`].
    pub fn refresh_children(&mut self) -> Result<&mut BTreeMap<String, Entry>> {
        self.children = None;
        self.children()
    }

    /// Drops the children cache; the next access lists the children again.
    pub fn invalidate_children(&mut self) {
        self.children = None;
    }

    /// The child named `rdn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such child exists, [`Error::InvalidRequest`] for a
    /// malformed RDN.
    pub fn child(&mut self, rdn: &str) -> Result<&mut Entry> {
        let key = DistinguishedName::parse_rdn(rdn)?.rdn();
        let label = self.label();
        self.children()?
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(format!("child `{key}` of `{label}`")))
    }

    /// Unfetched handle on the child `rdn`, without listing the children or checking that
    /// the child exists. The children cache is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] for a detached entry, [`Error::InvalidRequest`] for a
    /// malformed RDN.
    pub fn child_handle(&self, rdn: &str) -> Result<Entry> {
        let (client, dn) = self.require_remote("address a child of")?;
        let mut entry = Entry::attached(Arc::clone(client), dn.child(rdn)?);
        entry.timeout = self.timeout;
        Ok(entry)
    }

    /// Whether a child named `rdn` exists.
    ///
    /// # Errors
    ///
    /// Same as [`Entry::children`].
    pub fn has_child(&mut self, rdn: &str) -> Result<bool> {
        let key = DistinguishedName::parse_rdn(rdn)?.rdn();
        Ok(self.children()?.contains_key(&key))
    }

    /// Attaches the detached entry `child` beneath this one as `rdn` and returns it.
    ///
    /// The child's whole attribute cache is sent with the add. The naming attribute implied
    /// by `rdn` is merged into it when missing, so cache and server agree afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyAttached`] if `child` already has a dn,
    /// [`Error::NameCollision`] if `rdn` is taken (no add is sent in either case),
    /// [`Error::Detached`] if this entry is detached, or the add error.
    pub fn add(&mut self, rdn: &str, mut child: Entry) -> Result<&mut Entry> {
        if let Some(dn) = child.dn() {
            return Err(Error::AlreadyAttached(dn.to_string()));
        }
        let key = DistinguishedName::parse_rdn(rdn)?.rdn();
        let (client, parent_dn) = self.require_remote("add a child to")?;
        let client = Arc::clone(client);
        let dn = parent_dn.child(&key)?;

        if self.children()?.contains_key(&key) {
            return Err(Error::NameCollision(dn.to_string()));
        }

        if child.timeout.is_none() {
            child.timeout = self.timeout;
        }
        child.add_as(client, dn)?;
        Ok(self.children()?.entry(key).or_insert(child))
    }

    /// Attaches `child` as `ou=<name>`, the default naming convention.
    ///
    /// # Errors
    ///
    /// Same as [`Entry::add`].
    pub fn add_named(&mut self, name: &str, child: Entry) -> Result<&mut Entry> {
        let rdn = RelativeDistinguishedName::new(DEFAULT_RDN_ATTRIBUTE, name).to_string();
        self.add(&rdn, child)
    }

    /// Creates this detached entry in the directory at the absolute name `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyAttached`] if the entry has a dn, or the add error; the entry
    /// stays detached on failure.
    pub fn add_as(&mut self, client: Arc<dyn DirectoryClient>, dn: DistinguishedName) -> Result<()> {
        if let Some(existing) = self.dn() {
            return Err(Error::AlreadyAttached(existing.to_string()));
        }

        let mut attributes = self.load()?.clone();
        merge_naming_attributes(&mut attributes, &dn);

        debug!(dn = %dn, "adding entry");
        client.add(dn.as_str(), &attributes)?;

        if self.in_transaction() {
            self.snapshot = Some(attributes.clone());
        }
        self.attributes = Some(attributes);
        self.children = Some(BTreeMap::new());
        self.client = Some(client);
        self.dn = Some(dn);
        Ok(())
    }

    /// Moves this entry beneath `new_parent`, keeping its RDN.
    ///
    /// Neither the old nor the new parent's children cache is updated. This entry's own
    /// children cache is dropped since the names in it are stale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if either entry is detached, or the rename error.
    pub fn move_to(&mut self, new_parent: &Entry) -> Result<()> {
        let parent_dn = new_parent
            .dn()
            .ok_or_else(|| Error::Detached("cannot move beneath a detached entry".to_string()))?;
        self.move_to_dn(parent_dn)
    }

    /// Moves this entry beneath the entry named `new_parent`.
    ///
    /// # Errors
    ///
    /// Same as [`Entry::move_to`].
    pub fn move_to_dn(&mut self, new_parent: &DistinguishedName) -> Result<()> {
        let (client, dn) = self.require_remote("move")?;
        let rdn = dn.rdn();
        debug!(dn = %dn, new_parent = %new_parent, "moving entry");
        client.rename(dn.as_str(), &rdn, new_parent.as_str())?;

        self.dn = Some(new_parent.child(&rdn)?);
        self.children = None;
        Ok(())
    }

    /// Deletes this entry and its whole subtree, children before parents.
    ///
    /// The attribute cache is fetched before the remote delete if it was never loaded. On
    /// success the entry is detached but keeps that cache, so it can be added again
    /// elsewhere. A failure stops the walk: entries deleted so far stay deleted and
    /// the children cache lists only the survivors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] for a detached entry, or the first remote error.
    pub fn delete(&mut self) -> Result<()> {
        self.require_remote("delete")?;
        let mut children = match self.children.take() {
            Some(children) => children,
            None => self.fetch_children()?,
        };

        while let Some((rdn, mut child)) = children.pop_first() {
            if let Err(err) = child.delete() {
                warn!(parent = %self.label(), child = %rdn, error = %err, "subtree delete aborted");
                children.insert(rdn, child);
                self.children = Some(children);
                return Err(err);
            }
        }
        self.children = Some(children);

        if self.attributes.is_none() {
            self.load()?;
        }
        let (client, dn) = self.require_remote("delete")?;
        debug!(dn = %dn, "deleting entry");
        client.delete(dn.as_str())?;

        self.dn = None;
        self.snapshot = None;
        self.children = None;
        Ok(())
    }

    /// Deletes the child `rdn` with its subtree and hands back the detached entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such child, or the error from
    /// [`Entry::delete`]; the child stays cached on failure.
    pub fn remove_child(&mut self, rdn: &str) -> Result<Entry> {
        let key = DistinguishedName::parse_rdn(rdn)?.rdn();
        let label = self.label();
        let children = self.children()?;
        let mut child = children
            .remove(&key)
            .ok_or_else(|| Error::NotFound(format!("child `{key}` of `{label}`")))?;

        match child.delete() {
            Ok(()) => Ok(child),
            Err(err) => {
                children.insert(key, child);
                Err(err)
            }
        }
    }

    /// Searches beneath this entry. `subtree` selects subtree scope over one level.
    ///
    /// Results come back with their attribute caches already filled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] for a detached entry, or the search error.
    pub fn search(&self, filter: &str, subtree: bool) -> Result<Vec<Entry>> {
        let (client, dn) = self.require_remote("search beneath")?;
        let scope = if subtree {
            SearchScope::Subtree
        } else {
            SearchScope::OneLevel
        };
        let request = SearchRequest::new(dn.as_str(), scope)
            .with_filter(filter)
            .with_timeout(self.timeout);

        let results = client.search(&request)?;
        Ok(results
            .into_iter()
            .filter_map(|(found, attributes)| {
                let mut entry = self.derived(&found)?;
                entry.attributes = Some(attributes);
                Some(entry)
            })
            .collect())
    }

    pub(crate) fn fetch_children(&self) -> Result<BTreeMap<String, Entry>> {
        let (client, dn) = self.require_remote("list children of")?;
        debug!(dn = %dn, "listing children");
        let request = SearchRequest::one_level(dn.as_str())
            .names_only()
            .with_timeout(self.timeout);

        Ok(client
            .search(&request)?
            .into_keys()
            .filter_map(|found| self.derived(&found))
            .map(|child| {
                let rdn = child.rdn().unwrap_or_default();
                (rdn, child)
            })
            .collect())
    }

    /// Unfetched handle on a name returned by the server, sharing this entry's client.
    fn derived(&self, dn: &str) -> Option<Entry> {
        let client = self.client.as_ref()?;
        match DistinguishedName::parse(dn) {
            Ok(parsed) => {
                let mut entry = Entry::attached(Arc::clone(client), parsed);
                entry.timeout = self.timeout;
                Some(entry)
            }
            Err(err) => {
                warn!(dn, error = %err, "skipping entry with unparseable dn");
                None
            }
        }
    }

    fn require_remote(
        &self,
        action: &str,
    ) -> Result<(&Arc<dyn DirectoryClient>, &DistinguishedName)> {
        match (&self.client, &self.dn) {
            (Some(client), Some(dn)) => Ok((client, dn)),
            _ => Err(Error::Detached(format!("cannot {action} a detached entry"))),
        }
    }
}

/// Ensures every attribute/value pair of the RDN is present in `attributes`.
fn merge_naming_attributes(attributes: &mut AttributeMap, dn: &DistinguishedName) {
    for naming in dn.naming_attributes() {
        let existing = attributes
            .keys()
            .find(|name| naming.matches_attribute(name))
            .cloned();
        let values = attributes
            .entry(existing.unwrap_or_else(|| naming.attribute().to_string()))
            .or_default();
        if !values.iter().any(|value| value == naming.value()) {
            values.push(naming.value().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockDirectoryClient;
    use mockall::Sequence;

    const BASE: &str = "ou=test,dc=example,dc=com";

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|v| (*v).to_string()).collect()
    }

    fn names(dns: &[&str]) -> BTreeMap<String, AttributeMap> {
        dns.iter()
            .map(|dn| ((*dn).to_string(), AttributeMap::new()))
            .collect()
    }

    fn expect_children(mock: &mut MockDirectoryClient, base: &'static str, dns: &'static [&'static str]) {
        mock.expect_search()
            .withf(move |request| {
                request.base == base
                    && request.scope == SearchScope::OneLevel
                    && request.attributes == Some(Vec::new())
            })
            .times(1)
            .returning(move |_| Ok(names(dns)));
    }

    fn expect_fetch(mock: &mut MockDirectoryClient, dn: &'static str) {
        mock.expect_search()
            .withf(move |request| request.base == dn && request.scope == SearchScope::Base)
            .times(1)
            .returning(|request| {
                Ok(BTreeMap::from([(
                    request.base.clone(),
                    AttributeMap::from([(
                        "objectClass".to_string(),
                        values(&["organizationalUnit"]),
                    )]),
                )]))
            });
    }

    fn root(mock: MockDirectoryClient) -> Entry {
        Entry::root(Arc::new(mock), BASE).unwrap()
    }

    #[test]
    fn children_are_listed_once_by_rdn() {
        let mut mock = MockDirectoryClient::new();
        expect_children(
            &mut mock,
            BASE,
            &["uid=fnord,ou=test,dc=example,dc=com", "uid=hacker,ou=test,dc=example,dc=com"],
        );
        mock.expect_search()
            .withf(|request| {
                request.base == "uid=fnord,ou=test,dc=example,dc=com"
                    && request.scope == SearchScope::Base
            })
            .times(1)
            .returning(|request| {
                Ok(BTreeMap::from([(
                    request.base.clone(),
                    AttributeMap::from([("cn".to_string(), values(&["Frank Nord"]))]),
                )]))
            });
        let mut root = root(mock);

        let keys = root.children().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, ["uid=fnord", "uid=hacker"]);
        assert!(root.has_child("uid=hacker").unwrap());
        assert!(!root.has_child("uid=nobody").unwrap());

        let fnord = root.child("uid=fnord").unwrap();
        assert!(fnord.attributes.is_none());
        assert_eq!(fnord.get("cn").unwrap(), ["Frank Nord"]);
        assert!(matches!(root.child("uid=nobody"), Err(Error::NotFound(_))));
    }

    #[test]
    fn add_attaches_child() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &[]);
        mock.expect_add()
            .withf(|dn, attributes| {
                dn == "ou=foo,ou=test,dc=example,dc=com"
                    && attributes.get("ou") == Some(&vec!["foo".to_string()])
                    && attributes.get("objectClass")
                        == Some(&vec!["organizationalUnit".to_string()])
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut root = root(mock);

        let mut child = Entry::new();
        child.set("objectClass", ["organizationalUnit"]).unwrap();
        let added = root.add("ou=foo", child).unwrap();

        assert_eq!(
            added.dn().map(DistinguishedName::as_str),
            Some("ou=foo,ou=test,dc=example,dc=com")
        );
        assert_eq!(added.get("ou").unwrap(), ["foo"]);
        assert!(added.children().unwrap().is_empty());
        assert!(root.has_child("ou=foo").unwrap());
    }

    #[test]
    fn add_rejects_taken_name() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &["ou=foo,ou=test,dc=example,dc=com"]);
        mock.expect_add().never();
        let mut root = root(mock);

        let result = root.add("ou=foo", Entry::new());
        assert!(matches!(result, Err(Error::NameCollision(_))));
    }

    #[test]
    fn add_rejects_attached_child() {
        let mut mock = MockDirectoryClient::new();
        mock.expect_add().never();
        let client: Arc<dyn DirectoryClient> = Arc::new(mock);
        let mut root = Entry::root(Arc::clone(&client), BASE).unwrap();
        let attached = Entry::root(client, "ou=bar,dc=example,dc=com").unwrap();

        let result = root.add("ou=bar", attached);
        assert!(matches!(result, Err(Error::AlreadyAttached(_))));
    }

    #[test]
    fn add_to_detached_parent_fails() {
        let mut parent = Entry::new();
        let result = parent.add("ou=foo", Entry::new());
        assert!(matches!(result, Err(Error::Detached(_))));
    }

    #[test]
    fn failed_add_leaves_child_detached() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &[]);
        mock.expect_add().times(1).returning(|_, _| {
            Err(Error::Directory {
                code: Some(65),
                message: "object class violation".to_string(),
            })
        });
        let mut root = root(mock);

        let err = root.add("ou=foo", Entry::new()).unwrap_err();
        assert_eq!(err.directory_code(), Some(65));
        assert!(!root.has_child("ou=foo").unwrap());
    }

    #[test]
    fn add_named_uses_ou() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &[]);
        mock.expect_add()
            .withf(|dn, _| dn == "ou=people,ou=test,dc=example,dc=com")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut root = root(mock);

        let added = root.add_named("people", Entry::new()).unwrap();
        assert_eq!(added.rdn().as_deref(), Some("ou=people"));
    }

    #[test]
    fn naming_attribute_is_merged_case_insensitively() {
        let mut attributes = AttributeMap::from([("OU".to_string(), values(&["other"]))]);
        let dn = DistinguishedName::parse("ou=foo,dc=example").unwrap();
        merge_naming_attributes(&mut attributes, &dn);
        assert_eq!(attributes.get("OU"), Some(&values(&["other", "foo"])));
        assert!(!attributes.contains_key("ou"));
    }

    #[test]
    fn move_renames_and_leaves_parent_caches() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &["uid=fnord,ou=test,dc=example,dc=com"]);
        mock.expect_rename()
            .withf(|dn, rdn, parent| {
                dn == "uid=fnord,ou=test,dc=example,dc=com"
                    && rdn == "uid=fnord"
                    && parent == "ou=people,dc=example,dc=com"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let client: Arc<dyn DirectoryClient> = Arc::new(mock);
        let mut root = Entry::root(Arc::clone(&client), BASE).unwrap();
        let people = Entry::root(client, "ou=people,dc=example,dc=com").unwrap();

        let fnord = root.child("uid=fnord").unwrap();
        fnord.move_to(&people).unwrap();
        assert_eq!(
            fnord.dn().map(DistinguishedName::as_str),
            Some("uid=fnord,ou=people,dc=example,dc=com")
        );
        // the old parent still lists it until refetched
        assert!(root.has_child("uid=fnord").unwrap());
    }

    #[test]
    fn move_requires_attached_entries() {
        let mut detached = Entry::new();
        let target = Entry::new();
        assert!(matches!(detached.move_to(&target), Err(Error::Detached(_))));
    }

    #[test]
    fn delete_removes_children_before_parent() {
        let mut mock = MockDirectoryClient::new();
        let mut sequence = Sequence::new();
        expect_children(
            &mut mock,
            BASE,
            &["ou=a,ou=test,dc=example,dc=com", "ou=b,ou=test,dc=example,dc=com"],
        );
        expect_children(&mut mock, "ou=a,ou=test,dc=example,dc=com", &[]);
        expect_children(&mut mock, "ou=b,ou=test,dc=example,dc=com", &[]);
        for dn in [
            "ou=a,ou=test,dc=example,dc=com",
            "ou=b,ou=test,dc=example,dc=com",
            BASE,
        ] {
            expect_fetch(&mut mock, dn);
            mock.expect_delete()
                .withf(move |target| target == dn)
                .times(1)
                .in_sequence(&mut sequence)
                .returning(|_| Ok(()));
        }
        let mut root = root(mock);

        root.delete().unwrap();
        assert!(!root.is_attached());
        assert!(matches!(root.children(), Err(Error::Detached(_))));
    }

    #[test]
    fn delete_is_depth_first() {
        let mut mock = MockDirectoryClient::new();
        let mut sequence = Sequence::new();
        expect_children(&mut mock, BASE, &["ou=a,ou=test,dc=example,dc=com"]);
        expect_children(
            &mut mock,
            "ou=a,ou=test,dc=example,dc=com",
            &["ou=deep,ou=a,ou=test,dc=example,dc=com"],
        );
        expect_children(&mut mock, "ou=deep,ou=a,ou=test,dc=example,dc=com", &[]);
        for dn in [
            "ou=deep,ou=a,ou=test,dc=example,dc=com",
            "ou=a,ou=test,dc=example,dc=com",
            BASE,
        ] {
            expect_fetch(&mut mock, dn);
            mock.expect_delete()
                .withf(move |target| target == dn)
                .times(1)
                .in_sequence(&mut sequence)
                .returning(|_| Ok(()));
        }
        let mut root = root(mock);

        root.delete().unwrap();
    }

    #[test]
    fn failed_child_delete_aborts() {
        let mut mock = MockDirectoryClient::new();
        expect_children(
            &mut mock,
            BASE,
            &["ou=a,ou=test,dc=example,dc=com", "ou=b,ou=test,dc=example,dc=com"],
        );
        expect_children(&mut mock, "ou=a,ou=test,dc=example,dc=com", &[]);
        expect_children(&mut mock, "ou=b,ou=test,dc=example,dc=com", &[]);
        expect_fetch(&mut mock, "ou=a,ou=test,dc=example,dc=com");
        expect_fetch(&mut mock, "ou=b,ou=test,dc=example,dc=com");
        mock.expect_delete()
            .withf(|target| target == "ou=a,ou=test,dc=example,dc=com")
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_delete()
            .withf(|target| target == "ou=b,ou=test,dc=example,dc=com")
            .times(1)
            .returning(|_| Err(Error::directory("server went away")));
        mock.expect_delete().withf(|target| target == BASE).never();
        let mut root = root(mock);

        assert!(matches!(root.delete(), Err(Error::Directory { .. })));
        assert!(root.is_attached());
        let survivors = root.children().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(survivors, ["ou=b"]);
    }

    #[test]
    fn remove_child_returns_detached_entry() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &["ou=a,ou=test,dc=example,dc=com"]);
        expect_children(&mut mock, "ou=a,ou=test,dc=example,dc=com", &[]);
        expect_fetch(&mut mock, "ou=a,ou=test,dc=example,dc=com");
        mock.expect_delete()
            .withf(|target| target == "ou=a,ou=test,dc=example,dc=com")
            .times(1)
            .returning(|_| Ok(()));
        let mut root = root(mock);

        let removed = root.remove_child("ou=a").unwrap();
        assert!(!removed.is_attached());
        assert!(!root.has_child("ou=a").unwrap());
        assert!(matches!(root.remove_child("ou=a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn removed_child_is_added_back_with_its_attributes() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &["uid=fnord,ou=test,dc=example,dc=com"]);
        expect_children(&mut mock, "uid=fnord,ou=test,dc=example,dc=com", &[]);
        mock.expect_search()
            .withf(|request| {
                request.base == "uid=fnord,ou=test,dc=example,dc=com"
                    && request.scope == SearchScope::Base
            })
            .times(1)
            .returning(|request| {
                Ok(BTreeMap::from([(
                    request.base.clone(),
                    AttributeMap::from([
                        ("uid".to_string(), values(&["fnord"])),
                        ("cn".to_string(), values(&["Frank Nord"])),
                        ("objectClass".to_string(), values(&["account"])),
                    ]),
                )]))
            });
        mock.expect_delete().times(1).returning(|_| Ok(()));
        mock.expect_add()
            .withf(|dn, attributes| {
                dn == "uid=fnord,ou=test,dc=example,dc=com"
                    && attributes.len() == 3
                    && attributes.get("cn") == Some(&vec!["Frank Nord".to_string()])
                    && attributes.get("objectClass") == Some(&vec!["account".to_string()])
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut root = root(mock);

        let fnord = root.remove_child("uid=fnord").unwrap();
        assert!(!fnord.is_attached());
        root.add("uid=fnord", fnord).unwrap();
    }

    #[test]
    fn hex_escaped_child_names_are_decoded() {
        let mut mock = MockDirectoryClient::new();
        expect_children(&mut mock, BASE, &["ou=a\\2Cb,ou=test,dc=example,dc=com"]);
        let mut root = root(mock);

        let keys = root.children().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, ["ou=a\\,b"]);
        let child = root.child("ou=a\\,b").unwrap();
        assert_eq!(child.dn().and_then(|dn| dn.get("ou")), Some("a,b"));
        assert_eq!(
            child.dn().map(DistinguishedName::as_str),
            Some("ou=a\\,b,ou=test,dc=example,dc=com")
        );
        assert!(root.has_child("ou=a\\2Cb").unwrap());
    }

    #[test]
    fn child_handle_skips_listing() {
        let mut mock = MockDirectoryClient::new();
        mock.expect_search().never();
        let root = root(mock).with_timeout(std::time::Duration::from_secs(3));

        let handle = root.child_handle("uid=fnord").unwrap();
        assert_eq!(
            handle.dn().map(DistinguishedName::as_str),
            Some("uid=fnord,ou=test,dc=example,dc=com")
        );
        assert_eq!(handle.timeout(), Some(std::time::Duration::from_secs(3)));
        assert!(root.children.is_none());
        assert!(matches!(
            Entry::new().child_handle("uid=fnord"),
            Err(Error::Detached(_))
        ));
    }

    #[test]
    fn search_returns_populated_entries() {
        let mut mock = MockDirectoryClient::new();
        mock.expect_search()
            .withf(|request| {
                request.base == BASE
                    && request.scope == SearchScope::Subtree
                    && request.filter.as_deref() == Some("(uid=fnord)")
            })
            .times(1)
            .returning(|_| {
                Ok(BTreeMap::from([(
                    "uid=fnord,ou=test,dc=example,dc=com".to_string(),
                    AttributeMap::from([("uid".to_string(), values(&["fnord"]))]),
                )]))
            });
        let root = root(mock);

        let mut found = root.search("(uid=fnord)", true).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rdn().as_deref(), Some("uid=fnord"));
        assert_eq!(found[0].get("uid").unwrap(), ["fnord"]);
    }
}
