//! Typed object-mapper over LDAP directory trees.
//!
//! An [`Entry`] is a lazily fetched, locally mutable view of one directory record. Changes
//! are written through immediately, or buffered in a transaction and committed as a single
//! diff. Entries also navigate the tree: list and attach children, move, and delete whole
//! subtrees.
//!
//! ```no_run
//! use lmap::{BindCredentials, DirectoryConfig, Entry, LdapDirectory};
//! use std::sync::Arc;
//!
//! # fn run() -> lmap::Result<()> {
//! let config = DirectoryConfig::new("ldap://127.0.0.1:389/")?
//!     .with_credentials(BindCredentials::new("cn=root,dc=example,dc=com", "secret"));
//! let directory = Arc::new(LdapDirectory::connect(&config)?);
//!
//! let mut base = Entry::root(directory, "ou=test,dc=example,dc=com")?;
//! let fnord = base.child("uid=fnord")?;
//! fnord.transaction(|entry| {
//!     entry.set("loginShell", ["/bin/zsh"])?;
//!     entry.delete_attribute("description")?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod client;
pub mod diff;
mod dn;
mod entry;
mod ldap;
mod tree;

pub use client::{
    AttributeMap, DirectoryClient, Modification, SearchRequest, SearchResults, SearchScope,
};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::Entry;
pub use ldap::LdapDirectory;
pub use lmap_core::{BindCredentials, DirectoryConfig, Error};
pub use tree::DEFAULT_RDN_ATTRIBUTE;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = lmap_core::Result<T>;
