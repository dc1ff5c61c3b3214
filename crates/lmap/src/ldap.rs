//! [`DirectoryClient`] backed by the synchronous `ldap3` connection.

use crate::client::{
    AttributeMap, DirectoryClient, Modification, SearchRequest, SearchResults, SearchScope,
};
use crate::Result;
use ldap3::{LdapConn, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use lmap_core::{DirectoryConfig, Error};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Attribute selector that asks the server for no attributes at all (RFC 4511).
const NO_ATTRIBUTES: &str = "1.1";

const MATCH_ALL_FILTER: &str = "(objectClass=*)";

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Directory client speaking LDAP through `ldap3`.
///
/// Owns one connection. Values travel as sets on the wire, so the server may return
/// multi-valued attributes in a different order than they were written.
pub struct LdapDirectory {
    conn: Mutex<LdapConn>,
    operation_timeout: Duration,
}

impl LdapDirectory {
    /// Opens a connection and binds with the configured credentials, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for unusable TLS settings and [`Error::Directory`] when
    /// the server cannot be reached or rejects the bind.
    pub fn connect(config: &DirectoryConfig) -> Result<Self> {
        config.check()?;
        let settings = build_ldap_settings(config)?;
        let conn = LdapConn::with_settings(settings, config.url()).map_err(map_ldap_error)?;
        let directory = Self {
            conn: Mutex::new(conn),
            operation_timeout: config.operation_timeout(),
        };

        if let Some(credentials) = config.credentials() {
            directory.simple_bind(credentials.bind_dn(), credentials.bind_password())?;
        }
        debug!(url = config.url(), "connected to directory");
        Ok(directory)
    }

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Directory`] if the unbind request could not be sent.
    pub fn unbind(self) -> Result<()> {
        let mut conn = self
            .conn
            .into_inner()
            .map_err(|_| Error::directory("directory connection lock poisoned"))?;
        conn.unbind().map_err(map_ldap_error)
    }

    fn connection(&self, timeout: Option<Duration>) -> Result<MutexGuard<'_, LdapConn>> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::directory("directory connection lock poisoned"))?;
        conn.with_timeout(timeout.unwrap_or(self.operation_timeout));
        Ok(conn)
    }
}

impl DirectoryClient for LdapDirectory {
    fn simple_bind(&self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .connection(None)?
            .simple_bind(dn, password)
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let attributes: Vec<&str> = match &request.attributes {
            None => Vec::new(),
            Some(names) if names.is_empty() => vec![NO_ATTRIBUTES],
            Some(names) => names.iter().map(String::as_str).collect(),
        };
        let filter = request.filter.as_deref().unwrap_or(MATCH_ALL_FILTER);
        debug!(base = %request.base, scope = ?request.scope, filter, "directory search");

        let (entries, _) = self
            .connection(request.timeout)?
            .search(&request.base, request.scope.into(), filter, attributes)
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| {
                if !entry.bin_attrs.is_empty() {
                    warn!(
                        dn = %entry.dn,
                        attributes = ?entry.bin_attrs.keys().collect::<Vec<_>>(),
                        "dropping binary attributes"
                    );
                }
                (entry.dn, entry.attrs.into_iter().collect::<AttributeMap>())
            })
            .collect())
    }

    fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
            .collect::<Vec<(&str, HashSet<&str>)>>();

        debug!(dn, "directory add");
        let result = self
            .connection(None)?
            .add(dn, attrs)
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn modify(&self, dn: &str, modifications: &[Modification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                Modification::Add { attribute, values } => Mod::Add(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
                Modification::Replace { attribute, values } => Mod::Replace(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
                Modification::Delete { attribute } => {
                    Mod::Delete(attribute.as_str(), HashSet::new())
                }
            })
            .collect::<Vec<_>>();

        debug!(dn, count = mods.len(), "directory modify");
        let result = self
            .connection(None)?
            .modify(dn, mods)
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn delete(&self, dn: &str) -> Result<()> {
        debug!(dn, "directory delete");
        let result = self
            .connection(None)?
            .delete(dn)
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn rename(&self, dn: &str, new_rdn: &str, new_parent: &str) -> Result<()> {
        debug!(dn, new_rdn, new_parent, "directory rename");
        let result = self
            .connection(None)?
            .modifydn(dn, new_rdn, true, Some(new_parent))
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: LdapError) -> Error {
    match err {
        LdapError::LdapResult { result } => Error::Directory {
            code: Some(result.rc),
            message: if result.text.is_empty() {
                format!("operation failed with result code {}", result.rc)
            } else {
                result.text
            },
        },
        LdapError::Timeout { .. } => Error::Timeout(err.to_string()),
        other => Error::directory(other.to_string()),
    }
}
