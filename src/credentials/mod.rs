//! Client identity resolution and TLS configuration
//!
//! [`CredentialProvider`] turns an optional credential alias into a rustls
//! client configuration. Without an alias the configuration only carries the
//! default trust anchors; with one it also presents the client certificate
//! chain for mutual TLS. Key material is read per handshake, moved into the
//! rustls builder and never logged or cached.

use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use rustls::{ClientConfig, RootCertStore};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Client identity could not be resolved
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential alias '{alias}' not found")]
    NotFound { alias: String },
    #[error("failed to load credential '{alias}': {reason}")]
    LoadFailed { alias: String, reason: String },
}

/// Private key and certificate chain (leaf first) for one alias
pub struct Credential {
    pub private_key: PrivateKeyDer<'static>,
    pub certificate_chain: Vec<CertificateDer<'static>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("private_key", &"<redacted>")
            .field("certificate_chain", &self.certificate_chain.len())
            .finish()
    }
}

/// Secure store holding client identities
pub trait CredentialStore: Send + Sync {
    fn has_alias(&self, alias: &str) -> bool;
    fn load_key_and_chain(&self, alias: &str) -> Result<Credential, CredentialError>;
}

/// Store with no identities; every alias is unknown
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentialStore;

impl CredentialStore for NoCredentialStore {
    fn has_alias(&self, _alias: &str) -> bool {
        false
    }

    fn load_key_and_chain(&self, alias: &str) -> Result<Credential, CredentialError> {
        Err(CredentialError::NotFound {
            alias: alias.to_string(),
        })
    }
}

/// TLS configuration ready for one session
#[derive(Clone)]
pub struct TlsSettings {
    pub config: Arc<ClientConfig>,
    /// Whether a client certificate is presented
    pub client_identity: bool,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("client_identity", &self.client_identity)
            .finish_non_exhaustive()
    }
}

/// Builds TLS configurations from a [`CredentialStore`]
#[derive(Clone)]
pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
}

impl Default for CredentialProvider {
    fn default() -> Self {
        Self::new(Arc::new(NoCredentialStore))
    }
}

impl CredentialProvider {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Build the TLS configuration for an optional client identity
    pub fn build_tls_config(&self, alias: Option<&str>) -> Result<TlsSettings, CredentialError> {
        let builder = ClientConfig::builder().with_root_certificates(default_trust_anchors());

        let alias = match alias.map(str::trim).filter(|a| !a.is_empty()) {
            Some(alias) => alias,
            None => {
                debug!("No credential alias configured, using server authentication only");
                return Ok(TlsSettings {
                    config: Arc::new(builder.with_no_client_auth()),
                    client_identity: false,
                });
            }
        };

        if !self.store.has_alias(alias) {
            return Err(CredentialError::NotFound {
                alias: alias.to_string(),
            });
        }

        let Credential {
            private_key,
            certificate_chain,
        } = self.store.load_key_and_chain(alias)?;

        let config = builder
            .with_client_auth_cert(certificate_chain, private_key)
            .map_err(|e| CredentialError::LoadFailed {
                alias: alias.to_string(),
                reason: e.to_string(),
            })?;

        info!(alias = %alias, "Loaded client identity for mutual TLS");
        Ok(TlsSettings {
            config: Arc::new(config),
            client_identity: true,
        })
    }
}

/// Mozilla root program trust anchors
pub fn default_trust_anchors() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Aliases are plain file stems
pub fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias != "."
        && alias != ".."
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Identities stored as `<alias>.key` and `<alias>.crt` PEM files in one directory
#[derive(Debug, Clone)]
pub struct PemDirectoryStore {
    directory: PathBuf,
}

impl PemDirectoryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn key_path(&self, alias: &str) -> PathBuf {
        self.directory.join(format!("{alias}.key"))
    }

    fn chain_path(&self, alias: &str) -> PathBuf {
        self.directory.join(format!("{alias}.crt"))
    }
}

impl CredentialStore for PemDirectoryStore {
    fn has_alias(&self, alias: &str) -> bool {
        is_valid_alias(alias) && self.key_path(alias).is_file() && self.chain_path(alias).is_file()
    }

    fn load_key_and_chain(&self, alias: &str) -> Result<Credential, CredentialError> {
        if !self.has_alias(alias) {
            return Err(CredentialError::NotFound {
                alias: alias.to_string(),
            });
        }

        let load_failed = |reason: String| CredentialError::LoadFailed {
            alias: alias.to_string(),
            reason,
        };

        let key_pem = std::fs::read(self.key_path(alias))
            .map_err(|e| load_failed(format!("cannot read private key: {e}")))?;
        let private_key = parse_private_key(&key_pem).map_err(&load_failed)?;

        let chain_pem = std::fs::read(self.chain_path(alias))
            .map_err(|e| load_failed(format!("cannot read certificate chain: {e}")))?;
        let certificate_chain = parse_certificate_chain(&chain_pem).map_err(&load_failed)?;

        Ok(Credential {
            private_key,
            certificate_chain,
        })
    }
}

/// First private key block in a PEM document (PKCS#8, PKCS#1 or SEC1)
pub fn parse_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>, String> {
    let blocks = pem::parse_many(pem_data).map_err(|e| format!("invalid PEM: {e}"))?;
    blocks
        .into_iter()
        .find_map(|block| match block.tag() {
            "PRIVATE KEY" => Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                block.into_contents(),
            ))),
            "RSA PRIVATE KEY" => Some(PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(
                block.into_contents(),
            ))),
            "EC PRIVATE KEY" => Some(PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(
                block.into_contents(),
            ))),
            _ => None,
        })
        .ok_or_else(|| "no private key block found".to_string())
}

/// All certificate blocks in a PEM document, in file order
pub fn parse_certificate_chain(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>, String> {
    let blocks = pem::parse_many(pem_data).map_err(|e| format!("invalid PEM: {e}"))?;
    let chain: Vec<CertificateDer<'static>> = blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| CertificateDer::from(block.into_contents()))
        .collect();

    if chain.is_empty() {
        return Err("no certificate found".to_string());
    }
    Ok(chain)
}

/// In-memory store of PEM identities keyed by alias
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    entries: HashMap<String, MemoryEntry>,
}

#[derive(Clone)]
enum MemoryEntry {
    Pem { key: String, chain: String },
    Unavailable(String),
}

impl fmt::Debug for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryEntry::Pem { .. } => f.write_str("Pem(<redacted>)"),
            MemoryEntry::Unavailable(reason) => write!(f, "Unavailable({reason})"),
        }
    }
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pem(
        mut self,
        alias: impl Into<String>,
        key_pem: impl Into<String>,
        chain_pem: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            alias.into(),
            MemoryEntry::Pem {
                key: key_pem.into(),
                chain: chain_pem.into(),
            },
        );
        self
    }

    /// Alias that exists but whose key cannot be materialized
    pub fn with_unavailable(mut self, alias: impl Into<String>, reason: impl Into<String>) -> Self {
        self.entries
            .insert(alias.into(), MemoryEntry::Unavailable(reason.into()));
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn has_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    fn load_key_and_chain(&self, alias: &str) -> Result<Credential, CredentialError> {
        let load_failed = |reason: String| CredentialError::LoadFailed {
            alias: alias.to_string(),
            reason,
        };

        match self.entries.get(alias) {
            None => Err(CredentialError::NotFound {
                alias: alias.to_string(),
            }),
            Some(MemoryEntry::Unavailable(reason)) => Err(load_failed(reason.clone())),
            Some(MemoryEntry::Pem { key, chain }) => Ok(Credential {
                private_key: parse_private_key(key.as_bytes()).map_err(&load_failed)?,
                certificate_chain: parse_certificate_chain(chain.as_bytes())
                    .map_err(&load_failed)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_alias_uses_trust_anchors_only() {
        let provider = CredentialProvider::default();
        let tls = provider.build_tls_config(None).unwrap();
        assert!(!tls.client_identity);

        let tls = provider.build_tls_config(Some("   ")).unwrap();
        assert!(!tls.client_identity);
    }

    #[test]
    fn test_unknown_alias_is_not_found() {
        let provider = CredentialProvider::default();
        let err = provider.build_tls_config(Some("laptop")).unwrap_err();
        assert_eq!(
            err,
            CredentialError::NotFound {
                alias: "laptop".to_string()
            }
        );
    }

    #[test]
    fn test_unavailable_key_is_load_failure() {
        let store = MemoryCredentialStore::new().with_unavailable("laptop", "permission revoked");
        let provider = CredentialProvider::new(Arc::new(store));
        let err = provider.build_tls_config(Some("laptop")).unwrap_err();
        assert!(matches!(err, CredentialError::LoadFailed { .. }));
        assert!(err.to_string().contains("permission revoked"));
    }

    #[test]
    fn test_garbage_pem_is_load_failure() {
        let store = MemoryCredentialStore::new().with_pem("laptop", "not a key", "not a cert");
        let provider = CredentialProvider::new(Arc::new(store));
        assert!(matches!(
            provider.build_tls_config(Some("laptop")),
            Err(CredentialError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_alias_charset() {
        assert!(is_valid_alias("laptop-01.identity_v2"));
        assert!(!is_valid_alias(""));
        assert!(!is_valid_alias(".."));
        assert!(!is_valid_alias("../etc/passwd"));
        assert!(!is_valid_alias("a/b"));
        assert!(!is_valid_alias("a b"));
    }

    #[test]
    fn test_trust_anchors_are_populated() {
        assert!(!default_trust_anchors().is_empty());
    }

    #[test]
    fn test_pem_key_tags() {
        let pkcs8 = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![1, 2, 3]));
        assert!(matches!(
            parse_private_key(pkcs8.as_bytes()),
            Ok(PrivateKeyDer::Pkcs8(_))
        ));

        let rsa = pem::encode(&pem::Pem::new("RSA PRIVATE KEY", vec![1, 2, 3]));
        assert!(matches!(
            parse_private_key(rsa.as_bytes()),
            Ok(PrivateKeyDer::Pkcs1(_))
        ));

        let ec = pem::encode(&pem::Pem::new("EC PRIVATE KEY", vec![1, 2, 3]));
        assert!(matches!(
            parse_private_key(ec.as_bytes()),
            Ok(PrivateKeyDer::Sec1(_))
        ));

        let cert_only = pem::encode(&pem::Pem::new("CERTIFICATE", vec![1, 2, 3]));
        assert!(parse_private_key(cert_only.as_bytes()).is_err());
    }

    #[test]
    fn test_chain_keeps_file_order() {
        let chain = pem::encode_many(&[
            pem::Pem::new("CERTIFICATE", vec![1]),
            pem::Pem::new("PRIVATE KEY", vec![9]),
            pem::Pem::new("CERTIFICATE", vec![2]),
        ]);
        let parsed = parse_certificate_chain(chain.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(&*parsed[0], &[1u8][..]);
        assert_eq!(&*parsed[1], &[2u8][..]);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential {
            private_key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![0xde, 0xad])),
            certificate_chain: vec![],
        };
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("222"));
    }
}
