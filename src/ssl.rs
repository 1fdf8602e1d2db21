//! SSL/TLS support for ClickHouse connections
//!
//! This module is only available when the `tls` feature is enabled.

use rustls::client::{
    ServerCertVerified,
    ServerCertVerifier,
};
use rustls::{
    Certificate,
    ClientConfig,
    PrivateKey,
    RootCertStore,
    ServerName,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::{
    Error,
    Result,
};

/// SSL/TLS configuration options
#[derive(Clone, Debug)]
pub struct SSLOptions {
    /// Path to CA certificate file(s)
    pub ca_cert_paths: Vec<PathBuf>,
    /// Path to CA certificate directory
    pub ca_cert_directory: Option<PathBuf>,
    /// Use system default CA certificates
    pub use_system_certs: bool,
    /// Path to client certificate (for mutual TLS)
    pub client_cert_path: Option<PathBuf>,
    /// Path to client private key (for mutual TLS)
    pub client_key_path: Option<PathBuf>,
    /// Skip certificate verification (INSECURE - for testing only)
    pub skip_verification: bool,
    /// Enable SNI (Server Name Indication)
    pub use_sni: bool,
    /// Server name for SNI and verification (if different from host)
    pub server_name: Option<String>,
}

impl Default for SSLOptions {
    fn default() -> Self {
        Self {
            ca_cert_paths: Vec::new(),
            ca_cert_directory: None,
            use_system_certs: true,
            client_cert_path: None,
            client_key_path: None,
            skip_verification: false,
            use_sni: true,
            server_name: None,
        }
    }
}

fn tls_error(what: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Tls(format!("Failed to {} {:?}: {}", what, path, e))
}

fn read_certs(path: &Path) -> Result<Vec<Certificate>> {
    let file = File::open(path).map_err(|e| tls_error("open", path, e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .map_err(|e| tls_error("parse certificates in", path, e))?;
    Ok(certs.into_iter().map(Certificate).collect())
}

fn read_private_key(path: &Path) -> Result<PrivateKey> {
    let file = File::open(path).map_err(|e| tls_error("open", path, e))?;
    let mut reader = BufReader::new(file);
    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| tls_error("parse key in", path, e))?
        {
            Some(rustls_pemfile::Item::PKCS8Key(key))
            | Some(rustls_pemfile::Item::RSAKey(key))
            | Some(rustls_pemfile::Item::ECKey(key)) => {
                return Ok(PrivateKey(key))
            }
            Some(_) => continue,
            None => {
                return Err(Error::Tls(format!(
                    "No private key found in {:?}",
                    path
                )))
            }
        }
    }
}

/// Accepts any server certificate.
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

impl SSLOptions {
    /// Create new SSL options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a CA certificate file
    pub fn add_ca_cert(mut self, path: PathBuf) -> Self {
        self.ca_cert_paths.push(path);
        self
    }

    /// Set CA certificate directory
    pub fn ca_cert_directory(mut self, path: PathBuf) -> Self {
        self.ca_cert_directory = Some(path);
        self
    }

    /// Enable/disable system certificates
    pub fn use_system_certs(mut self, enabled: bool) -> Self {
        self.use_system_certs = enabled;
        self
    }

    /// Set client certificate (for mutual TLS)
    pub fn client_cert(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.client_cert_path = Some(cert_path);
        self.client_key_path = Some(key_path);
        self
    }

    /// Skip certificate verification (INSECURE - for testing only)
    pub fn skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }

    /// Enable/disable SNI
    pub fn use_sni(mut self, enabled: bool) -> Self {
        self.use_sni = enabled;
        self
    }

    /// Set server name for SNI
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut root_store = RootCertStore::empty();

        if self.use_system_certs {
            let certs = rustls_native_certs::load_native_certs().map_err(|e| {
                Error::Tls(format!("Failed to load system certs: {}", e))
            })?;
            // Some platform stores carry certificates rustls can't parse.
            let (_, ignored) = root_store.add_parsable_certificates(
                &certs.into_iter().map(|c| c.0).collect::<Vec<_>>(),
            );
            if ignored > 0 {
                tracing::debug!(ignored, "Skipped unparsable system certificates");
            }
        }

        for path in &self.ca_cert_paths {
            for cert in read_certs(path)? {
                root_store.add(&cert).map_err(|e| {
                    tls_error("add CA certificate from", path, e)
                })?;
            }
        }

        if let Some(dir) = &self.ca_cert_directory {
            let entries = std::fs::read_dir(dir)
                .map_err(|e| tls_error("read CA directory", dir, e))?;
            for entry in entries {
                let path = entry
                    .map_err(|e| tls_error("read CA directory", dir, e))?
                    .path();
                if !path.is_file() {
                    continue;
                }
                // Directories often hold non-certificate files too.
                if let Ok(certs) = read_certs(&path) {
                    for cert in certs {
                        let _ = root_store.add(&cert);
                    }
                }
            }
        }

        Ok(root_store)
    }

    /// Build a rustls ClientConfig from these options
    pub fn build_client_config(&self) -> Result<Arc<ClientConfig>> {
        let builder = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(self.root_store()?);

        let mut config = match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert_path), Some(key_path)) => builder
                .with_client_auth_cert(
                    read_certs(cert_path)?,
                    read_private_key(key_path)?,
                )
                .map_err(|e| {
                    Error::Tls(format!("Failed to set client auth: {}", e))
                })?,
            _ => builder.with_no_client_auth(),
        };

        if self.skip_verification {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerification));
        }
        config.enable_sni = self.use_sni;

        Ok(Arc::new(config))
    }

    /// Run the TLS handshake over an established TCP stream.
    pub async fn connect(
        &self,
        host: &str,
        stream: TcpStream,
    ) -> Result<TlsStream<TcpStream>> {
        let name = self.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(name).map_err(|e| {
            Error::Tls(format!("Invalid server name '{}': {}", name, e))
        })?;
        TlsConnector::from(self.build_client_config()?)
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::Tls(format!("TLS handshake with {} failed: {}", name, e)))
    }
}
