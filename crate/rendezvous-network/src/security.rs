use anyhow::Context as _;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

pub use rustls::crypto::aws_lc_rs::default_provider;

/// Create a TlsAcceptor (server-side) from PEM-encoded files.
///
/// `cert` holds the certificate chain, leaf first; `key` the private
/// key matching the leaf. Clients are not asked for a certificate.
pub fn make_tls_acceptor(cert: &Path, key: &Path) -> anyhow::Result<TlsAcceptor> {
    let chain = load_certificates(cert)?;
    let key = PrivateKeyDer::from_pem_file(key)
        .with_context(|| format!("{}: failed to read private key", key.display()))?;

    let config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .context("certificate and private key don't match")?;
    log::debug!("TLS enabled with certificate {}", cert.display());

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Create a TlsConnector (client-side) that trusts the certificates
/// in the given PEM file.
pub fn make_tls_connector(trusted: &Path) -> anyhow::Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(trusted)? {
        roots
            .add(cert)
            .with_context(|| format!("{}: unusable certificate", trusted.display()))?;
    }
    let config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

fn load_certificates(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .with_context(|| format!("{}: failed to open certificate file", path.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("{}: invalid PEM certificate", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("{}: no certificate found", path.display());
    }

    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use std::path::PathBuf;

    fn resources() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../resources/test")
    }

    #[test]
    fn acceptor_from_pem_files() -> anyhow::Result<()> {
        let dir = resources();
        make_tls_acceptor(&dir.join("localhost.crt"), &dir.join("localhost.key"))?;

        Ok(())
    }

    #[test]
    fn connector_from_ca() -> anyhow::Result<()> {
        make_tls_connector(&resources().join("ca.crt"))?;

        Ok(())
    }

    #[test]
    fn missing_files() {
        let dir = resources();
        assert!(make_tls_acceptor(&dir.join("doesnotexist.crt"), &dir.join("localhost.key")).is_err());
        assert!(make_tls_acceptor(&dir.join("localhost.crt"), &dir.join("doesnotexist.key")).is_err());
    }

    #[test]
    fn empty_certificate_file() -> anyhow::Result<()> {
        let tempdir = TempDir::new()?;
        let empty = tempdir.child("empty.crt");
        empty.write_str("")?;

        let err = make_tls_acceptor(empty.path(), &resources().join("localhost.key"))
            .err()
            .expect("empty certificate must be rejected");
        assert!(err.to_string().contains("no certificate found"));

        Ok(())
    }
}
