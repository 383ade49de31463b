//! Loads the TLS certificate/key pair used by the content server.
//!
//! When no `tls.cert_path`/`tls.key_path` is configured, an embedded self-signed
//! development certificate is used instead, so the server always has something to bind
//! with out of the box.

use std::io::BufReader;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use edged_core::EdgedConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::TlsError;

const EMBEDDED_DEV_CERT: &[u8] = include_bytes!("../certs/dev_cert.pem");
const EMBEDDED_DEV_KEY: &[u8] = include_bytes!("../certs/dev_key.pem");

/// Builds an `axum-server` rustls configuration from the configured cert/key paths, or
/// falls back to the embedded development certificate when neither is set.
pub async fn load_rustls_config(config: &EdgedConfig) -> Result<RustlsConfig, TlsError> {
    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            validate_pem_pair(cert_path, key_path).await?;
            RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|err| TlsError::ConfigurationError(err.to_string()))
        }
        (None, None) => RustlsConfig::from_pem(
            EMBEDDED_DEV_CERT.to_vec(),
            EMBEDDED_DEV_KEY.to_vec(),
        )
        .await
        .map_err(|err| TlsError::ConfigurationError(err.to_string())),
        _ => Err(TlsError::ConfigurationError(
            "both tls.cert_path and tls.key_path must be set together".to_string(),
        )),
    }
}

async fn validate_pem_pair(cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    load_certificates(cert_path).await?;
    load_private_key(key_path).await?;
    Ok(())
}

async fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    if !path.exists() {
        return Err(TlsError::CertificateNotFound(path.to_path_buf()));
    }
    let pem_data = tokio::fs::read(path).await?;
    let mut reader = BufReader::new(&pem_data[..]);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| TlsError::CertificateParseFailed(err.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::CertificateParseFailed(
            "no certificates found in file".to_string(),
        ));
    }
    Ok(certs)
}

async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    if !path.exists() {
        return Err(TlsError::PrivateKeyNotFound(path.to_path_buf()));
    }
    let pem_data = tokio::fs::read(path).await?;

    let mut reader = BufReader::new(&pem_data[..]);
    let pkcs8_keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| TlsError::PrivateKeyParseFailed(err.to_string()))?;

    if !pkcs8_keys.is_empty() {
        if pkcs8_keys.len() > 1 {
            return Err(TlsError::MultiplePrivateKeysFound);
        }
        return Ok(PrivateKeyDer::from(pkcs8_keys.into_iter().next().unwrap()));
    }

    let mut reader = BufReader::new(&pem_data[..]);
    let rsa_keys = rustls_pemfile::rsa_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| TlsError::PrivateKeyParseFailed(err.to_string()))?;

    if rsa_keys.is_empty() {
        return Err(TlsError::NoPrivateKeysFound);
    }
    if rsa_keys.len() > 1 {
        return Err(TlsError::MultiplePrivateKeysFound);
    }
    Ok(PrivateKeyDer::from(rsa_keys.into_iter().next().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ensure_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    async fn write_embedded_cert_pair() -> TempDir {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("cert.pem"), EMBEDDED_DEV_CERT)
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("key.pem"), EMBEDDED_DEV_KEY)
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn loads_certificate_and_key_from_disk() {
        let dir = write_embedded_cert_pair().await;
        let certs = load_certificates(&dir.path().join("cert.pem")).await.unwrap();
        assert_eq!(certs.len(), 1);

        let key = load_private_key(&dir.path().join("key.pem")).await.unwrap();
        assert!(!key.secret_der().is_empty());
    }

    #[tokio::test]
    async fn missing_certificate_file_is_reported() {
        let result = load_certificates(Path::new("/nonexistent/cert.pem")).await;
        assert!(matches!(result, Err(TlsError::CertificateNotFound(_))));
    }

    #[tokio::test]
    async fn missing_key_file_is_reported() {
        let result = load_private_key(Path::new("/nonexistent/key.pem")).await;
        assert!(matches!(result, Err(TlsError::PrivateKeyNotFound(_))));
    }

    #[tokio::test]
    async fn embedded_default_certificate_loads_without_configured_paths() {
        ensure_crypto_provider();
        let config = EdgedConfig {
            content_directory: std::path::PathBuf::from("/tmp/edged-content"),
            content_port: 8080,
            control_protocol: "http".to_string(),
            control_hostname: "localhost".to_string(),
            control_port: 3001,
            p2p_seed_node_address: "127.0.0.1".to_string(),
            p2p_seed_node_port: 7947,
            override_ip: None,
            disable_auto_join: true,
            disable_heartbeat: true,
            disable_ip_discovery: true,
            log_level: "info".to_string(),
            log_pretty: false,
            tls_cert_path: None,
            tls_key_path: None,
        };

        load_rustls_config(&config)
            .await
            .expect("embedded development certificate should load");
    }
}
