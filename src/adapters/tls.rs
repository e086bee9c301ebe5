//! PEM loading and rustls configuration for both faces and the broker link.
use std::{io::BufReader, sync::Arc};

use eyre::{Result, WrapErr};
use rustls::{
    ClientConfig, RootCertStore, ServerConfig,
    crypto::CryptoProvider,
    pki_types::{CertificateDer, PrivateKeyDer},
    server::WebPkiClientVerifier,
};
use tonic::transport::{Certificate, Identity, ServerTlsConfig};

use crate::{
    config::models::FaceTlsConfig,
    core::security::TlsMaterial,
    ports::broker::{BrokerError, BrokerResult},
};

/// Mutual-TLS material shared by the HTTP and RPC faces.
#[derive(Clone)]
pub struct FaceTls {
    ca_pem: Vec<u8>,
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl FaceTls {
    /// Read CA, server certificate and key. Any failure is fatal to startup.
    pub async fn load(config: &FaceTlsConfig) -> Result<Self> {
        let ca_pem = tokio::fs::read(&config.ca_cert)
            .await
            .wrap_err_with(|| format!("Failed to read CA certificate '{}'", config.ca_cert))?;
        let cert_pem = tokio::fs::read(&config.server_cert)
            .await
            .wrap_err_with(|| {
                format!("Failed to read server certificate '{}'", config.server_cert)
            })?;
        let key_pem = tokio::fs::read(&config.server_key)
            .await
            .wrap_err_with(|| format!("Failed to read server key '{}'", config.server_key))?;

        let tls = Self {
            ca_pem,
            cert_pem,
            key_pem,
        };
        // Parse once up front so bad PEM is reported before any listener binds
        tls.http_server_config()?;
        Ok(tls)
    }

    pub fn from_pem(ca_pem: Vec<u8>, cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self {
            ca_pem,
            cert_pem,
            key_pem,
        }
    }

    /// rustls server config requiring a client certificate signed by the CA.
    pub fn http_server_config(&self) -> Result<Arc<ServerConfig>> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let roots = root_store(&self.ca_pem)?;
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .wrap_err("Failed to build client certificate verifier")?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .wrap_err("Failed to select TLS protocol versions")?
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                parse_certs(&self.cert_pem)?,
                parse_private_key(&self.key_pem)?,
            )
            .wrap_err("Invalid server certificate or key")?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Arc::new(config))
    }

    /// tonic server TLS settings with the same mutual-TLS requirement.
    pub fn rpc_server_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(Identity::from_pem(&self.cert_pem, &self.key_pem))
            .client_ca_root(Certificate::from_pem(&self.ca_pem))
    }
}

impl std::fmt::Debug for FaceTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceTls").finish_non_exhaustive()
    }
}

/// rustls client config presenting the client certificate to the brokers.
pub fn broker_client_config(material: &TlsMaterial) -> BrokerResult<Arc<ClientConfig>> {
    let provider: Arc<CryptoProvider> = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let roots = root_store(&material.ca_pem)?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| BrokerError::InvalidSecurityMaterial(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(
            parse_certs(&material.cert_pem)?,
            parse_private_key(&material.key_pem)?,
        )
        .map_err(|e| {
            BrokerError::InvalidSecurityMaterial(format!("invalid client certificate or key: {e}"))
        })?;

    Ok(Arc::new(config))
}

fn root_store(ca_pem: &[u8]) -> BrokerResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(parse_certs(ca_pem)?);
    if added == 0 {
        return Err(BrokerError::InvalidSecurityMaterial(
            "no usable CA certificate found".into(),
        ));
    }
    Ok(roots)
}

fn parse_certs(pem: &[u8]) -> BrokerResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BrokerError::InvalidSecurityMaterial(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(BrokerError::InvalidSecurityMaterial(
            "no certificate found in PEM".into(),
        ));
    }
    Ok(certs)
}

fn parse_private_key(pem: &[u8]) -> BrokerResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| BrokerError::InvalidSecurityMaterial(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| BrokerError::InvalidSecurityMaterial("no private key found in PEM".into()))
}
