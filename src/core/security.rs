//! Broker credential material.
//!
//! The material is resolved strictly from the configured [`SecurityMode`]:
//! TLS modes read the CA and client certificate files, SASL modes take the
//! username/password/mechanism triple, and nothing else is looked at. The bytes
//! stay opaque here; turning them into a rustls config is the connector's job.
use std::fmt;

use crate::{
    config::models::{BrokerConfig, SaslMechanism, SecurityMode},
    ports::broker::{BrokerError, BrokerResult},
};

/// PEM encoded CA bundle and client identity.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_pem", &format_args!("{} bytes", self.ca_pem.len()))
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a connector needs to authenticate, per security mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityMaterial {
    Plaintext,
    Tls(TlsMaterial),
    SaslPlaintext(SaslCredentials),
    SaslSsl {
        tls: TlsMaterial,
        sasl: SaslCredentials,
    },
}

impl SecurityMaterial {
    /// Read the material the configured mode requires.
    pub async fn load(config: &BrokerConfig) -> BrokerResult<Self> {
        let material = match config.security_protocol {
            SecurityMode::Plaintext => SecurityMaterial::Plaintext,
            SecurityMode::Tls => SecurityMaterial::Tls(Self::load_tls(config).await?),
            SecurityMode::SaslPlaintext => {
                SecurityMaterial::SaslPlaintext(Self::sasl_credentials(config)?)
            }
            SecurityMode::SaslSsl => SecurityMaterial::SaslSsl {
                tls: Self::load_tls(config).await?,
                sasl: Self::sasl_credentials(config)?,
            },
        };

        tracing::debug!(mode = %material.mode(), "Broker security material resolved");
        Ok(material)
    }

    pub fn mode(&self) -> SecurityMode {
        match self {
            SecurityMaterial::Plaintext => SecurityMode::Plaintext,
            SecurityMaterial::Tls(_) => SecurityMode::Tls,
            SecurityMaterial::SaslPlaintext(_) => SecurityMode::SaslPlaintext,
            SecurityMaterial::SaslSsl { .. } => SecurityMode::SaslSsl,
        }
    }

    pub fn tls(&self) -> Option<&TlsMaterial> {
        match self {
            SecurityMaterial::Tls(tls) | SecurityMaterial::SaslSsl { tls, .. } => Some(tls),
            _ => None,
        }
    }

    pub fn sasl(&self) -> Option<&SaslCredentials> {
        match self {
            SecurityMaterial::SaslPlaintext(sasl) | SecurityMaterial::SaslSsl { sasl, .. } => {
                Some(sasl)
            }
            _ => None,
        }
    }

    async fn load_tls(config: &BrokerConfig) -> BrokerResult<TlsMaterial> {
        Ok(TlsMaterial {
            ca_pem: read_pem("CA certificate", &config.tls.ca_cert).await?,
            cert_pem: read_pem("client certificate", &config.tls.client_cert).await?,
            key_pem: read_pem("client key", &config.tls.client_key).await?,
        })
    }

    fn sasl_credentials(config: &BrokerConfig) -> BrokerResult<SaslCredentials> {
        if config.sasl.username.is_empty() || config.sasl.password.is_empty() {
            return Err(BrokerError::InvalidSecurityMaterial(format!(
                "security_protocol {} requires SASL username and password",
                config.security_protocol
            )));
        }
        Ok(SaslCredentials {
            mechanism: config.sasl.mechanism,
            username: config.sasl.username.clone(),
            password: config.sasl.password.clone(),
        })
    }
}

async fn read_pem(what: &str, path: &str) -> BrokerResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        BrokerError::InvalidSecurityMaterial(format!("failed to read {what} '{path}': {e}"))
    })
}
