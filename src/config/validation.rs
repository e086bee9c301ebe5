#![allow(clippy::collapsible_if)]

use std::net::SocketAddr;

use crate::config::models::{
    AuthConfig, BrokerConfig, FaceTlsConfig, GatewayConfig, SqliteConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid TLS configuration: {message}")]
    InvalidTls { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, reporting every problem at once.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for (field, address) in [
            ("server.http_addr", &config.server.http_addr),
            ("server.rpc_addr", &config.server.rpc_addr),
        ] {
            if let Err(e) = Self::validate_listen_address(field, address) {
                errors.push(e);
            }
        }

        if config.server.http_addr == config.server.rpc_addr {
            errors.push(ValidationError::InvalidField {
                field: "server.rpc_addr".to_string(),
                message: "HTTP and RPC faces cannot share a listen address".to_string(),
            });
        }

        if config.server.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "server.shutdown_timeout_secs".to_string(),
                message: "Shutdown deadline must be greater than 0".to_string(),
            });
        }

        if config.server.tls.enabled {
            if let Err(mut tls_errors) = Self::validate_face_tls(&config.server.tls) {
                errors.append(&mut tls_errors);
            }
        }

        if let Err(mut broker_errors) = Self::validate_broker(&config.broker) {
            errors.append(&mut broker_errors);
        }

        if let Err(e) = Self::validate_auth(&config.auth) {
            errors.push(e);
        }

        if config.storage.sqlite.enabled {
            if let Err(mut sqlite_errors) = Self::validate_sqlite(&config.storage.sqlite) {
                errors.append(&mut sqlite_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(field: &str, address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: format!(
                    "{field} must be in format 'IP:PORT' (e.g., '127.0.0.1:8080' or '0.0.0.0:9090')"
                ),
            });
        }
        Ok(())
    }

    fn validate_face_tls(tls: &FaceTlsConfig) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<_> = [
            ("server.tls.ca_cert", &tls.ca_cert),
            ("server.tls.server_cert", &tls.server_cert),
            ("server.tls.server_key", &tls.server_key),
        ]
        .into_iter()
        .filter(|(_, path)| path.trim().is_empty())
        .map(|(field, _)| ValidationError::InvalidTls {
            message: format!("{field} is required when server TLS is enabled"),
        })
        .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_broker(broker: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if broker.brokers.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "broker.brokers".to_string(),
            });
        }

        for (i, endpoint) in broker.brokers.iter().enumerate() {
            if let Err(e) = Self::validate_broker_endpoint(i, endpoint) {
                errors.push(e);
            }
        }

        if broker.timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "broker.timeout_secs".to_string(),
                message: "Broker timeout must be greater than 0".to_string(),
            });
        }

        if broker.security_protocol.requires_tls() {
            for (field, path) in [
                ("broker.tls.ca_cert", &broker.tls.ca_cert),
                ("broker.tls.client_cert", &broker.tls.client_cert),
                ("broker.tls.client_key", &broker.tls.client_key),
            ] {
                if path.trim().is_empty() {
                    errors.push(ValidationError::InvalidTls {
                        message: format!(
                            "{field} is required for security_protocol {}",
                            broker.security_protocol
                        ),
                    });
                }
            }
        }

        if broker.security_protocol.requires_sasl() {
            if broker.sasl.username.is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "broker.sasl.username".to_string(),
                });
            }
            if broker.sasl.password.is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "broker.sasl.password".to_string(),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_broker_endpoint(index: usize, endpoint: &str) -> ValidationResult<()> {
        let field = format!("broker.brokers[{index}]");
        let Some((host, port)) = endpoint.rsplit_once(':') else {
            return Err(ValidationError::InvalidField {
                field,
                message: format!("'{endpoint}' must be in format 'HOST:PORT'"),
            });
        };

        if host.is_empty() {
            return Err(ValidationError::InvalidField {
                field,
                message: format!("'{endpoint}' has an empty host"),
            });
        }

        if port.parse::<u16>().is_err() {
            return Err(ValidationError::InvalidField {
                field,
                message: format!("'{endpoint}' has an invalid port"),
            });
        }

        Ok(())
    }

    fn validate_auth(auth: &AuthConfig) -> ValidationResult<()> {
        if auth.enabled && auth.secret.is_empty() {
            return Err(ValidationError::MissingField {
                field: "auth.secret".to_string(),
            });
        }
        Ok(())
    }

    fn validate_sqlite(sqlite: &SqliteConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if sqlite.db_path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "storage.sqlite.db_path".to_string(),
            });
        }

        // The table name is interpolated into SQL, so it must be a plain identifier
        if !is_sql_identifier(&sqlite.table_name) {
            errors.push(ValidationError::InvalidField {
                field: "storage.sqlite.table_name".to_string(),
                message: format!(
                    "'{}' must start with a letter or '_' and contain only letters, digits and '_'",
                    sqlite.table_name
                ),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Format multiple validation errors into a readable message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("Found {} validation error(s):\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

/// Whether `name` is safe to splice into SQL as a table name.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::SecurityMode;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GatewayConfigValidator::validate(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut config = GatewayConfig::default();
        config.server.http_addr = "not-an-address".to_string();

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }

    #[test]
    fn test_faces_cannot_share_address() {
        let mut config = GatewayConfig::default();
        config.server.rpc_addr = config.server.http_addr.clone();

        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_sasl_requires_credentials() {
        let mut config = GatewayConfig::default();
        config.broker.security_protocol = SecurityMode::SaslPlaintext;

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("broker.sasl.username"));
        assert!(message.contains("broker.sasl.password"));
    }

    #[test]
    fn test_tls_mode_requires_client_material() {
        let mut config = GatewayConfig::default();
        config.broker.security_protocol = SecurityMode::Tls;
        config.broker.tls.client_key = String::new();

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("broker.tls.client_key"));
    }

    #[test]
    fn test_broker_endpoint_format() {
        let mut config = GatewayConfig::default();
        config.broker.brokers = vec!["kafka:9092".to_string(), "kafka".to_string()];

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("broker.brokers[1]"));
    }

    #[test]
    fn test_auth_requires_secret() {
        let mut config = GatewayConfig::default();
        config.auth.enabled = true;

        assert!(GatewayConfigValidator::validate(&config).is_err());

        config.auth.secret = "s3cret".to_string();
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        assert!(is_sql_identifier("kafka_messages"));
        assert!(is_sql_identifier("_m2"));
        assert!(!is_sql_identifier("2messages"));
        assert!(!is_sql_identifier("messages; DROP TABLE x"));
        assert!(!is_sql_identifier(""));

        let mut config = GatewayConfig::default();
        config.storage.sqlite.table_name = "bad-name".to_string();
        assert!(GatewayConfigValidator::validate(&config).is_err());

        // Irrelevant once the mirror is disabled
        config.storage.sqlite.enabled = false;
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_multiple_errors_are_aggregated() {
        let mut config = GatewayConfig::default();
        config.server.http_addr = "bad".to_string();
        config.broker.brokers.clear();

        let message = GatewayConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("Found 2 validation error(s)"));
    }
}
