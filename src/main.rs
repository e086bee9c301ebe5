use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use kafka_gateway::{
    adapters::{KafkaConnector, KafkaSettings},
    config::{GatewayConfigValidator, loader::load_config, models::GatewayConfig},
    supervisor::Supervisor,
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Start the gateway (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {config_path}"))?;
    GatewayConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    tracing::info!(
        config = config_path,
        http_addr = %config.server.http_addr,
        rpc_addr = %config.server.rpc_addr,
        brokers = ?config.broker.brokers,
        security_protocol = %config.broker.security_protocol,
        "Starting Kafka gateway"
    );

    let connector = Arc::new(KafkaConnector::new(KafkaSettings::from(&config.broker)));
    Supervisor::new(config, connector).run().await?;

    tracing::info!("Kafka gateway stopped");
    Ok(())
}

async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            print_summary(&config);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Use host:port listen addresses (e.g., '0.0.0.0:8080')");
            println!("   • Give the HTTP and RPC faces different ports");
            println!("   • Set sasl.username/sasl.password for SASL_* protocols");
            println!("   • Use a plain identifier for storage.sqlite.table_name");
            std::process::exit(1);
        }
    }
}

fn print_summary(config: &GatewayConfig) {
    println!("📋 Configuration Summary:");
    println!("   • HTTP Address: {}", config.server.http_addr);
    println!("   • RPC Address: {}", config.server.rpc_addr);
    println!("   • Face TLS Enabled: {}", config.server.tls.enabled);
    println!("   • Brokers: {}", config.broker.brokers.join(", "));
    println!("   • Security Protocol: {}", config.broker.security_protocol);
    println!("   • Bearer Auth Enabled: {}", config.auth.enabled);
    println!("   • SQLite Mirror Enabled: {}", config.storage.sqlite.enabled);
    println!(
        "   • OTLP Export: {}",
        config.telemetry.otlp_endpoint.as_deref().unwrap_or("disabled")
    );
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Kafka Gateway Configuration

server:
  http_addr: "0.0.0.0:8080"
  rpc_addr: "0.0.0.0:9090"
  shutdown_timeout_secs: 5
  # Mutual TLS for both faces
  tls:
    enabled: false
    ca_cert: "certs/ca/ca.crt"
    server_cert: "certs/server/server.crt"
    server_key: "certs/server/server.key"

broker:
  brokers: ["localhost:9092"]
  client_id: "kafka-gateway"
  # PLAINTEXT | TLS | SASL_PLAINTEXT | SASL_SSL
  security_protocol: "PLAINTEXT"
  tls:
    ca_cert: "certs/ca/ca.crt"
    client_cert: "certs/client/client.crt"
    client_key: "certs/client/client.key"
  sasl:
    # PLAIN | SCRAM-SHA-256 | SCRAM-SHA-512
    mechanism: "PLAIN"
    username: ""
    password: ""
  timeout_secs: 10
  metadata_retries: 3
  metadata_retry_backoff_ms: 1000

# Static bearer token on the HTTP face
auth:
  enabled: false
  secret: ""

storage:
  sqlite:
    enabled: true
    db_path: "./data/messages.db"
    table_name: "kafka_messages"

logging:
  level: "info"
  json: true

telemetry:
  service_name: "kafka-gateway"
  # otlp_endpoint: "http://localhost:4317"
  export_interval_secs: 30
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'kafka-gateway serve --config {config_path}' to start the gateway");
    Ok(())
}
