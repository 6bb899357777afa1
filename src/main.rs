//! KVK inschrijving command-line client.
//!
//! Run with: `kvk-inschrijving 12345678 --cert client.crt --key client.key --env prd`

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kvk_inschrijving::{Credential, Environment, InschrijvingClient, InschrijvingConfig};
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Retrieve an inschrijving from the KVK Handelsregister dataservice.
///
/// Answers from the local cache when possible; otherwise sends a signed
/// request over mutual TLS and caches the reply.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// KVK number to look up
    kvk_nummer: String,

    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// PEM client certificate (overrides the configured path)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// PEM private key (overrides the configured path)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Registry environment: "prd" for production, anything else pre-production
    #[arg(short, long)]
    env: Option<String>,

    /// Skip the cache for both lookup and write-back
    #[arg(long)]
    no_cache: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Decoded payload as YAML
    Yaml,
    /// Raw reply document
    Xml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("kvk-inschrijving v{}", env!("CARGO_PKG_VERSION"));

    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        InschrijvingConfig::from_yaml(&content).context("Failed to parse config file")?
    } else {
        info!(path = %args.config.display(), "Config file not found, using defaults");
        InschrijvingConfig::default()
    };

    let environment = args
        .env
        .as_deref()
        .map(Environment::from_tag)
        .unwrap_or(config.environment);
    let use_cache = config.cache.enabled && !args.no_cache;

    info!(
        environment = environment.as_str(),
        use_cache,
        cache_directory = %config.cache.directory.display(),
        soap_version = ?config.soap.version,
        "Configuration loaded"
    );

    let certificate = args.cert.clone().or_else(|| config.credentials.certificate_path.clone());
    let private_key = args.key.clone().or_else(|| config.credentials.private_key_path.clone());
    let credential = load_credential(certificate.as_deref(), private_key.as_deref())?;

    let client = InschrijvingClient::new(config);
    let result = client
        .retrieve_until(
            &args.kvk_nummer,
            &credential,
            use_cache,
            environment,
            shutdown_signal(),
        )
        .await;

    let response = match result {
        Ok(response) => response,
        Err(e) if e.is_not_found() => {
            error!(kvk_nummer = %args.kvk_nummer, "No inschrijving found");
            eprintln!("{e}");
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("Failed to retrieve inschrijving"),
    };

    match args.format {
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&response).context("Failed to serialize response")?;
            print!("{yaml}");
        }
        OutputFormat::Xml => println!("{}", response.inschrijving_xml),
    }

    let stats = client.stats();
    info!(
        cache_hits = stats.cache_hits,
        network_fetches = stats.network_fetches,
        "Done"
    );
    Ok(())
}

/// Read the credential when both paths are known. A cache hit needs none.
fn load_credential(certificate: Option<&Path>, private_key: Option<&Path>) -> Result<Credential> {
    match (certificate, private_key) {
        (Some(cert), Some(key)) => Credential::from_files(cert, key).with_context(|| {
            format!(
                "Failed to read credential from {} and {}",
                cert.display(),
                key.display()
            )
        }),
        (None, None) => Ok(Credential::empty()),
        _ => {
            warn!("Only one of certificate and private key given, ignoring both");
            Ok(Credential::empty())
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
