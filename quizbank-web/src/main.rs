//! Quizbank Web Server
//!
//! Question banks, quizzes and role-based access control over a JSON API.

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Parser;
use quizbank_core::{init_logging, QuizbankConfig};
use quizbank_web::QuizbankServerBuilder;
use rand::RngCore;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "quizbank.toml";

/// Quizbank Web Server - question banks and quizzes behind role-based access control
#[derive(Parser)]
#[command(name = "quizbank-web")]
#[command(about = "JSON API for question banks and quizzes")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Database URL, e.g. sqlite:quizbank.db
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Generate and save a JWT secret when none is configured, without asking
    #[arg(long)]
    generate_secret: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = QuizbankConfig::load(Some(config_path.as_path()))?;

    // Override with command line arguments
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.database_url.clone() {
        config.database.url = url;
    }
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }

    if !config.auth.has_secret() {
        ensure_secret(&mut config, &config_path, args.generate_secret)?;
    }

    config.validate()?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let server = QuizbankServerBuilder::with_config(config)
        .build()
        .await
        .context("Failed to build server")?;
    server.start().await.context("Server failed")?;

    Ok(())
}

/// Create a secret and persist it, asking first unless `--generate-secret` was given
fn ensure_secret(config: &mut QuizbankConfig, path: &Path, assume_yes: bool) -> anyhow::Result<()> {
    if !assume_yes && !confirm("No JWT secret is configured. Generate a new JWT secret? [y/N] ")? {
        bail!("auth.jwt_secret is not set; add it to {} or set QUIZBANK__AUTH__JWT_SECRET", path.display());
    }

    config.auth.jwt_secret = generate_secret();
    config
        .save_to_file(path)
        .with_context(|| format!("Failed to save the new secret to {}", path.display()))?;
    println!("Saved a new JWT secret to {}", path.display());
    Ok(())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
