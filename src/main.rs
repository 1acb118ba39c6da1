//! Database dump and offsite sync tool
//!
//! Provides CLI interface for exporting a PostgreSQL database and copying the dumps to remote storage

// dumpsync/src/main.rs
mod backup;
mod config;
mod errors;
mod sync;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use sync::credentials::AuthState;
use sync::logic::UploadOutcome;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Main entry point for the dump/sync tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run_app().await {
        Ok(true) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("❌ Operation finished with failures.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs one command. `Ok(false)` means the command ran but some work failed.
async fn run_app() -> Result<bool> {
    let config_path = env::var("DUMPSYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    let args: Vec<String> = env::args().skip(1).collect();
    let (choice, argument) = if args.is_empty() {
        let input = prompt_choice()?;
        let mut parts = input.splitn(2, char::is_whitespace);
        let choice = parts.next().unwrap_or_default().to_string();
        let argument = parts.next().map(|s| s.trim().to_string());
        (choice, argument)
    } else {
        (args[0].trim().to_string(), args.get(1).cloned())
    };

    match choice.as_str() {
        "1" | "dump" => {
            println!("🚀 Starting Export...");
            let artifact = backup::run_capture_flow(&app_config).await.context("Export failed")?;
            println!(
                "📦 Created {} ({}, {})",
                artifact.path.display(),
                artifact.format_size(),
                artifact.format_created_at()
            );
        }
        "2" | "list" => {
            let artifacts = backup::run_list_flow(&app_config).context("Listing backups failed")?;
            if artifacts.is_empty() {
                println!("No backups found in {}", app_config.backup_root().display());
            }
            for artifact in artifacts {
                println!(
                    "{}  {:>10}  {}  [{}]",
                    artifact.format_created_at(),
                    artifact.format_size(),
                    artifact.name,
                    artifact.bucket
                );
            }
        }
        "3" | "upload-last" => {
            println!("☁️ Uploading latest backup...");
            let (artifact, outcome) = sync::run_sync_latest_flow(&app_config)
                .await
                .context("Upload of latest backup failed")?;
            print_upload(&artifact.name, &outcome);
        }
        "4" | "upload-all" => {
            println!("☁️ Uploading all backups...");
            let report = sync::run_sync_all_flow(&app_config).await.context("Sync failed")?;
            println!("{}", report);
            return Ok(report.is_success());
        }
        "5" | "upload" => {
            let id = match argument.filter(|a| !a.is_empty()) {
                Some(id) => id,
                None => anyhow::bail!("'upload' needs a backup file name, e.g. upload shop_20240309_031542.sql"),
            };
            println!("☁️ Uploading {}...", id);
            let (artifact, outcome) = sync::run_sync_one_flow(&app_config, &id)
                .await
                .context("Upload failed")?;
            print_upload(&artifact.name, &outcome);
        }
        "6" | "auth-url" => {
            let url = sync::authorization_url(&app_config)?;
            println!("🔑 Open this URL, grant access, then run `auth <code>`:\n{}", url);
        }
        "7" | "auth" => {
            let code = match argument.filter(|a| !a.is_empty()) {
                Some(code) => code,
                None => anyhow::bail!("'auth' needs the authorization code returned by the consent page"),
            };
            sync::run_authorize_flow(&app_config, &code)
                .await
                .context("Authorization failed")?;
            println!("🔑 Credential saved to {}", app_config.remote.token_path.display());
        }
        "8" | "status" => match sync::auth_state(&app_config) {
            AuthState::Authenticated => println!("🔑 Authenticated ({})", app_config.remote.token_path.display()),
            AuthState::Unauthenticated => println!("🔒 Not authenticated. Run `auth-url` to start."),
        },
        _ => {
            println!("❌ Invalid choice. Run with one of: dump, list, upload-last, upload-all, upload <id>, auth-url, auth <code>, status.");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(true)
}

fn print_upload(file_name: &str, outcome: &UploadOutcome) {
    match outcome {
        UploadOutcome::Uploaded { remote_id } => println!("⬆️ Uploaded {} ({})", file_name, remote_id),
        UploadOutcome::AlreadyPresent => println!("⏭️ {} is already on the remote", file_name),
    }
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String (command plus optional argument)
fn prompt_choice() -> Result<String> {
    use std::io::{stdin, stdout, Write};

    println!("Select an operation:");
    println!("1. Export database (or type 'dump')");
    println!("2. List local backups (or type 'list')");
    println!("3. Upload latest backup (or type 'upload-last')");
    println!("4. Upload all backups (or type 'upload-all')");
    println!("5. Upload one backup (type 'upload <file name>')");
    println!("6. Print authorization URL (or type 'auth-url')");
    println!("7. Complete authorization (type 'auth <code>')");
    println!("8. Show authorization status (or type 'status')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
