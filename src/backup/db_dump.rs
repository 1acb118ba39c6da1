// dumpsync/src/backup/db_dump.rs
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::artifact::BackupArtifact;
use crate::config::{DatabaseConfig, DumpTarget, ExportConfig};
use crate::errors::{ExportFailure, Result};
use crate::utils::find_executable;

/// Fully resolved invocation of the dump utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

/// Runs a [`DumpCommand`] with its stdout redirected into `stdout`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &DumpCommand,
        stdout: File,
        timeout: Duration,
    ) -> std::result::Result<ProcessOutcome, ExportFailure>;
}

/// Spawns the real process through `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &DumpCommand,
        stdout: File,
        timeout: Duration,
    ) -> std::result::Result<ProcessOutcome, ExportFailure> {
        let program_path = find_executable(&command.program).map_err(|e| ExportFailure::Start {
            program: command.program.clone(),
            reason: format!("{:#}", e),
        })?;

        let child = Command::new(&program_path)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportFailure::Start {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| ExportFailure::Wait {
                program: command.program.clone(),
                source,
            })?,
            Err(_) => return Err(ExportFailure::TimedOut(timeout.as_secs())),
        };

        Ok(ProcessOutcome {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

const DUMP_FLAGS: &[&str] = &["-v", "--data-only", "--column-inserts", "--disable-triggers"];

/// Builds the dump invocation. The password only ever travels in the environment.
pub fn build_dump_command(database: &DatabaseConfig) -> DumpCommand {
    let password_env = vec![("PGPASSWORD".to_string(), database.password.clone())];
    let identity = [
        "-U".to_string(),
        database.user.clone(),
        "-d".to_string(),
        database.name.clone(),
    ];

    match &database.target {
        DumpTarget::Container(container) => {
            let mut args: Vec<String> = vec![
                "exec".into(),
                "-e".into(),
                "PGPASSWORD".into(),
                container.clone(),
                "pg_dump".into(),
            ];
            args.extend(DUMP_FLAGS.iter().map(|f| f.to_string()));
            args.extend(identity);
            DumpCommand { program: "docker".to_string(), args, env: password_env }
        }
        DumpTarget::Host { host, port } => {
            let mut args: Vec<String> = DUMP_FLAGS.iter().map(|f| f.to_string()).collect();
            args.extend(["-h".to_string(), host.clone(), "-p".to_string(), port.to_string()]);
            args.extend(identity);
            DumpCommand { program: "pg_dump".to_string(), args, env: password_env }
        }
    }
}

/// `{root}/{YYYY-MM-DD}/{db}_{YYYYMMDD_HHMMSS}.sql`
pub fn artifact_path(root: &Path, db_name: &str, at: DateTime<Local>) -> PathBuf {
    root.join(date_bucket_name(at))
        .join(format!("{}_{}.sql", db_name, at.format("%Y%m%d_%H%M%S")))
}

pub fn date_bucket_name(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// A failed dump must not leave a file the catalog would list as a backup.
fn discard_partial_output(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(file = %path.display(), error = %e, "Could not remove partial dump output");
    }
}

/// Produces one export artifact per call using an injectable process runner.
pub struct Exporter<R: CommandRunner> {
    runner: R,
}

impl Exporter<ProcessRunner> {
    pub fn new() -> Self {
        Self { runner: ProcessRunner }
    }
}

impl Default for Exporter<ProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> Exporter<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    pub async fn capture(&self, config: &ExportConfig) -> Result<BackupArtifact> {
        self.capture_at(config, Local::now()).await
    }

    pub async fn capture_at(&self, config: &ExportConfig, at: DateTime<Local>) -> Result<BackupArtifact> {
        let bucket = date_bucket_name(at);
        let bucket_dir = config.backup_root.join(&bucket);
        fs::create_dir_all(&bucket_dir).map_err(|source| ExportFailure::DirectoryCreation {
            path: bucket_dir.clone(),
            source,
        })?;
        debug!(dir = %bucket_dir.display(), "Backup directory ready");

        let output_path = artifact_path(&config.backup_root, &config.database.name, at);
        // create_new: an earlier export with the same stamp is never clobbered.
        let output_file = File::options()
            .write(true)
            .create_new(true)
            .open(&output_path)
            .map_err(|source| ExportFailure::FileCreation {
                path: output_path.clone(),
                source,
            })?;

        let command = build_dump_command(&config.database);
        info!(
            program = %command.program,
            database = %config.database.name,
            file = %output_path.display(),
            "Running database dump"
        );

        let outcome = match self.runner.run(&command, output_file, config.timeout).await {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => {
                warn!(code = ?outcome.code, stderr = %outcome.stderr, "Dump process failed");
                discard_partial_output(&output_path);
                return Err(ExportFailure::NonZeroExit {
                    code: outcome.code,
                    stderr: outcome.stderr,
                }
                .into());
            }
            Err(failure) => {
                warn!(error = %failure, "Dump process did not complete");
                discard_partial_output(&output_path);
                return Err(failure.into());
            }
        };
        if !outcome.stderr.is_empty() {
            debug!(stderr = %outcome.stderr, "Dump diagnostics");
        }

        let metadata = fs::metadata(&output_path).map_err(|source| ExportFailure::MissingOutput {
            path: output_path.clone(),
            source,
        })?;
        let created_at = metadata
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or(at);

        let file_name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let artifact = BackupArtifact {
            id: file_name.clone(),
            name: file_name,
            path: output_path,
            bucket,
            size_bytes: metadata.len(),
            created_at,
            uploaded: false,
        };
        info!(
            file = %artifact.path.display(),
            bytes = artifact.size_bytes,
            size = %artifact.format_size(),
            "✓ Database dump completed"
        );
        Ok(artifact)
    }
}
