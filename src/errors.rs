use std::path::PathBuf;
use thiserror::Error;

/// Why a single export attempt failed. None of these are retried.
#[derive(Error, Debug)]
pub enum ExportFailure {
    #[error("could not create backup directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create output file {path}: {source}")]
    FileCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not start `{program}`: {reason}")]
    Start { program: String, reason: String },

    #[error("dump process exited with {}: {stderr}", describe_exit_code(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("lost track of running `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dump output missing at {path}: {source}")]
    MissingOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dump process did not finish within {0} seconds")]
    TimedOut(u64),
}

fn describe_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Failure reported by a remote storage backend before the sync logic scopes it.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("S3 SDK error: {0}")]
    S3Sdk(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected remote response: {0}")]
    Protocol(String),

    #[error("remote call did not finish within {0} seconds")]
    TimedOut(u64),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    Export(#[from] ExportFailure),

    #[error("Could not read backup directory {path}: {source}")]
    CatalogReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup not found: {0}")]
    ArtifactNotFound(String),

    #[error("No backups found in {0}")]
    NoBackupsFound(PathBuf),

    #[error("No stored credential, authorize remote access first: {0}")]
    CredentialMissing(String),

    #[error("Credential exchange failed: {0}")]
    CredentialExchangeFailed(String),

    #[error("Could not resolve remote folder '{name}': {source}")]
    RemoteFolderResolutionFailed {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("Could not check whether '{file}' exists remotely: {source}")]
    RemoteExistenceCheckFailed {
        file: String,
        #[source]
        source: RemoteError,
    },

    #[error("Could not upload '{file}': {source}")]
    RemoteUploadFailed {
        file: String,
        #[source]
        source: RemoteError,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_message_includes_stderr() {
        let err = AppError::from(ExportFailure::NonZeroExit {
            code: Some(1),
            stderr: "pg_dump: error: connection refused".to_string(),
        });
        let message = err.to_string();
        assert!(message.contains("code 1"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_wait_failure_is_not_called_a_start_failure() {
        let err = ExportFailure::Wait {
            program: "docker".to_string(),
            source: std::io::Error::other("broken pipe"),
        };
        let message = err.to_string();
        assert!(!message.contains("could not start"));
        assert!(message.contains("docker"));
    }

    #[test]
    fn test_signal_exit_is_described() {
        let err = ExportFailure::NonZeroExit { code: None, stderr: String::new() };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
