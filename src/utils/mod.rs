use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Finds an external executable (`docker`, `pg_dump`) in the system PATH.
pub fn find_executable(program: &str) -> Result<PathBuf> {
    which(program).with_context(|| {
        format!(
            "{} executable not found in PATH. Please ensure it is installed and in your PATH.",
            program
        )
    })
}
