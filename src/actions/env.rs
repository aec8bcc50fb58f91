//! Hand values to later workflow steps.
//!
//! Exported variables are appended as `KEY=value` lines to the env file
//! (`GITHUB_ENV`), step outputs to the output file (`GITHUB_OUTPUT`). Without
//! a file the value is only logged, which is what local runs want.

use crate::error::Result;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Export `name=value` to subsequent steps.
pub async fn export_variable(env_file: Option<&Path>, name: &str, value: &str) -> Result<()> {
    log::info!("export {}={}", name, value);
    append_line(env_file, name, value).await
}

/// Export a variable whose value must not appear in logs.
pub async fn export_secret(env_file: Option<&Path>, name: &str, value: &str) -> Result<()> {
    log::info!("export {}=***", name);
    append_line(env_file, name, value).await
}

/// Set step output `name`.
pub async fn set_output(output_file: Option<&Path>, name: &str, value: &str) -> Result<()> {
    log::info!("output {}={}", name, value);
    append_line(output_file, name, value).await
}

async fn append_line(file: Option<&Path>, name: &str, value: &str) -> Result<()> {
    let Some(file) = file else {
        return Ok(());
    };

    let mut handle = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .await?;
    handle
        .write_all(format!("{name}={value}\n").as_bytes())
        .await?;
    handle.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("env");

        export_variable(Some(&env), "BUILD_TYPE", "Release").await.unwrap();
        export_variable(Some(&env), "BUILD_ARCH", "arm64").await.unwrap();

        let content = tokio::fs::read_to_string(&env).await.unwrap();
        assert_eq!(content, "BUILD_TYPE=Release\nBUILD_ARCH=arm64\n");
    }

    #[tokio::test]
    async fn test_missing_file_only_logs() {
        set_output(None, "cache-key", "x").await.unwrap();
    }
}
