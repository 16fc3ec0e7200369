//! Shell environment sourcing.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::{run_command, Environment, EnvironmentSource};
use crate::error::ToolError;

/// Sources a script with `bash` and captures the resulting environment.
#[derive(Debug, Clone)]
pub struct BashEnvironment {
    shell: String,
}

impl BashEnvironment {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }

    /// Uses a different POSIX shell.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for BashEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvironmentSource for BashEnvironment {
    async fn resolve(&self, script: &Path) -> Result<Environment, ToolError> {
        let command = format!(". {}; env", shell_quote(&script.to_string_lossy()));
        let args = vec!["-c".to_string(), command];
        let output = run_command(&self.shell, &args, None, None).await?;
        if !output.is_success() {
            return Err(ToolError::Failed {
                program: format!("{} {}", self.shell, script.display()),
                code: output.exit_code,
                excerpt: output.stderr.trim().to_string(),
            });
        }

        let env = parse_env_output(&output.stdout);
        debug!(script = %script.display(), vars = env.len(), "Sourced environment");
        Ok(env)
    }
}

/// Parses `env` output: one `NAME=value` per line, split at the first `=`.
/// Lines without `=` are ignored.
pub fn parse_env_output(output: &str) -> Environment {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_output() {
        let env = parse_env_output("HOME=/home/pixel\nsimplesub=/opt/simplesub\nOPTS=a=b\ncontinuation\n");
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/pixel"));
        assert_eq!(env.get("simplesub").map(String::as_str), Some("/opt/simplesub"));
        assert_eq!(env.get("OPTS").map(String::as_str), Some("a=b"));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/a b/env.sh"), "'/a b/env.sh'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_sources_script() {
        let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let script = temp_dir.path().join("dqm_env.sh");
        std::fs::write(&script, "export simplesub=/opt/simplesub\n").unwrap();

        let env = BashEnvironment::new().with_shell("sh").resolve(&script).await.unwrap();
        assert_eq!(env.get("simplesub").map(String::as_str), Some("/opt/simplesub"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_missing_script_fails() {
        let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let result = BashEnvironment::new()
            .with_shell("sh")
            .resolve(&temp_dir.path().join("missing.sh"))
            .await;
        assert!(matches!(result, Err(ToolError::Failed { .. })));
    }
}
