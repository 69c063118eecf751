//! Engine configuration stored in `pentragent.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pentragent.toml";

/// Engine configuration (TOML).
///
/// Built once at startup and passed by reference into the runner and oracle.
/// Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum commands executed for a single lead.
    pub step_budget: u32,

    /// Wall-clock limit for each sandbox command, in seconds.
    pub command_timeout_secs: u64,

    /// Truncate captured command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Maximum number of leads accepted from the seed decision.
    pub max_seed_leads: usize,

    /// Digests longer than this many characters are truncated.
    pub max_digest_chars: usize,

    /// Consecutive repeated-command rejections tolerated before a lead is cut off.
    pub repeat_retries: u32,

    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    pub shell: ShellConfig,
    pub oracle: OracleConfig,
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Argv prefix; the command line is appended as the final argument and
    /// `{timeout}` is replaced with the command timeout in seconds.
    pub command: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command: [
                "docker",
                "exec",
                "kali",
                "timeout",
                "-s",
                "KILL",
                "{timeout}",
                "sh",
                "-c",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    #[default]
    Chat,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    pub chat: ChatOracleConfig,
    pub command: CommandOracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatOracleConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ChatOracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.ai/v1".to_string(),
            model: "grok-2-latest".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandOracleConfig {
    /// Agent CLI argv. `{schema}` and `{output}` are replaced with file paths.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Scratch directory for schema and output files.
    pub work_dir: PathBuf,
    pub output_limit_bytes: usize,
}

impl Default for CommandOracleConfig {
    fn default() -> Self {
        Self {
            command: [
                "codex",
                "exec",
                "--skip-git-repo-check",
                "--output-schema",
                "{schema}",
                "--output-last-message",
                "{output}",
                "-",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            timeout_secs: 5 * 60,
            work_dir: PathBuf::from(".pentragent/oracle"),
            output_limit_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Directory of reference documents; unset disables reference context.
    pub dir: Option<PathBuf>,
    pub max_snippets: usize,
    pub snippet_chars: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_snippets: 3,
            snippet_chars: 1_500,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: 15,
            command_timeout_secs: 10,
            output_limit_bytes: 16_000,
            max_seed_leads: 3,
            max_digest_chars: 1_500,
            repeat_retries: 2,
            prompt_budget_bytes: 60_000,
            shell: ShellConfig::default(),
            oracle: OracleConfig::default(),
            documents: DocumentsConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_budget == 0 {
            return Err(anyhow!("step_budget must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.max_seed_leads == 0 {
            return Err(anyhow!("max_seed_leads must be > 0"));
        }
        if self.max_digest_chars == 0 {
            return Err(anyhow!("max_digest_chars must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.shell.command.is_empty() || self.shell.command[0].trim().is_empty() {
            return Err(anyhow!("shell.command must be a non-empty array"));
        }
        match self.oracle.backend {
            OracleBackend::Chat => {
                if self.oracle.chat.base_url.trim().is_empty() {
                    return Err(anyhow!("oracle.chat.base_url must be set"));
                }
                if self.oracle.chat.model.trim().is_empty() {
                    return Err(anyhow!("oracle.chat.model must be set"));
                }
                if self.oracle.chat.timeout_secs == 0 {
                    return Err(anyhow!("oracle.chat.timeout_secs must be > 0"));
                }
            }
            OracleBackend::Command => {
                let command = &self.oracle.command.command;
                if command.is_empty() || command[0].trim().is_empty() {
                    return Err(anyhow!("oracle.command.command must be a non-empty array"));
                }
                if self.oracle.command.timeout_secs == 0 {
                    return Err(anyhow!("oracle.command.timeout_secs must be > 0"));
                }
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pentragent.toml");
        let cfg = EngineConfig {
            step_budget: 5,
            documents: DocumentsConfig {
                dir: Some(PathBuf::from("docs")),
                ..DocumentsConfig::default()
            },
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pentragent.toml");
        fs::write(
            &path,
            "step_budget = 4\n\n[shell]\ncommand = [\"sh\", \"-c\"]\n\n[oracle]\nbackend = \"command\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.step_budget, 4);
        assert_eq!(cfg.shell.command, vec!["sh", "-c"]);
        assert_eq!(cfg.oracle.backend, OracleBackend::Command);
        assert_eq!(cfg.command_timeout_secs, 10);
    }

    #[test]
    fn default_shell_bounds_the_command_inside_the_container() {
        let shell = ShellConfig::default();
        assert_eq!(shell.command[..3], ["docker", "exec", "kali"]);
        assert!(shell.command.iter().any(|arg| arg == "{timeout}"));
    }

    #[test]
    fn rejects_zero_step_budget() {
        let cfg = EngineConfig {
            step_budget: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_shell_command() {
        let cfg = EngineConfig {
            shell: ShellConfig {
                command: Vec::new(),
            },
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("shell.command"));
    }
}
