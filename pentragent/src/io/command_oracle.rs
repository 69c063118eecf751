//! Oracle backed by an external agent CLI (e.g. `codex exec`).
//!
//! The prompt is fed on stdin. Argv entries `{schema}` and `{output}` are
//! replaced with the path of the decision schema and of the file the agent
//! must write its final answer to; without an `{output}` placeholder the
//! answer is read from stdout.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::OracleError;
use crate::io::config::CommandOracleConfig;
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::process::{CommandOutput, run_command_with_timeout};

const SCHEMA_PLACEHOLDER: &str = "{schema}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Oracle that spawns an agent CLI per decision.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    argv: Vec<String>,
    work_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn new(config: &CommandOracleConfig) -> Self {
        Self {
            argv: config.command.clone(),
            work_dir: config.work_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn schema_path(&self, request: &OracleRequest) -> PathBuf {
        self.work_dir
            .join(format!("{}.schema.json", request.kind.as_str()))
    }

    fn output_path(&self, request: &OracleRequest) -> PathBuf {
        self.work_dir
            .join(format!("{}.output.json", request.kind.as_str()))
    }

    fn reads_output_file(&self) -> bool {
        self.argv.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER))
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(kind = %request.kind, timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| OracleError::transport("empty oracle command"))?;

        fs::create_dir_all(&self.work_dir).map_err(|err| {
            OracleError::transport(format!("create {}: {err}", self.work_dir.display()))
        })?;
        let schema_path = self.schema_path(request);
        let output_path = self.output_path(request);
        write_file(&schema_path, request.schema())?;
        if output_path.exists() {
            fs::remove_file(&output_path).map_err(|err| {
                OracleError::transport(format!("remove stale {}: {err}", output_path.display()))
            })?;
        }

        let mut cmd = Command::new(program);
        for arg in args {
            cmd.arg(substitute(arg, &schema_path, &output_path));
        }

        info!(program = %program, "starting oracle command");
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| OracleError::transport(format!("{program}: {err:#}")))?;

        check_exit(program, &output, self.timeout)?;

        let response = if self.reads_output_file() {
            fs::read_to_string(&output_path).map_err(|err| {
                OracleError::transport(format!(
                    "{program} wrote no output {}: {err}",
                    output_path.display()
                ))
            })?
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        debug!(bytes = response.len(), "oracle command responded");
        Ok(response)
    }
}

fn check_exit(program: &str, output: &CommandOutput, timeout: Duration) -> Result<(), OracleError> {
    if output.timed_out {
        warn!(timeout_secs = timeout.as_secs(), "oracle command timed out");
        return Err(OracleError::transport(format!(
            "{program} timed out after {timeout:?}"
        )));
    }
    let code = output.exit_code();
    if code != 0 {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(exit_code = code, "oracle command failed");
        return Err(OracleError::transport(format!(
            "{program} exited with {code}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

fn substitute(arg: &str, schema_path: &Path, output_path: &Path) -> String {
    arg.replace(SCHEMA_PLACEHOLDER, &schema_path.to_string_lossy())
        .replace(OUTPUT_PLACEHOLDER, &output_path.to_string_lossy())
}

fn write_file(path: &Path, contents: &str) -> Result<(), OracleError> {
    fs::write(path, contents)
        .map_err(|err| OracleError::transport(format!("write {}: {err}", path.display())))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::decision::DecisionKind;

    fn oracle(temp: &Path, argv: &[&str]) -> CommandOracle {
        CommandOracle::new(&CommandOracleConfig {
            command: argv.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 10,
            work_dir: temp.join("oracle"),
            output_limit_bytes: 10_000,
        })
    }

    fn request() -> OracleRequest {
        OracleRequest {
            kind: DecisionKind::Digest,
            prompt: "summarize".to_string(),
        }
    }

    #[test]
    fn reads_stdout_without_output_placeholder() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = oracle(
            temp.path(),
            &["sh", "-c", r#"cat >/dev/null; echo '{"summary":"s","dead_end":false}'"#],
        );

        let raw = oracle.complete(&request()).expect("complete");
        assert_eq!(raw.trim(), r#"{"summary":"s","dead_end":false}"#);
    }

    #[test]
    fn reads_output_file_and_writes_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = oracle(
            temp.path(),
            &[
                "sh",
                "-c",
                r#"test -f "$1" && cat > "$2""#,
                "oracle",
                "{schema}",
                "{output}",
            ],
        );

        let raw = oracle.complete(&request()).expect("complete");
        assert_eq!(raw, "summarize");
        assert!(temp.path().join("oracle/digest.schema.json").is_file());
    }

    #[test]
    fn non_zero_exit_is_a_transport_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = oracle(temp.path(), &["sh", "-c", "echo denied >&2; exit 7"]);

        let err = oracle.complete(&request()).unwrap_err();
        assert!(!err.is_decode());
        assert!(err.to_string().contains("exited with 7: denied"));
    }
}
