//! CLI tests spawning the pentragent binary.
//!
//! Only commands that need no oracle are exercised here; the engine itself is
//! covered with scripted collaborators in `engine_lifecycle.rs`.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pentragent::exit_codes;
use pentragent::io::config::{
    DocumentsConfig, EngineConfig, ShellConfig, load_config, write_config,
};
use pentragent::io::documents::{Document, DocumentStore};

fn pentragent(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pentragent"))
        .current_dir(dir)
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .expect("spawn pentragent")
}

fn local_shell_config(dir: &Path) {
    let config = EngineConfig {
        shell: ShellConfig {
            command: vec!["sh".to_string(), "-c".to_string()],
        },
        ..EngineConfig::default()
    };
    write_config(&dir.join("pentragent.toml"), &config).expect("write config");
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("pentragent.toml");

    let output = pentragent(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), EngineConfig::default());

    fs::write(&path, "step_budget = 3\n").expect("edit");
    let output = pentragent(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(fs::read_to_string(&path).expect("read"), "step_budget = 3\n");

    let output = pentragent(temp.path(), &["init", "--force"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load").step_budget, 15);
}

#[cfg(unix)]
#[test]
fn exec_prints_output_and_forwards_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    local_shell_config(temp.path());

    let output = pentragent(temp.path(), &["exec", "echo hello; exit 4"]);

    assert_eq!(output.status.code(), Some(4));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[cfg(unix)]
#[test]
fn exec_timeout_exits_with_sentinel() {
    let temp = tempfile::tempdir().expect("tempdir");
    local_shell_config(temp.path());

    let output = pentragent(temp.path(), &["exec", "sleep 5", "--timeout", "1"]);

    assert_eq!(output.status.code(), Some(124));
    assert!(String::from_utf8_lossy(&output.stdout).contains("timed out"));
}

#[test]
fn unreachable_sandbox_is_a_transport_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig {
        shell: ShellConfig {
            command: vec!["/nonexistent/pentragent-shell".to_string()],
        },
        ..EngineConfig::default()
    };
    write_config(&temp.path().join("pentragent.toml"), &config).expect("write config");

    let output = pentragent(temp.path(), &["exec", "id"]);

    assert_eq!(output.status.code(), Some(exit_codes::TRANSPORT_FAILURE));
}

#[test]
fn invalid_config_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("pentragent.toml"), "step_budget = 0\n").expect("write");

    let output = pentragent(temp.path(), &["exec", "id"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("step_budget"));
}

#[test]
fn unknown_subcommand_is_invalid_usage() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = pentragent(temp.path(), &["frobnicate"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn search_lists_matching_documents() {
    let temp = tempfile::tempdir().expect("tempdir");
    let docs = temp.path().join("docs");
    let store = DocumentStore::new(&docs, 3, 200);
    store
        .save(&Document {
            title: "nikto".to_string(),
            content: "Web server scanner".to_string(),
            source: "kali.org".to_string(),
            doc_type: "kali_tool".to_string(),
            timestamp: 0.0,
            metadata: serde_json::Value::Null,
        })
        .expect("save");
    fs::write(
        temp.path().join("pentragent.toml"),
        "[documents]\ndir = \"docs\"\n",
    )
    .expect("write config");

    let output = pentragent(temp.path(), &["search", "web scanner"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[kali_tool] nikto (kali.org)"));
}

/// `man` and `col` are replaced by scripts on `PATH` so the test does not
/// depend on installed manuals.
#[cfg(unix)]
#[test]
fn docs_man_saves_pages_for_search() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir().expect("tempdir");
    let bin = temp.path().join("bin");
    fs::create_dir(&bin).expect("bin dir");
    for (name, script) in [
        (
            "man",
            "#!/bin/sh\n[ \"$1\" = nikto ] || exit 16\nprintf 'NIKTO(1)\\n\\nNAME\\n  nikto - web server scanner\\n'\n",
        ),
        ("col", "#!/bin/sh\ncat\n"),
    ] {
        let path = bin.join(name);
        fs::write(&path, script).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
    let config = EngineConfig {
        shell: ShellConfig {
            command: vec!["sh".to_string(), "-c".to_string()],
        },
        documents: DocumentsConfig {
            dir: Some("docs".into()),
            ..DocumentsConfig::default()
        },
        ..EngineConfig::default()
    };
    write_config(&temp.path().join("pentragent.toml"), &config).expect("write config");
    let path_var = format!(
        "{}:{}",
        bin.display(),
        std::env::var("PATH").unwrap_or_default()
    );

    let output = Command::new(env!("CARGO_BIN_EXE_pentragent"))
        .current_dir(temp.path())
        .env("RUST_LOG", "off")
        .env("PATH", &path_var)
        .args(["docs", "man", "nikto", "nosuchtool"])
        .output()
        .expect("spawn pentragent");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("saved nikto"));
    assert!(stdout.contains("skipped nosuchtool: no man page"));
    assert!(temp.path().join("docs/kali_tool_nikto.json").is_file());

    let output = pentragent(temp.path(), &["search", "web server", "--doc-type", "kali_tool"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("[kali_tool] nikto (man nikto)"));
}

#[test]
fn docs_man_rejects_shell_metacharacters() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("pentragent.toml"),
        "[documents]\ndir = \"docs\"\n",
    )
    .expect("write config");

    let output = pentragent(temp.path(), &["docs", "man", "nmap;id"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid tool name"));
}
