//! Command-line entry point for pentragent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use pentragent::core::transcript::Step;
use pentragent::engine::{Collaborators, EngineOutcome, Mission, run_engine};
use pentragent::error::{OracleError, SandboxError};
use pentragent::events::EngineEvent;
use pentragent::exit_codes;
use pentragent::io::chat_oracle::ChatOracle;
use pentragent::io::command_oracle::CommandOracle;
use pentragent::io::command_runner::CommandRunner;
use pentragent::io::config::{
    DEFAULT_CONFIG_FILE, EngineConfig, OracleBackend, load_config, write_config,
};
use pentragent::io::documents::{ContextProvider, DocumentStore, NoContext};
use pentragent::io::man_pages::{ManPageFetch, fetch_man_page};
use pentragent::io::oracle::Oracle;
use pentragent::io::recorder::Recorder;
use pentragent::io::sandbox::ProcessSandbox;
use pentragent::logging;

#[derive(Parser)]
#[command(
    name = "pentragent",
    version,
    about = "Oracle-driven penetration-testing agent"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Investigate a target until no open leads remain.
    Run {
        /// Target description (host, URL, scope).
        target: String,
        /// Extra operator hint shared with every oracle call (repeatable).
        #[arg(long = "hint")]
        hints: Vec<String>,
        /// Override the per-lead step budget.
        #[arg(long)]
        step_budget: Option<u32>,
        /// Override the per-command timeout, in seconds.
        #[arg(long)]
        command_timeout: Option<u64>,
        /// Write per-lead records and a run summary into this directory.
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Run one command through the sandbox and print its output.
    Exec {
        command: String,
        /// Timeout in seconds (defaults to the configured command timeout).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Search the reference document store.
    Search {
        query: String,
        #[arg(long)]
        doc_type: Option<String>,
        #[arg(long, default_value_t = 5)]
        max_results: usize,
    },
    /// Fill the reference document store.
    Docs {
        #[command(subcommand)]
        command: DocsCommand,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum DocsCommand {
    /// Save the man page of each tool, rendered inside the sandbox.
    Man {
        #[arg(required = true)]
        tools: Vec<String>,
        /// Timeout in seconds per page (defaults to the configured command timeout).
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            std::process::exit(code);
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            target,
            hints,
            step_budget,
            command_timeout,
            record,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(step_budget) = step_budget {
                config.step_budget = step_budget;
            }
            if let Some(secs) = command_timeout {
                config.command_timeout_secs = secs;
            }
            config.validate().context("invalid command-line overrides")?;
            cmd_run(&config, Mission { target, hints }, record.as_deref())
        }
        Command::Exec { command, timeout } => {
            let mut config = load_config(&cli.config)?;
            if let Some(secs) = timeout {
                config.command_timeout_secs = secs;
            }
            config.validate().context("invalid command-line overrides")?;
            cmd_exec(&config, &command)
        }
        Command::Search {
            query,
            doc_type,
            max_results,
        } => {
            let config = load_config(&cli.config)?;
            cmd_search(&config, &query, doc_type.as_deref(), max_results)
        }
        Command::Docs {
            command: DocsCommand::Man { tools, timeout },
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(secs) = timeout {
                config.command_timeout_secs = secs;
            }
            config.validate().context("invalid command-line overrides")?;
            cmd_docs_man(&config, &tools)
        }
        Command::Init { force } => cmd_init(&cli.config, force),
    }
}

fn cmd_run(config: &EngineConfig, mission: Mission, record: Option<&Path>) -> Result<i32> {
    let oracle = build_oracle(config)?;
    let references = build_references(config);
    let runner = CommandRunner::new(ProcessSandbox::new(
        config.shell.command.clone(),
        config.output_limit_bytes,
    ));
    let recorder = record.map(Recorder::create).transpose()?;

    let collaborators = Collaborators {
        oracle: &*oracle,
        runner: &runner,
        references: &*references,
        recorder: recorder.as_ref(),
    };
    let outcome = run_engine(config, &collaborators, &mission, print_event)?;
    print_outcome(&outcome);
    Ok(exit_codes::OK)
}

fn cmd_exec(config: &EngineConfig, command: &str) -> Result<i32> {
    let runner = CommandRunner::new(ProcessSandbox::new(
        config.shell.command.clone(),
        config.output_limit_bytes,
    ));
    let result = runner.execute(command, config.command_timeout())?;
    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    Ok(result.exit_code)
}

fn cmd_search(
    config: &EngineConfig,
    query: &str,
    doc_type: Option<&str>,
    max_results: usize,
) -> Result<i32> {
    let store = configured_store(config)?;
    let documents = store.search(query, doc_type, max_results)?;
    if documents.is_empty() {
        println!("no matching documents");
    }
    for doc in documents {
        let preview: String = doc.content.trim().chars().take(200).collect();
        println!("[{}] {} ({})", doc.doc_type, doc.title, doc.source);
        println!("    {}", preview.replace('\n', "\n    "));
    }
    Ok(exit_codes::OK)
}

fn cmd_docs_man(config: &EngineConfig, tools: &[String]) -> Result<i32> {
    let store = configured_store(config)?;
    let runner = CommandRunner::new(ProcessSandbox::new(
        config.shell.command.clone(),
        config.output_limit_bytes,
    ));
    for tool in tools {
        match fetch_man_page(&runner, &store, tool, config.command_timeout())? {
            ManPageFetch::Saved(path) => println!("saved {tool} -> {}", path.display()),
            ManPageFetch::Missing { reason } => println!("skipped {tool}: {reason}"),
        }
    }
    Ok(exit_codes::OK)
}

fn configured_store(config: &EngineConfig) -> Result<DocumentStore> {
    let dir = config
        .documents
        .dir
        .as_ref()
        .ok_or_else(|| anyhow!("documents.dir is not configured"))?;
    Ok(DocumentStore::new(
        dir,
        config.documents.max_snippets,
        config.documents.snippet_chars,
    ))
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists; pass --force to overwrite", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &EngineConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn build_oracle(config: &EngineConfig) -> Result<Box<dyn Oracle>> {
    let oracle: Box<dyn Oracle> = match config.oracle.backend {
        OracleBackend::Chat => Box::new(ChatOracle::new(&config.oracle.chat)?),
        OracleBackend::Command => Box::new(CommandOracle::new(&config.oracle.command)),
    };
    Ok(oracle)
}

fn build_references(config: &EngineConfig) -> Box<dyn ContextProvider> {
    match &config.documents.dir {
        Some(dir) => Box::new(DocumentStore::new(
            dir,
            config.documents.max_snippets,
            config.documents.snippet_chars,
        )),
        None => Box::new(NoContext),
    }
}

/// Map an error to an exit code by the typed failure underneath it.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(oracle_err) = cause.downcast_ref::<OracleError>() {
            return if oracle_err.is_decode() {
                exit_codes::DECODE_FAILURE
            } else {
                exit_codes::TRANSPORT_FAILURE
            };
        }
        if cause.downcast_ref::<SandboxError>().is_some() {
            return exit_codes::TRANSPORT_FAILURE;
        }
    }
    exit_codes::INVALID
}

fn print_event(event: &EngineEvent<'_>) {
    match event {
        EngineEvent::Seeded { leads } => {
            println!("Frontier seeded with {} lead(s)", leads.len());
            for lead in *leads {
                println!("  + {lead}");
            }
        }
        EngineEvent::LeadStarted {
            index,
            lead,
            remaining,
        } => {
            println!();
            println!("=== Lead {index}: {lead} ({remaining} queued)");
        }
        EngineEvent::CommandStarted {
            step,
            topic,
            log,
            command,
        } => {
            println!("[{step}] {topic}");
            if !log.trim().is_empty() {
                println!("    {}", log.trim());
            }
            println!("    $ {command}");
        }
        EngineEvent::CommandRejected { command, attempt } => {
            println!("    ! refused repeated command `{command}` (attempt {attempt})");
        }
        EngineEvent::CommandFinished { result, .. } => print_step_result(result),
        EngineEvent::LeadFinished { transcript } => {
            println!("--- lead {}", transcript.outcome);
        }
        EngineEvent::Digested { digest, .. } => {
            let marker = if digest.dead_end { " (dead end)" } else { "" };
            println!("Digest{marker}: {}", digest.text);
        }
        EngineEvent::FrontierUpdated {
            applied,
            open_leads,
        } => {
            for lead in &applied.added {
                println!("  + {lead}");
            }
            for lead in &applied.removed {
                println!("  - {lead}");
            }
            println!("{open_leads} open lead(s)");
        }
    }
}

fn print_step_result(step: &Step) {
    let timed_out = if step.timed_out { " (timed out)" } else { "" };
    println!("    exit {}{timed_out}", step.exit_code);
    for line in step.stdout.lines() {
        println!("    | {line}");
    }
}

fn print_outcome(outcome: &EngineOutcome) {
    println!();
    println!(
        "Frontier exhausted after {} lead(s); {} aborted, {} cut off",
        outcome.leads_run,
        outcome.lead_failures.len(),
        outcome.policy_violations
    );
    for failure in &outcome.lead_failures {
        println!("  ! {}: {}", failure.lead, failure.error);
    }
}
