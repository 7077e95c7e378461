//! askpipe - pipe local text into an Ollama model and chat about it.
//!
//! Content piped on stdin is sent to the model along with a question, either
//! as a single exchange (`-p`) or as the start of an interactive session
//! (`-it`).

mod config;
mod conversation;
mod error;
mod llm;
mod session;
mod stream;
mod ui;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use config::Config;
use llm::OllamaClient;
use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "askpipe")]
#[command(author, version, about = "Pipe local text into an Ollama model and chat about it")]
#[command(long_about = "Pipe local text into an Ollama model and chat about it.\n\n\
    Example: git diff | askpipe -p \"review this change\"\n\
    Set OLLAMA_HOST to point at a server other than http://localhost:11434.")]
#[command(group(ArgGroup::new("mode").required(true).args(["interactive", "prompt"])))]
struct Cli {
    /// Enable interactive chat mode (also accepted as -it)
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Single prompt to analyze content with
    #[arg(short = 'p', long, value_name = "PROMPT",
          value_parser = clap::builder::NonEmptyStringValueParser::new())]
    prompt: Option<String>,

    /// Override the model
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Use the plain line-mode terminal for interactive sessions
    #[arg(long, conflicts_with = "prompt")]
    plain: bool,
}

/// What the process was asked to do.
#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Prompt(String),
    Interactive { plain: bool },
}

impl Cli {
    fn mode(&self, config: &Config) -> Mode {
        match &self.prompt {
            Some(prompt) => Mode::Prompt(prompt.clone()),
            None => Mode::Interactive {
                plain: self.plain || config.ui.plain,
            },
        }
    }
}

/// Accept the single-dash `-it` spelling for interactive mode.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-it" {
                OsString::from("--interactive")
            } else {
                arg
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit here, before stdin is touched or anything is sent.
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    let mode = cli.mode(&config);

    init_logging(&mode)?;
    info!(
        "Using model {} at {} ({:?})",
        config.model,
        config.endpoint(),
        mode
    );

    let seed = if atty::is(atty::Stream::Stdin) {
        None
    } else {
        match read_seed(io::stdin().lock()).context("Failed to read stdin")? {
            Some(seed) => Some(seed),
            None => {
                eprintln!("No input received");
                std::process::exit(1);
            }
        }
    };
    debug!(seed_bytes = seed.as_ref().map_or(0, |s| s.len()), "Input loaded");

    let client = OllamaClient::new(&config)?;
    match mode {
        Mode::Prompt(prompt) => handle_prompt(&client, seed.as_deref(), &prompt).await,
        Mode::Interactive { plain: true } => ui::line::run(&client, seed.as_deref()).await,
        Mode::Interactive { plain: false } => {
            let endpoint = client.endpoint().to_string();
            ui::tui::run(Arc::new(client), seed.as_deref(), &endpoint).await
        }
    }
}

/// Initialize logging. The full-screen view owns the terminal, so it logs to
/// a file; everything else logs to stderr and keeps stdout for the reply.
fn init_logging(mode: &Mode) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("askpipe=warn,reqwest=warn"));

    if matches!(mode, Mode::Interactive { plain: false }) {
        let path = Config::log_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

/// Read all piped lines, each kept with a trailing newline. Invalid UTF-8 is
/// replaced rather than rejected. `None` when nothing was piped.
fn read_seed(mut reader: impl BufRead) -> io::Result<Option<String>> {
    let mut content = String::new();
    let mut line = Vec::new();
    while reader.read_until(b'\n', &mut line)? > 0 {
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        content.push_str(&String::from_utf8_lossy(&line));
        content.push('\n');
        line.clear();
    }
    Ok((!content.is_empty()).then_some(content))
}

/// Single prompt mode: print the raw reply and nothing else.
async fn handle_prompt(client: &OllamaClient, seed: Option<&str>, prompt: &str) -> Result<()> {
    match session::single_turn(client, seed, prompt).await {
        Ok(reply) => {
            let mut stdout = io::stdout().lock();
            write_reply(&mut stdout, &reply, atty::is(atty::Stream::Stdout))?;
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Write the reply verbatim. A newline is added only for a terminal, so the
/// shell prompt does not land on the reply's last line.
fn write_reply(out: &mut impl Write, reply: &str, terminal: bool) -> io::Result<()> {
    out.write_all(reply.as_bytes())?;
    if terminal && !reply.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}
