//! Line-mode interactive session.
//!
//! Prints a timestamped prompt, reads one line from the controlling terminal,
//! shows a "thinking..." line while the request runs, then replaces it with
//! the reply. Stdin may already be consumed by piped content, so input is read
//! from `/dev/tty`.

use super::{label, timestamp, GREETING};
use crate::conversation::{Message, Role};
use crate::llm::ChatBackend;
use crate::session::Session;
use anyhow::{Context, Result};
use chrono::Local;
use crossterm::{
    cursor::MoveUp,
    queue,
    style::{PrintStyledContent, StyledContent, Stylize},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const TTY_PATH: &str = "/dev/tty";

fn speaker(role: Role) -> StyledContent<&'static str> {
    match role {
        Role::User => label(role).white().bold(),
        Role::Assistant => label(role).cyan().bold(),
        Role::System => label(role).red().bold(),
    }
}

fn subtle(text: &str) -> StyledContent<&str> {
    text.dark_grey()
}

/// Print the `<you>` prompt, leaving the cursor on the same line.
fn write_prompt(out: &mut impl Write) -> io::Result<()> {
    write!(out, "\n{} ", timestamp(Local::now()).dark_grey())?;
    queue!(out, PrintStyledContent(speaker(Role::User)))?;
    write!(out, " ")?;
    out.flush()
}

fn write_thinking(out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "{} {} {}",
        timestamp(Local::now()).dark_grey(),
        speaker(Role::Assistant),
        subtle("thinking...")
    )?;
    out.flush()
}

/// Replace the "thinking..." line with the message.
fn write_reply(out: &mut impl Write, message: &Message) -> io::Result<()> {
    queue!(out, MoveUp(1), Clear(ClearType::CurrentLine))?;
    write_message(out, message)?;
    out.flush()
}

/// Print one message with its timestamp and speaker tag.
pub fn write_message(out: &mut impl Write, message: &Message) -> io::Result<()> {
    let content = message.content();
    write!(
        out,
        "{} {} {}",
        timestamp(message.sent_at()).dark_grey(),
        speaker(message.role()),
        content
    )?;
    if !content.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

/// Run the read-eval loop until end of input.
pub async fn run<B>(backend: &B, seed: Option<&str>) -> Result<()>
where
    B: ChatBackend + ?Sized,
{
    let tty = tokio::fs::File::open(TTY_PATH)
        .await
        .with_context(|| format!("Failed to open {}", TTY_PATH))?;
    let mut reader = BufReader::new(tty);
    let mut session = Session::new(seed);
    let mut stdout = io::stdout();

    if let Some(seed) = seed {
        writeln!(stdout, "{}", subtle(&super::seed_summary(seed)))?;
    }
    writeln!(stdout, "{}", subtle(GREETING))?;

    loop {
        write_prompt(&mut stdout)?;

        let mut input = String::new();
        let read = reader
            .read_line(&mut input)
            .await
            .context("Failed to read input")?;
        if read == 0 {
            debug!("End of input");
            writeln!(stdout)?;
            break;
        }
        if input.trim().is_empty() {
            continue;
        }

        write_thinking(&mut stdout)?;
        if let Some(message) = session.turn(backend, &input).await? {
            write_reply(&mut stdout, message)?;
        }
    }

    Ok(())
}
