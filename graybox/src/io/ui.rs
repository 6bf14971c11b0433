//! User-facing channel for interactive mode.
//!
//! Only `terminate`, `warn` and the password gate talk to the channel.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

pub trait UiChannel {
    /// False if interactive mode cannot be served; `gui` is then forced off.
    fn is_available(&self) -> bool;
    fn present_error(&mut self, title: &str, message: &str);
    fn present_info(&mut self, title: &str, message: &str);
    fn prompt_secret(&mut self, prompt: &str) -> Result<String>;
    /// Block until the user acknowledges.
    fn acknowledge(&mut self, prompt: &str);
}

/// Channel backed by the terminal (stderr + stdin).
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl UiChannel for ConsoleUi {
    fn is_available(&self) -> bool {
        true
    }

    fn present_error(&mut self, title: &str, message: &str) {
        eprintln!("[{title}] {message}");
    }

    fn present_info(&mut self, title: &str, message: &str) {
        eprintln!("[{title}] {message}");
    }

    /// Typed characters are not echoed when stdin is a terminal. Piped input
    /// is read as one line.
    fn prompt_secret(&mut self, prompt: &str) -> Result<String> {
        eprint!("{prompt}");
        io::stderr().flush().context("flush prompt")?;
        if io::stdin().is_terminal() {
            return read_hidden();
        }
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read secret from stdin")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn acknowledge(&mut self, prompt: &str) {
        eprint!("{prompt}");
        let _ = io::stderr().flush();
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
    }
}

/// Outcome of one key press while a secret is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecretKey {
    Continue,
    Done,
    Cancel,
}

fn apply_key(secret: &mut String, key: &KeyEvent) -> SecretKey {
    if key.kind == KeyEventKind::Release {
        return SecretKey::Continue;
    }
    match key.code {
        KeyCode::Enter => SecretKey::Done,
        KeyCode::Esc => SecretKey::Cancel,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => SecretKey::Cancel,
        KeyCode::Char(c) => {
            secret.push(c);
            SecretKey::Continue
        }
        KeyCode::Backspace => {
            secret.pop();
            SecretKey::Continue
        }
        _ => SecretKey::Continue,
    }
}

/// Read a secret with the terminal in raw mode, which turns echo off.
fn read_hidden() -> Result<String> {
    terminal::enable_raw_mode().context("enable raw terminal mode")?;
    let typed = read_keys();
    let restored = terminal::disable_raw_mode().context("restore terminal mode");
    eprintln!();
    let secret = typed?;
    restored?;
    Ok(secret)
}

fn read_keys() -> Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read().context("read key")? else {
            continue;
        };
        match apply_key(&mut secret, &key) {
            SecretKey::Continue => {}
            SecretKey::Done => return Ok(secret),
            SecretKey::Cancel => bail!("password entry cancelled"),
        }
    }
}

/// Channel for batch runs: unavailable, every call is a no-op.
#[derive(Debug, Default)]
pub struct HeadlessUi;

impl UiChannel for HeadlessUi {
    fn is_available(&self) -> bool {
        false
    }

    fn present_error(&mut self, _title: &str, _message: &str) {}

    fn present_info(&mut self, _title: &str, _message: &str) {}

    fn prompt_secret(&mut self, _prompt: &str) -> Result<String> {
        Ok(String::new())
    }

    fn acknowledge(&mut self, _prompt: &str) {}
}
