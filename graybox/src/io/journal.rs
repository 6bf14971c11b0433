//! Session journal: the leveled message sink behind `write`, `warn` and
//! `terminate`.
//!
//! # Separation of Concerns
//!
//! - **Journal (this module)**: product output. Console echo for non-silent
//!   nodes plus a log file `<dir>/<root id>.log` opened once per process.
//! - **Tracing (`logging`)**: dev diagnostics via `RUST_LOG`, output to stderr.
//!   Every journal record is mirrored as a tracing event.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

/// Severity of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Critical,
}

#[derive(Debug)]
pub struct Journal {
    file: Option<BufWriter<File>>,
    file_path: Option<PathBuf>,
    console: bool,
    memory: Option<Vec<String>>,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    /// Journal echoing to stdout, without a log file until [`Journal::open`].
    pub fn new() -> Self {
        Self {
            file: None,
            file_path: None,
            console: true,
            memory: None,
        }
    }

    /// Journal that keeps every record in memory and never prints.
    pub fn in_memory() -> Self {
        Self {
            file: None,
            file_path: None,
            console: false,
            memory: Some(Vec::new()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Open (truncate) the log file. Later calls are no-ops while a file is open.
    pub fn open(&mut self, dir: &Path, identifier: &str) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
        let path = dir.join(format!("{identifier}.log"));
        let file = File::create(&path).with_context(|| format!("create log {}", path.display()))?;
        debug!(path = %path.display(), "journal opened");
        self.file = Some(BufWriter::new(file));
        self.file_path = Some(path);
        Ok(())
    }

    /// Record `line` and echo it to the console when `echo` is set.
    pub fn record(&mut self, level: Level, line: &str, echo: bool) {
        match level {
            Level::Info => info!(target: "graybox::journal", "{line}"),
            Level::Warning => warn!(target: "graybox::journal", "{line}"),
            Level::Critical => error!(target: "graybox::journal", "{line}"),
        }
        if echo && self.console {
            println!("{line}");
        }
        if let Some(memory) = self.memory.as_mut() {
            memory.push(line.to_string());
        }
        let stamped = format!("{} {}{}", timestamp(), level_tag(level), line);
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = writeln!(file, "{stamped}") {
                warn!(error = %err, "journal write failed, closing log file");
                self.file = None;
            }
        }
    }

    pub fn info(&mut self, line: &str, echo: bool) {
        self.record(Level::Info, line, echo);
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = file.flush() {
                warn!(error = %err, "journal flush failed");
            }
        }
        if self.console {
            let _ = std::io::stdout().flush();
        }
    }

    /// Flush and close the log file. The journal keeps echoing afterwards.
    pub fn teardown(&mut self) {
        self.flush();
        if self.file.take().is_some() {
            debug!("journal closed");
        }
    }

    /// Records kept by an in-memory journal, oldest first.
    pub fn lines(&self) -> &[String] {
        self.memory.as_deref().unwrap_or(&[])
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Info => "",
        Level::Warning => "WARNING ",
        Level::Critical => "CRITICAL ",
    }
}

/// Wall-clock time as `HH:MM:SS.ff`.
fn timestamp() -> String {
    let mut stamp = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
    stamp.pop();
    stamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_journal_keeps_records_in_order() {
        let mut journal = Journal::in_memory();
        journal.info("first", true);
        journal.record(Level::Warning, "second", false);
        assert_eq!(journal.lines(), ["first", "second"]);
    }

    #[test]
    fn open_is_once_per_journal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut journal = Journal::in_memory();
        journal.open(temp.path(), "root").expect("open");
        journal.open(temp.path(), "other").expect("second open");
        journal.info("hello", false);
        journal.record(Level::Critical, "boom", false);
        journal.teardown();

        assert!(!temp.path().join("other.log").exists());
        let contents = fs::read_to_string(temp.path().join("root.log")).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" hello"));
        assert!(lines[1].ends_with(" CRITICAL boom"));
        assert_eq!(lines[0].split(' ').next().map(str::len), Some(11));
    }

    #[test]
    fn teardown_allows_reopening() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut journal = Journal::in_memory();
        journal.open(temp.path(), "a").expect("open");
        journal.teardown();
        assert!(!journal.is_open());
        journal.open(temp.path(), "b").expect("reopen");
        assert!(journal.file_path().is_some_and(|p| p.ends_with("b.log")));
    }
}
