//! Session bookkeeping around a top-level run: banners, password gate,
//! execution timing and journal lifetime.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::arena::NodeId;
use crate::error::Terminated;
use crate::forest::Forest;
use crate::io::auth::PasswordGate;
use crate::io::config::GrayboxConfig;

/// Settings shared by every node of a forest.
#[derive(Debug, Clone)]
pub struct Session {
    pub program: String,
    pub version: String,
    /// Directory for the session log. `None` keeps the journal console-only.
    pub log_dir: Option<PathBuf>,
    /// Elapsed times below this are not reported.
    pub min_exec_time_shown: Duration,
    /// Gate checked by the root prolog, if any.
    pub gate: Option<PasswordGate>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            program: "graybox".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_dir: None,
            min_exec_time_shown: Duration::from_secs(1),
            gate: None,
        }
    }
}

impl Session {
    pub fn from_config(cfg: &GrayboxConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            version: cfg.version.clone(),
            log_dir: Some(cfg.resolved_log_dir()),
            min_exec_time_shown: Duration::try_from_secs_f64(cfg.min_exec_time_shown_secs)
                .unwrap_or(Duration::MAX),
            gate: None,
        }
    }

    pub fn with_gate(mut self, gate: PasswordGate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl Forest {
    /// Startup bookkeeping. Only a root opens the journal file, checks the
    /// password gate, prints the banner and starts the timer. The gate is
    /// dropped once passed, so later roots of the same session run unasked.
    pub fn prolog(&mut self, id: NodeId) -> Result<(), Terminated> {
        if !self.is_root(id) {
            return Ok(());
        }
        let identifier = self.identifier(id).unwrap_or_default().to_string();
        if let Some(dir) = self.session.log_dir.clone() {
            if let Err(err) = self.journal.open(&dir, &identifier) {
                warn!(error = %format!("{err:#}"), "session log unavailable");
            }
        }
        if let Some(gate) = self.session.gate.take() {
            let accepted = match gate.check(self.ui.as_mut()) {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "password prompt failed");
                    false
                }
            };
            if !accepted {
                return Err(self.terminate(id, "wrong password"));
            }
        }

        let program = self.session.program.clone();
        let mut banner = format!("*** This is: '{program}'");
        if identifier != program {
            banner.push_str(&format!(", id: '{identifier}'"));
        }
        banner.push_str(&format!(", version: '{}'", self.session.version));
        self.write(id, &banner);
        let now = chrono::Local::now();
        self.write(id, &format!("    Date: {}", now.format("%Y-%m-%d %H:%M:%S")));
        let path = self
            .session
            .log_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "None".to_string());
        self.write(id, &format!("    Path: '{path}'"));
        self.write(id, "=== Pre-processing");
        self.restart_timer(id);
        Ok(())
    }

    /// Shutdown bookkeeping, recursive over the whole tree of `id`.
    pub fn epilog(&mut self, id: NodeId) {
        let message = format!("'{}' is successfully completed", self.session.program);
        if self.is_root(id) {
            self.report_exec_time(id);
            self.write(id, &format!("*** {message}"));
        }
        for follower in self.followers(id) {
            self.epilog(follower);
        }
        if self.is_root(id) && self.modes(id).gui {
            let title = self.session.program.clone();
            self.ui.present_info(&title, &message);
        }
        self.journal.flush();
    }

    /// Report the time since the last timer start, if long enough to show,
    /// and restart the timer.
    pub(crate) fn report_exec_time(&mut self, id: NodeId) {
        let elapsed = self
            .state(id)
            .and_then(|state| state.exec_started)
            .map(|started| started.elapsed());
        if let Some(elapsed) = elapsed {
            if elapsed >= self.session.min_exec_time_shown {
                self.write(id, &format!("    Execution time: {:.2} s", elapsed.as_secs_f64()));
            }
        }
        self.restart_timer(id);
    }

    fn restart_timer(&mut self, id: NodeId) {
        if let Some(state) = self.state_mut(id) {
            state.exec_started = Some(Instant::now());
        }
    }
}
