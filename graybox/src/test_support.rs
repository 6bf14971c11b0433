//! Test-only forests, models and collaborator doubles.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use crate::core::types::Options;
use crate::error::Halt;
use crate::forest::Forest;
use crate::io::journal::Journal;
use crate::io::rank::{RankOracle, SingleProcess};
use crate::io::ui::{HeadlessUi, UiChannel};
use crate::node::{Model, NodeCtx};
use crate::session::Session;

/// Shared, ordered record of hook calls.
pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Headless single-process forest with an in-memory journal and no timing
/// lines.
pub fn quiet_forest() -> Forest {
    Forest::new()
        .with_journal(Journal::in_memory())
        .with_ui(Box::new(HeadlessUi))
        .with_rank(Box::new(SingleProcess))
        .with_session(quiet_session())
}

pub fn quiet_session() -> Session {
    Session {
        min_exec_time_shown: Duration::MAX,
        ..Session::default()
    }
}

/// Quiet forest whose session log lands in a fresh temp dir.
pub fn logged_forest() -> Result<(Forest, TempDir)> {
    let temp = tempfile::tempdir()?;
    let session = Session {
        log_dir: Some(temp.path().to_path_buf()),
        ..quiet_session()
    };
    Ok((quiet_forest().with_session(session), temp))
}

/// Model that appends `<hook>:<name>` to an [`EventLog`] on every hook call.
#[derive(Debug, Clone)]
pub struct Recorder {
    name: String,
    log: EventLog,
    persistence_ok: bool,
    halt_in_task: Option<String>,
    residual: f64,
}

impl Recorder {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: Rc::clone(log),
            persistence_ok: true,
            halt_in_task: None,
            residual: 0.0,
        }
    }

    /// `load` and `save` report failure.
    pub fn failing_persistence(mut self) -> Self {
        self.persistence_ok = false;
        self
    }

    /// `task` halts with `message`.
    pub fn halting_task(mut self, message: &str) -> Self {
        self.halt_in_task = Some(message.to_string());
        self
    }

    pub fn with_residual(mut self, residual: f64) -> Self {
        self.residual = residual;
        self
    }

    fn push(&self, hook: &str) {
        self.log.borrow_mut().push(format!("{hook}:{}", self.name));
    }
}

impl Model for Recorder {
    fn load(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<bool, Halt> {
        self.push("load");
        Ok(self.persistence_ok)
    }

    fn save(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<bool, Halt> {
        self.push("save");
        Ok(self.persistence_ok)
    }

    fn task(&mut self, _ctx: &mut NodeCtx<'_>, _options: &Options) -> Result<f64, Halt> {
        if let Some(message) = &self.halt_in_task {
            return Err(Halt::new(message.clone()));
        }
        self.push("task");
        Ok(self.residual)
    }

    fn initial_condition(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
        self.push("initial");
        Ok(())
    }

    fn update_nonlinear(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
        self.push("nonlinear");
        Ok(())
    }

    fn update_transient(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
        self.push("transient");
        Ok(())
    }
}

/// `(iteration, time)` seen by each `task` call.
pub type TaskCalls = Rc<RefCell<Vec<(u32, f64)>>>;

/// Model whose `task` returns a scripted residual sequence, repeating the
/// last entry once the script runs out.
#[derive(Debug, Clone)]
pub struct ScriptedResiduals {
    residuals: Vec<f64>,
    calls: TaskCalls,
}

impl ScriptedResiduals {
    pub fn new(residuals: &[f64]) -> (Self, TaskCalls) {
        let calls = TaskCalls::default();
        let model = Self {
            residuals: residuals.to_vec(),
            calls: Rc::clone(&calls),
        };
        (model, calls)
    }
}

impl Model for ScriptedResiduals {
    fn task(&mut self, ctx: &mut NodeCtx<'_>, _options: &Options) -> Result<f64, Halt> {
        let (iteration, time) = ctx
            .state
            .loop_state()
            .map(|state| (state.iteration, state.transient.time))
            .unwrap_or((0, 0.0));
        let mut calls = self.calls.borrow_mut();
        let index = calls.len().min(self.residuals.len().saturating_sub(1));
        calls.push((iteration, time));
        Ok(self.residuals.get(index).copied().unwrap_or(0.0))
    }
}

/// Rank oracle answering a fixed rank.
#[derive(Debug, Clone, Copy)]
pub struct FixedRank(pub Option<u32>);

impl RankOracle for FixedRank {
    fn rank(&self) -> Option<u32> {
        self.0
    }
}

/// UI channel that records every call and answers prompts from a script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedUi {
    available: bool,
    secret: String,
    events: EventLog,
}

impl ScriptedUi {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            ..Self::default()
        }
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    /// Handle on the recorded calls, valid after the channel is boxed away.
    pub fn events(&self) -> EventLog {
        Rc::clone(&self.events)
    }
}

impl UiChannel for ScriptedUi {
    fn is_available(&self) -> bool {
        self.available
    }

    fn present_error(&mut self, title: &str, message: &str) {
        self.events.borrow_mut().push(format!("error:{title}:{message}"));
    }

    fn present_info(&mut self, title: &str, message: &str) {
        self.events.borrow_mut().push(format!("info:{title}:{message}"));
    }

    fn prompt_secret(&mut self, prompt: &str) -> Result<String> {
        self.events.borrow_mut().push(format!("prompt:{prompt}"));
        Ok(self.secret.clone())
    }

    fn acknowledge(&mut self, prompt: &str) {
        self.events.borrow_mut().push(format!("ack:{prompt}"));
    }
}
