//! Node state and the hook trait models implement.
//!
//! A node is split in two: [`NodeState`], which the engine owns and models may
//! read and update, and a boxed [`Model`] supplying the node's own work. The
//! engine walks followers; a model only ever sees its own node.

use std::any::Any;
use std::time::Instant;

use tracing::debug;

use crate::core::settings::LoopState;
use crate::core::types::{ExecutionModes, Options, PhaseFlags};
use crate::error::Halt;
use crate::io::journal::{Journal, Level};
use crate::io::ui::UiChannel;

/// Per-node hooks invoked by the lifecycle phases.
///
/// Every hook has a trivial default, so an empty `impl Model for T {}` is a
/// valid pass-through node. Returning `Err(Halt)` terminates the whole tree.
pub trait Model {
    /// Called by the pre-process phase when the node holds no data.
    fn load(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<bool, Halt> {
        Ok(true)
    }

    /// Called by the post-process phase when the node holds no data.
    fn save(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<bool, Halt> {
        Ok(true)
    }

    /// The node's own unit of work, run after all followers. Returns a
    /// residual in `[0, 1]`.
    fn task(&mut self, _ctx: &mut NodeCtx<'_>, _options: &Options) -> Result<f64, Halt> {
        Ok(0.0)
    }

    fn initial_condition(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
        Ok(())
    }

    fn update_nonlinear(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
        Ok(())
    }

    fn update_transient(&mut self, _ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
        Ok(())
    }

    /// Opt-in downcasting for callers that need the concrete model back.
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

/// Model without behavior of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passive;

impl Model for Passive {}

/// Engine-owned state of one node.
pub struct NodeState {
    pub(crate) identifier: String,
    pub(crate) flags: PhaseFlags,
    pub(crate) modes: ExecutionModes,
    pub(crate) ready: bool,
    data: Option<Box<dyn Any>>,
    pub(crate) control: Option<LoopState>,
    pub(crate) exec_started: Option<Instant>,
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("identifier", &self.identifier)
            .field("flags", &self.flags)
            .field("modes", &self.modes)
            .field("ready", &self.ready)
            .field("has_data", &self.data.is_some())
            .field("control", &self.control)
            .finish()
    }
}

impl NodeState {
    pub(crate) fn new(identifier: String, control: Option<LoopState>) -> Self {
        Self {
            identifier,
            flags: PhaseFlags::default(),
            modes: ExecutionModes::default(),
            ready: true,
            data: None,
            control,
            exec_started: None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn flags(&self) -> PhaseFlags {
        self.flags
    }

    pub fn modes(&self) -> ExecutionModes {
        self.modes
    }

    /// True if the node can produce results.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }

    pub fn data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.as_mut()?.downcast_mut()
    }

    /// Store `value`, dropping the previous payload. Returns true if one was
    /// replaced.
    pub fn set_data<T: Any>(&mut self, value: T) -> bool {
        let replaced = self.data.replace(Box::new(value)).is_some();
        if replaced {
            debug!(node = %self.identifier, "data replaced");
        }
        replaced
    }

    pub fn take_data(&mut self) -> Option<Box<dyn Any>> {
        self.data.take()
    }

    /// Loop parameters, present only on control-loop nodes.
    pub fn loop_state(&self) -> Option<&LoopState> {
        self.control.as_ref()
    }

    pub fn loop_state_mut(&mut self) -> Option<&mut LoopState> {
        self.control.as_mut()
    }
}

/// View handed to a [`Model`] hook: its own node plus the output channels.
pub struct NodeCtx<'a> {
    pub state: &'a mut NodeState,
    pub(crate) journal: &'a mut Journal,
    pub(crate) ui: &'a mut dyn UiChannel,
    pub(crate) program: &'a str,
    pub(crate) level: usize,
    pub(crate) silent: bool,
}

impl NodeCtx<'_> {
    /// Tree level of the node (root is 0).
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Journal an indented message.
    pub fn write(&mut self, message: &str) {
        let line = format!("{}{}", indent(self.level), message);
        self.journal.info(&line, !self.silent);
    }

    /// Non-fatal diagnostic, see `Forest::warn`.
    pub fn warn(&mut self, message: &str) {
        emit_warning(
            self.journal,
            self.ui,
            self.program,
            &self.state.identifier,
            self.state.modes.gui,
            self.silent,
            message,
            false,
        );
    }
}

/// Four spaces per tree level.
pub fn indent(level: usize) -> String {
    " ".repeat(4 * level)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_warning(
    journal: &mut Journal,
    ui: &mut dyn UiChannel,
    program: &str,
    identifier: &str,
    gui: bool,
    silent: bool,
    message: &str,
    wait: bool,
) {
    let line = format!("!!! '{program}', warning: '{message}' ({identifier})");
    journal.record(Level::Warning, &line, !silent);
    if gui {
        ui.present_info(&format!("{program} - Warning"), message);
    }
    if !silent && wait {
        ui.acknowledge("!!! Press Enter to continue ...");
    }
}
