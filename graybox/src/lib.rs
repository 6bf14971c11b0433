//! Hierarchical gray-box execution trees.
//!
//! A [`forest::Forest`] owns nodes linked by leader/follower ownership and
//! cooperator listings. Every node runs the same three-phase lifecycle
//! (pre-process, task, post-process); control-loop nodes repeat the task
//! phase under nonlinear-iteration and time-stepping rules. The crate keeps
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (slot arena, loop settings,
//!   convergence algorithms, tree descriptions). No I/O.
//! - **[`io`]**: Side-effecting collaborators (journal, config, rank oracle,
//!   UI channel, password gate, description files).
//!
//! Orchestration modules ([`forest`], [`lifecycle`], [`control_loop`],
//! [`session`]) drive models through the [`node::Model`] hooks;
//! [`fitting`] is a model that fits submodel weights through pluggable
//! optimizer backends.

pub mod control_loop;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod fitting;
pub mod forest;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod node;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
