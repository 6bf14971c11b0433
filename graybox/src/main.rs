//! Gray-box execution tree runner.
//!
//! Loads a tree description (TOML), builds the forest and executes each root
//! in file order. Without an input file a single root named after the
//! program runs on its own.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info};

use graybox::core::description::{NodeEntry, TreeDescription};
use graybox::error::Terminated;
use graybox::exit_codes;
use graybox::forest::Forest;
use graybox::io::auth::PasswordGate;
use graybox::io::config::{GrayboxConfig, load_config};
use graybox::io::rank::{EnvRank, RankOracle};
use graybox::io::tree_file::{build, load_tree_file};
use graybox::io::ui::ConsoleUi;
use graybox::logging;
use graybox::session::Session;

#[derive(Debug, Parser)]
#[command(
    name = "graybox",
    version,
    about = "Run a hierarchical gray-box execution tree",
    after_help = "Example:\n    graybox -s ./runs plant.toml\n\n\
                  Two positionals without --silent ask for the password first."
)]
struct Cli {
    /// Surface warnings and termination on the interactive channel.
    #[arg(short, long)]
    gui: bool,
    /// No console output and no password prompt.
    #[arg(short, long)]
    silent: bool,
    /// TOML config file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Working directory for the session log; input files resolve against it.
    path: Option<PathBuf>,
    /// Tree description (TOML).
    input_file: Option<PathBuf>,
}

impl Cli {
    /// Two positionals without `--silent` switch the password gate on.
    fn needs_password(&self) -> bool {
        self.path.is_some() && self.input_file.is_some() && !self.silent
    }

    fn resolved_input(&self) -> Option<PathBuf> {
        let input = self.input_file.as_ref()?;
        match &self.path {
            Some(path) if input.is_relative() => Some(path.join(input)),
            _ => Some(input.clone()),
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            let code = if err.downcast_ref::<Terminated>().is_some() {
                exit_codes::TERMINATED
            } else {
                exit_codes::INVALID
            };
            std::process::exit(code);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let rank = EnvRank::from_env();
    if rank.is_non_primary() {
        debug!(rank = ?rank.rank(), "non-primary rank, nothing to do");
        return Ok(exit_codes::SKIPPED);
    }

    let cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => GrayboxConfig::default(),
    };
    let mut session = Session::from_config(&cfg);
    if let Some(path) = &cli.path {
        session.log_dir = Some(path.clone());
    }
    if cli.needs_password() {
        session = session.with_gate(PasswordGate::new(&cfg.auth.password_sha224));
    }

    let description = match cli.resolved_input() {
        Some(input) => load_tree_file(&input)?,
        None => lone_root(&cfg.program),
    };
    let mut options = description.options.clone();
    if cli.silent {
        options.silent = Some(true);
    }

    let mut forest = Forest::new()
        .with_ui(Box::new(ConsoleUi))
        .with_rank(Box::new(rank))
        .with_session(session);
    let built = build(&mut forest, &description).context("build forest")?;
    if built.roots.is_empty() {
        bail!("tree description has no root node");
    }

    for root in built.roots {
        if !forest.contains(root) {
            continue;
        }
        if cli.gui {
            forest.set_gui(root, true);
        }
        let residual = forest.execute(root, &options)?;
        info!(root = %root, residual, "root finished");
    }
    Ok(exit_codes::OK)
}

fn lone_root(program: &str) -> TreeDescription {
    TreeDescription {
        nodes: vec![NodeEntry {
            id: program.to_string(),
            ..NodeEntry::default()
        }],
        ..TreeDescription::default()
    }
}
