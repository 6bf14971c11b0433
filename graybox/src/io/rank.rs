//! Process rank lookup for distributed runs.
//!
//! The [`RankOracle`] trait decouples the engine from the launcher. When no
//! rank can be determined the process counts as primary.

use tracing::debug;

/// Launcher variables holding the process rank, checked in order.
pub const RANK_VARS: [&str; 4] = ["OMPI_COMM_WORLD_RANK", "PMI_RANK", "PMIX_RANK", "SLURM_PROCID"];

pub trait RankOracle {
    /// Rank of this process, `None` if not part of a distributed run.
    fn rank(&self) -> Option<u32>;

    fn is_non_primary(&self) -> bool {
        self.rank().is_some_and(|rank| rank > 0)
    }
}

/// Oracle for plain single-process runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl RankOracle for SingleProcess {
    fn rank(&self) -> Option<u32> {
        None
    }
}

/// Oracle reading the rank from launcher environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvRank {
    rank: Option<u32>,
}

impl EnvRank {
    /// Resolve the rank once from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let rank = RANK_VARS.iter().find_map(|name| {
            let raw = lookup(name)?;
            let rank = raw.trim().parse::<u32>().ok()?;
            debug!(var = name, rank, "process rank resolved");
            Some(rank)
        });
        Self { rank }
    }
}

impl RankOracle for EnvRank {
    fn rank(&self) -> Option<u32> {
        self.rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_is_primary() {
        assert!(!SingleProcess.is_non_primary());
    }

    #[test]
    fn env_rank_takes_first_parseable_variable() {
        let oracle = EnvRank::from_lookup(|name| match name {
            "OMPI_COMM_WORLD_RANK" => Some("not-a-number".to_string()),
            "PMI_RANK" => Some(" 2 ".to_string()),
            "SLURM_PROCID" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(oracle.rank(), Some(2));
        assert!(oracle.is_non_primary());
    }

    #[test]
    fn rank_zero_and_unknown_are_primary() {
        let zero = EnvRank::from_lookup(|name| (name == "SLURM_PROCID").then(|| "0".to_string()));
        assert_eq!(zero.rank(), Some(0));
        assert!(!zero.is_non_primary());

        let unknown = EnvRank::from_lookup(|_| None);
        assert_eq!(unknown.rank(), None);
        assert!(!unknown.is_non_primary());
    }
}
