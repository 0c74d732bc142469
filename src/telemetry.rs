//! telemetry
//!
//! `tracing` subscriber setup for the binary.
//!
//! Logs go to stderr. The level comes from the CLI verbosity and can be
//! overridden with `PULL_DETACHED_LOG` using `EnvFilter` directives, e.g.
//! `PULL_DETACHED_LOG=pull_detached::git=debug`.

use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable with `EnvFilter` directives.
pub const LOG_ENV_VAR: &str = "PULL_DETACHED_LOG";

/// Console verbosity selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        match (quiet, debug) {
            (_, true) => Verbosity::Debug,
            (true, false) => Verbosity::Quiet,
            (false, false) => Verbosity::Normal,
        }
    }
}

fn level_from_verbosity(verbosity: Verbosity) -> LevelFilter {
    match verbosity {
        Verbosity::Quiet => LevelFilter::ERROR,
        Verbosity::Normal => LevelFilter::INFO,
        Verbosity::Debug => LevelFilter::DEBUG,
    }
}

/// Install the global subscriber.
///
/// A second call is ignored, so tests may call it freely.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity == Verbosity::Debug)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_wins_over_quiet() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }

    #[test]
    fn levels() {
        assert_eq!(level_from_verbosity(Verbosity::Quiet), LevelFilter::ERROR);
        assert_eq!(level_from_verbosity(Verbosity::Normal), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(Verbosity::Debug), LevelFilter::DEBUG);
    }

    #[test]
    fn init_twice_is_harmless() {
        init(Verbosity::Quiet);
        init(Verbosity::Debug);
    }
}
