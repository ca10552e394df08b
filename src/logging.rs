use std::io::IsTerminal;

use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TODO_LOG";

/// Installs the stderr subscriber. `TODO_LOG` overrides the verbosity default.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .finish();
    // A second init (tests driving `run` in-process) keeps the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

#[cfg(test)]
mod tests {
    use tracing::metadata::LevelFilter;

    use super::level_from_verbosity;

    #[test]
    fn verbosity_raises_the_default_level() {
        assert_eq!(level_from_verbosity(0), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(1), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(2), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(9), LevelFilter::DEBUG);
    }
}
