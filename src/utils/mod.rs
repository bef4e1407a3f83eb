//! Utilities: logging setup (level from -v/-q, overridable with RUST_LOG)
//! and small helpers shared by the front-end commands.

/// Logging helpers.
pub mod logging {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::filter::LevelFilter;

    /// `-q` wins over `-v`; otherwise each `-v` raises the level one step.
    pub fn derive_level(verbose: u8, quiet: bool) -> LevelFilter {
        if quiet {
            return LevelFilter::ERROR;
        }
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Install the global subscriber. Logs always go to stderr: stdout may
    /// carry protocol frames or command output.
    pub fn init_logging(level: LevelFilter) {
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

pub use logging::{derive_level, init_logging};

/// Run `fut` on a fresh multi-thread runtime.
pub fn block_on<F: std::future::Future>(fut: F) -> anyhow::Result<F::Output> {
    use anyhow::Context;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime")?;
    Ok(rt.block_on(fut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn quiet_wins() {
        assert_eq!(derive_level(3, true), LevelFilter::ERROR);
        assert_eq!(derive_level(0, false), LevelFilter::WARN);
        assert_eq!(derive_level(1, false), LevelFilter::INFO);
        assert_eq!(derive_level(9, false), LevelFilter::TRACE);
    }
}
