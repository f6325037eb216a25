//! Structured logging.
//!
//! `RUST_LOG` wins when set. Otherwise the crate logs at `info`, or `debug`
//! with `--verbose`.

use std::io::Write;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "mixbridge=debug"
    } else {
        "mixbridge=info"
    }
}

pub fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(verbose).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Push out anything still buffered before the process exits.
pub fn flush() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_raises_level() {
        assert_eq!(default_directive(false), "mixbridge=info");
        assert_eq!(default_directive(true), "mixbridge=debug");
    }
}
