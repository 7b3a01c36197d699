//! # Structured Logging
//!
//! Sets up the `tracing` subscriber for the node binary: pretty text for
//! humans, JSON lines for log aggregation, `RUST_LOG` taking precedence
//! over the CLI level when set. Output goes to stderr; stdout stays clean
//! for subcommand results.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber. Call once, first thing in
/// `main` — a second call panics, by design of the global registry.
///
/// `level` is a bare level (`"debug"`) or a full filter directive
/// (`"axon_node=debug,axon_network=trace"`); `RUST_LOG` overrides it.
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    tracing::debug!(level, json, "logging initialized");
}

/// Expands a bare level into directives scoped to our own crates, so
/// `--log-level debug` doesn't drown the output in dependency chatter.
fn default_directives(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        // Already a full directive string; trust the operator.
        level.to_string()
    } else {
        format!("axon_node={level},axon_network={level},info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_our_crates() {
        let directives = default_directives("debug");
        assert!(directives.contains("axon_node=debug"));
        assert!(directives.contains("axon_network=debug"));
    }

    #[test]
    fn full_directives_pass_through() {
        let directives = default_directives("axon_network=trace,hyper=warn");
        assert_eq!(directives, "axon_network=trace,hyper=warn");
    }
}
