//! Logging initialization for the CLI.
//!
//! The subscriber lives here so the library crates only emit events.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crate targets raised by `-v`.
const TARGETS: &[&str] = &["hotpage", "hotpage_core"];

/// Install the global subscriber.
///
/// `verbosity` 0 is INFO, 1 is DEBUG, 2 and above TRACE. `json` switches to
/// one JSON object per line on stderr:
///
/// ```json
/// {"timestamp":"...","level":"INFO","target":"hotpage_core::session","fields":{"generation":2,"message":"build complete"}}
/// ```
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG sets the baseline; the flag still raises our own crates.
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    for target in TARGETS {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
