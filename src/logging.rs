use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "editor_relay=info,tower_http=info";
const VERBOSE_FILTER: &str = "editor_relay=debug,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` wins over `verbose`. Logs go to
/// stderr so CLI output on stdout stays machine-readable.
pub fn init(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
