use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Installs the global subscriber. `RUST_LOG` wins over the built-in default.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,attachmail=debug"));
    let fmt_layer = fmt::layer().with_target(true);

    if let Err(e) = Registry::default().with(env_filter).with(fmt_layer).try_init() {
        eprintln!("tracing already initialized: {e}");
    }
}
