use errors::BoxError;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Installs the global logging backend: a [`LogTracer`] first, so `log`
/// macro calls throughout the workspace become tracing events, then the
/// formatting subscriber that prints them. `RUST_LOG` overrides
/// `default_directive`.
pub fn init(default_directive: &str) -> Result<(), BoxError> {
    // Must be registered before the subscriber so no `log` record is lost;
    // filtering stays with the subscriber, so the bridge forwards everything.
    LogTracer::init()?;
    log::set_max_level(log::LevelFilter::Trace);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_wires_the_log_facade() {
        init("info").expect("first init");
        // The `log` bridge is live: records are forwarded, not dropped at
        // the facade.
        assert_eq!(log::max_level(), log::LevelFilter::Trace);

        // Globals are already claimed; a second install must fail loudly.
        assert!(init("info").is_err());
    }
}
