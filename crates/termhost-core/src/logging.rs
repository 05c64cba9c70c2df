use tracing_subscriber::EnvFilter;

/// Install the global JSON subscriber on stderr.
///
/// `RUST_LOG` wins when set. Otherwise `quiet` turns logging off entirely,
/// else `info`.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(quiet: bool) {
    let default_level = if quiet { "off" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
