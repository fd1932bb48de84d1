use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging on stderr so prompts and status lines on stdout stay
/// readable.
///
/// `RUST_LOG` wins when set; otherwise only warnings are shown, or
/// everything down to debug with `verbose`.
///
/// ```
/// converter::init_logging(false);
/// ```
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
