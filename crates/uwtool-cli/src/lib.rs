//! Shared plumbing for the command-line tools.

/// Wire `--debug` into the log filter; `RUST_LOG` still wins when set.
pub fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}
