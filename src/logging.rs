use env_logger::Builder;
use log::LevelFilter;

/// Initialize logging with customizable verbosity
pub fn init_logging(verbose: bool) {
    let mut builder = Builder::new();

    if verbose {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.filter_level(LevelFilter::Info);
    }

    // RUST_LOG still wins when set
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    let _ = builder.format_timestamp_millis().try_init();
}
