use env_logger::Env;

const TRACING_ENV: &str = "PATIENT_RECONCILE_TRACING";

/// Install the process logger. `env_logger` is the default; setting
/// `PATIENT_RECONCILE_TRACING=1` switches to a tracing subscriber instead.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    if tracing_requested() {
        init_tracing_from_env(default_level);
    } else {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
            .try_init();
    }
}

fn tracing_requested() -> bool {
    std::env::var(TRACING_ENV)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub fn init_tracing_from_env(default_level: &str) {
    // Bridge log:: macros into tracing so library code keeps using the log facade
    let _ = tracing_log::LogTracer::init();
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
