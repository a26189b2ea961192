use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tries to load tracing config from environment (RUST_LOG) or uses "chatterbox=info".
/// Logs go to stderr so they never interleave with the shell's stdout.
/// `LOG_FORMAT=json` switches to structured output.
pub fn setup_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatterbox=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|x| x.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
