//! Log output setup.

/// Environment variable read when no level is given on the command line.
pub const LOG_ENV: &str = "NVIDIA_TUNER_LOG";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Pick the filter: command line first, then [`LOG_ENV`], then `info`.
pub fn resolve_filter(cli_level: Option<&str>, env_level: Option<String>) -> String {
    cli_level
        .map(str::to_string)
        .or(env_level)
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(cli_level: Option<&str>) {
    let log_level = resolve_filter(cli_level, std::env::var(LOG_ENV).ok());

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(&log_level)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(resolve_filter(Some("debug"), Some("warn".into())), "debug");
        assert_eq!(resolve_filter(None, Some("warn".into())), "warn");
        assert_eq!(resolve_filter(None, None), "info");
        assert_eq!(resolve_filter(None, Some(" ".into())), "info");
    }
}
