use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `notyra_lib=debug`.
pub const LOG_ENV: &str = "NOTYRA_LOG";

const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `NOTYRA_LOG` (default `info`).
/// Returns false if a global subscriber was already installed.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        assert!(!init());
    }
}
