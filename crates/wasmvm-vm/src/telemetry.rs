//! Logging initialization for hosts embedding the VM.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber filtered by `log_level` (an `EnvFilter`
/// directive such as `info` or `wasmvm_vm=debug`).
pub fn init_telemetry(log_level: &str, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry() {
        // A second init in the same process fails instead of panicking
        let first = init_telemetry("info", false);
        let second = init_telemetry("info", true);
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_rejects_bad_filter() {
        assert!(init_telemetry("wasmvm_vm=notalevel", false).is_err());
    }
}
