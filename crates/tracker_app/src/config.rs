use std::fs;
use std::path::Path;

use anyhow::Context;
use tracker_engine::TrackerConfig;
use tracker_logging::tracker_info;

use crate::cli::Cli;

/// Config file first, then command-line and environment overrides.
pub fn load(cli: &Cli) -> anyhow::Result<TrackerConfig> {
    let mut config = match &cli.config {
        Some(path) => read_file(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(transport) = cli.transport {
        config.transport = transport.into();
    }
    if !config.base_url.ends_with('/') {
        config.base_url.push('/');
    }
    Ok(config)
}

fn read_file(path: &Path) -> anyhow::Result<TrackerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config = ron::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    tracker_info!("loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tracker_engine::TransportKind;

    #[test]
    fn file_values_are_overridden_by_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracker.ron");
        fs::write(
            &path,
            r#"(base_url: "https://from-file.example", tracker: (max_handlers_per_job: 2))"#,
        )
        .unwrap();

        let path_arg = path.to_str().unwrap();
        let cli = Cli::try_parse_from([
            "tracker",
            "--config",
            path_arg,
            "--transport",
            "websocket",
            "list",
        ])
        .unwrap();
        let config = load(&cli).unwrap();

        assert_eq!(config.base_url, "https://from-file.example/");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.tracker.max_handlers_per_job, 2);
        assert_eq!(config.tracker.max_connection_handlers, 5);
        assert_eq!(config.polling.max_attempts, 18);
    }

    #[test]
    fn missing_file_is_an_error() {
        let cli = Cli::try_parse_from(["tracker", "--config", "/nonexistent/tracker.ron", "list"])
            .unwrap();
        assert!(load(&cli).is_err());
    }
}
