// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Node settings, read once at startup.
//!
//! Sources are merged in this order, later ones overriding earlier ones:
//! 1. `base_config/config.toml`, or the file named by `PAREX_CONFIG_PATH`
//! 2. `config/config.toml` if it exists, or the file given on the command line
//! 3. environment variables prefixed with `PAREX__`, nested keys separated by `__`
//!    (for example `PAREX__EXECUTION__LOCAL_WORKER_COUNT=8`)

use parex_execution_exports::ExecutionConfig;
use serde::Deserialize;
use std::path::Path;

const BASE_CONFIG_PATH: &str = "base_config/config.toml";
const OVERRIDE_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoggingSettings {
    /// 0: error, 1: warn, 2: info, 3: debug, 4: trace
    pub level: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub execution: ExecutionConfig,
}

impl Settings {
    /// Merge the settings sources. An explicit `override_path` must exist.
    pub fn load(override_path: Option<&Path>) -> Result<Settings, config::ConfigError> {
        let base_path =
            std::env::var("PAREX_CONFIG_PATH").unwrap_or_else(|_| BASE_CONFIG_PATH.to_string());
        let override_source = match override_path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(OVERRIDE_CONFIG_PATH).required(false),
        };
        config::Config::builder()
            .add_source(config::File::with_name(&base_path))
            .add_source(override_source)
            .add_source(
                config::Environment::with_prefix("PAREX")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_execution_exports::RouterMode;
    use std::io::Write;
    use std::time::Duration;

    fn base_config() -> &'static Path {
        Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/base_config/config.toml"))
    }

    fn read(paths: &[&Path]) -> Settings {
        let mut builder = config::Config::builder();
        for path in paths {
            builder = builder.add_source(config::File::from(*path));
        }
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_base_config_is_valid() {
        let settings = read(&[base_config()]);
        assert_eq!(settings.logging.level, 2);
        assert_eq!(settings.execution.mode, RouterMode::Local);
        assert_eq!(settings.execution.dispatch_timeout, None);
        assert_eq!(
            settings.execution.worker_ready_timeout,
            Duration::from_millis(5000)
        );
        assert_eq!(
            settings.execution.cluster.seed_addresses(),
            vec![settings.execution.cluster.bind_address()]
        );
    }

    #[test]
    fn test_override_file_wins() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[execution]\nmode = \"cluster\"\ndispatch_timeout = 1500\n[execution.cluster]\nnode_name = \"node-b\""
        )
        .unwrap();
        let settings = read(&[base_config(), file.path()]);
        assert_eq!(settings.execution.mode, RouterMode::Cluster);
        assert_eq!(
            settings.execution.dispatch_timeout,
            Some(Duration::from_millis(1500))
        );
        assert_eq!(settings.execution.cluster.node_name, "node-b");
        assert_eq!(settings.execution.local_worker_count, 4);
    }
}
