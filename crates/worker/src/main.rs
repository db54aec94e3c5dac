use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidfan_core::config::ENV_PREFIX;
use vidfan_core::{
    load_config, load_config_or_default, validate_config, Config, FsStore, ObjectStore, Pipeline,
    PipelineJob, ProcessRunner, SanitizedConfig, StoreBackend, SwiftStore, TransformProfile,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file, used when `VIDFAN_CONFIG` is unset
const DEFAULT_CONFIG_PATH: &str = "vidfan.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();
    info!(version = VERSION, "Starting vidfan worker");

    let config = load(std::env::var(format!("{}CONFIG", ENV_PREFIX)).ok())?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config))
        .context("Failed to serialize configuration")?;
    info!(config = %sanitized, "Configuration loaded successfully");

    let job = PipelineJob::from_config(&config);

    // Fail before downloading anything if the transcoder is missing
    let runner = ProcessRunner::new(config.runner.clone());
    if uses_runner_program(&config, &job.catalog) {
        runner.validate().await.with_context(|| {
            format!(
                "Transformation program {} is not available",
                config.runner.program
            )
        })?;
    }

    let store = create_store(&config)?;
    info!("Using object store: {}", store.name());

    let pipeline = Pipeline::new(job, store, Arc::new(runner))
        .with_config(config.pipeline.clone())
        .with_transfer(config.transfer.clone());

    let report = pipeline.run().await.context("Pipeline run failed")?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);

    if let Some(e) = &report.first_error {
        bail!("Pipeline run failed: {}", e);
    }

    info!(run_id = %report.run_id, "All artifacts uploaded");
    Ok(())
}

/// Whether any profile runs the configured transcoder. Other programs
/// are not checked since `-version` means nothing to them.
fn uses_runner_program(config: &Config, catalog: &[TransformProfile]) -> bool {
    catalog.iter().any(|p| p.program == config.runner.program)
}

fn init_logging() {
    let json = std::env::var(format!("{}LOG_FORMAT", ENV_PREFIX))
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr; stdout carries the run report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Loads the explicitly configured file, or the default file if present.
fn load(explicit: Option<String>) -> Result<Config> {
    match explicit {
        Some(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                info!("Loading configuration from {:?}", path);
            } else {
                warn!(
                    "No {} found, using defaults and environment overrides",
                    DEFAULT_CONFIG_PATH
                );
            }
            load_config_or_default(path)
                .with_context(|| format!("Failed to load config from {:?}", path))
        }
    }
}

fn create_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.store.backend {
        StoreBackend::Swift => {
            let swift = config
                .store
                .swift
                .clone()
                .context("Swift backend selected but no store.swift config provided")?;
            info!("Initializing Swift store at {}", swift.storage_url);
            let store = SwiftStore::new(swift).context("Failed to create Swift client")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Fs => {
            let fs = config
                .store
                .fs
                .clone()
                .context("Fs backend selected but no store.fs config provided")?;
            info!("Initializing local store at {:?}", fs.root);
            Ok(Arc::new(FsStore::new(fs)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use vidfan_core::config::{FsStoreConfig, SwiftConfig};
    use vidfan_core::load_config_from_str;

    #[test]
    fn test_create_fs_store() {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Fs;
        config.store.fs = Some(FsStoreConfig {
            root: PathBuf::from("/tmp/objects"),
        });

        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "fs");
    }

    #[test]
    fn test_create_swift_store() {
        let mut config = Config::default();
        config.store.swift = Some(SwiftConfig {
            storage_url: "https://storage.example.com/v1/acct".to_string(),
            auth_token: "token".to_string(),
            timeout_secs: 60,
            connect_timeout_secs: 5,
        });

        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "swift");
    }

    #[test]
    fn test_create_store_without_section_fails() {
        let config = Config::default();
        assert!(create_store(&config).is_err());
    }

    #[test]
    fn test_builtin_catalog_checks_runner_program() {
        let config = Config::default();
        assert!(uses_runner_program(&config, &config.catalog()));
    }

    #[test]
    fn test_custom_programs_are_not_checked() {
        let config = load_config_from_str(
            r#"
[[profiles]]
name = "copy"
extension = "bin"
content_type = "application/octet-stream"
program = "cp"
args = ["{input}", "{output}"]
"#,
        )
        .unwrap();
        assert!(!uses_runner_program(&config, &config.catalog()));
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let result = load(Some("/nonexistent/vidfan.toml".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
input_key = "clip.mov"
"#
        )
        .unwrap();

        let config = load(Some(file.path().display().to_string())).unwrap();
        assert_eq!(config.storage.input_key, "clip.mov");
    }
}
