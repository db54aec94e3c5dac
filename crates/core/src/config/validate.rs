use super::{
    types::{Config, StoreBackend},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Container and key names are not empty
/// - The selected store backend has its section
/// - Pipeline, runner and transfer limits are positive
/// - Retry backoff does not shrink
/// - Configured profiles are usable
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let storage = &config.storage;
    for (field, value) in [
        ("storage.input_container", &storage.input_container),
        ("storage.output_container", &storage.output_container),
        ("storage.input_key", &storage.input_key),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(format!("{} cannot be empty", field)));
        }
    }

    // Store validation
    match config.store.backend {
        StoreBackend::Swift => {
            let swift = config.store.swift.as_ref().ok_or_else(|| {
                invalid("store.swift section is required when backend = \"swift\"")
            })?;
            if swift.storage_url.is_empty() {
                return Err(invalid("store.swift.storage_url cannot be empty"));
            }
            if swift.auth_token.is_empty() {
                return Err(invalid("store.swift.auth_token cannot be empty"));
            }
        }
        StoreBackend::Fs => {
            if config.store.fs.is_none() {
                return Err(invalid("store.fs section is required when backend = \"fs\""));
            }
        }
    }

    if config.pipeline.max_parallel_tasks == 0 {
        return Err(invalid("pipeline.max_parallel_tasks cannot be 0"));
    }
    if config.runner.timeout_secs == 0 {
        return Err(invalid("runner.timeout_secs cannot be 0"));
    }
    if config.transfer.retry.max_attempts == 0 {
        return Err(invalid("transfer.retry.max_attempts cannot be 0"));
    }
    let multiplier = config.transfer.retry.backoff_multiplier;
    if multiplier.is_nan() || multiplier < 1.0 {
        return Err(invalid("transfer.retry.backoff_multiplier must be at least 1.0"));
    }
    if config.transfer.chunk_size == 0 {
        return Err(invalid("transfer.chunk_size cannot be 0"));
    }

    if let Some(profiles) = &config.profiles {
        if profiles.is_empty() {
            return Err(invalid("profiles cannot be an empty list"));
        }
        for profile in profiles {
            if profile.name.trim().is_empty() || profile.extension.trim().is_empty() {
                return Err(invalid("profile name and extension cannot be empty"));
            }
            if profile.program.trim().is_empty() {
                return Err(invalid(format!(
                    "profile {} has an empty program",
                    profile.name
                )));
            }
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
