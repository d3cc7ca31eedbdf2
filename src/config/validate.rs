// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AppdockError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AppdockError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_orchestrator_section(cfg)?;
    validate_recognizers(cfg)?;
    Ok(())
}

fn validate_orchestrator_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.orchestrator.queue_capacity == 0 {
        return Err(AppdockError::Config(
            "[orchestrator].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.orchestrator.terminate_grace_secs == 0 {
        return Err(AppdockError::Config(
            "[orchestrator].terminate_grace_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(0) = cfg.orchestrator.job_deadline_secs {
        return Err(AppdockError::Config(
            "[orchestrator].job_deadline_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_recognizers(cfg: &RawConfigFile) -> Result<()> {
    for spec in cfg.recognizer.iter() {
        if spec.name.trim().is_empty() {
            return Err(AppdockError::Config(
                "[[recognizer]] entries must have a non-empty name".to_string(),
            ));
        }

        if let Err(e) = Regex::new(&spec.pattern) {
            return Err(AppdockError::Config(format!(
                "recognizer '{}' has invalid pattern '{}': {}",
                spec.name, spec.pattern, e
            )));
        }
    }

    Ok(())
}
