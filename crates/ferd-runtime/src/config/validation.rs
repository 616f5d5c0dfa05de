//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{FerdConfig, LogOutput, LoggingConfig, SessionConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &FerdConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_session_config(&config.session)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation(
            "Log filter module names cannot be empty",
        ));
    }

    Ok(())
}

fn validate_session_config(session: &SessionConfig) -> ConfigResult<()> {
    let phrases = [
        ("session.greeting", &session.greeting),
        ("session.converse", &session.converse),
        ("session.farewell", &session.farewell),
        ("session.fallback_name", &session.fallback_name),
    ];

    for (field, value) in phrases {
        if value.trim().is_empty() {
            return Err(ConfigError::validation(format!("{field} cannot be empty")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&FerdConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_phrase() {
        let mut config = FerdConfig::default();
        config.session.farewell = "  ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = FerdConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some("ferd.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_filter_module() {
        let mut config = FerdConfig::default();
        config.logging.filters.insert(String::new(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
