//! Configuration loading.
//!
//! Flow: locate the file, substitute `${VAR}` placeholders, parse YAML,
//! apply `AEROGATE_*` environment overrides, validate.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use super::error::ConfigError;
use super::schema::GatewayConfig;
use crate::protocol::AccessRole;
use crate::session::TransportKind;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "AEROGATE_CONFIG";

/// Configuration file search paths (in priority order, explicit path excluded).
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from("/etc/aerogate/config.yaml"));
    paths.push(PathBuf::from("./aerogate.yaml"));

    paths
}

/// Find the config file to load.
///
/// Returns `Ok(None)` when nothing is found on the default search path.
///
/// # Errors
///
/// `ConfigFileNotFound` when `explicit_path` is given but does not exist.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ConfigFileNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    Ok(default_config_paths().into_iter().find(|p| p.exists()))
}

/// Parse a config file (substitution included, no overrides or validation).
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }

    let contents = substitute_env_vars(&contents)?;
    let config: GatewayConfig = serde_saphyr::from_str(&contents)?;
    Ok(config)
}

/// Full startup load: file (or defaults), env overrides, validation.
pub fn load(explicit_path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match find_config_file(explicit_path)? {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            load_config(&path)?
        }
        None => {
            info!("No configuration file found, using defaults");
            GatewayConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment variable substitution
// ─────────────────────────────────────────────────────────────────────────────

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// The pattern is exercised by test_env_var_pattern_compiles().
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("BUG: ENV_VAR_PATTERN regex is invalid")
});

/// Replace `${VAR}` (required) and `${VAR:-default}` (optional) placeholders.
///
/// # Errors
///
/// `MissingEnvVar` for the first required variable that is unset.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;

    let replaced = ENV_VAR_PATTERN.replace_all(content, |caps: &regex::Captures<'_>| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(value) => value,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    if missing.is_none() {
                        missing = Some((var.to_string(), caps[0].to_string()));
                    }
                    String::new()
                }
            },
        }
    });

    if let Some((var, placeholder)) = missing {
        return Err(ConfigError::MissingEnvVar { var, placeholder });
    }
    Ok(replaced.into_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment overrides
// ─────────────────────────────────────────────────────────────────────────────

/// Apply `AEROGATE_TRANSPORT`, `AEROGATE_BIND`, `AEROGATE_PORT` and `AEROGATE_ROLE`.
///
/// Unparsable values are ignored with a warning.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    config.transport = parse_env_warn::<TransportKind>("AEROGATE_TRANSPORT", config.transport);
    config.port = parse_env_warn::<u16>("AEROGATE_PORT", config.port);
    config.role = parse_env_warn::<AccessRole>("AEROGATE_ROLE", config.role);

    if let Ok(bind) = std::env::var("AEROGATE_BIND") {
        if bind.trim().is_empty() {
            warn!(env_var = "AEROGATE_BIND", "Empty value for environment variable, ignoring");
        } else {
            config.bind = bind;
        }
    }
}

/// Parse an environment variable with a warning on invalid values.
fn parse_env_warn<T: std::str::FromStr + std::fmt::Display>(name: &str, current: T) -> T {
    match std::env::var(name) {
        Ok(val) => match val.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    keeping = %current,
                    "Invalid value for environment variable, ignoring"
                );
                current
            }
        },
        Err(_) => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_env_var_pattern_compiles() {
        assert!(ENV_VAR_PATTERN.is_match("${FOO}"));
        assert!(ENV_VAR_PATTERN.is_match("${FOO:-bar}"));
        assert!(!ENV_VAR_PATTERN.is_match("$FOO"));
    }

    #[test]
    #[serial]
    fn test_substitute_env_vars() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe { std::env::set_var("AEROGATE_TEST_AUDIT_DIR", "/var/log/aerogate") };

        let out = substitute_env_vars("file_path: ${AEROGATE_TEST_AUDIT_DIR}/audit.jsonl").unwrap();
        assert_eq!(out, "file_path: /var/log/aerogate/audit.jsonl");

        let out = substitute_env_vars("role: ${AEROGATE_TEST_UNSET_ROLE:-admin}").unwrap();
        assert_eq!(out, "role: admin");

        unsafe { std::env::remove_var("AEROGATE_TEST_AUDIT_DIR") };
    }

    #[test]
    #[serial]
    fn test_substitute_missing_required_var() {
        let err = substitute_env_vars("bind: ${AEROGATE_TEST_DEFINITELY_UNSET}").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar { ref var, .. } if var == "AEROGATE_TEST_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn test_load_config_file() {
        let file = write_config(
            "transport: sse\nport: 9090\nrole: admin\nrate_limit:\n  burst_size: 10\n",
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.port, 9090);
        assert_eq!(config.role, AccessRole::Admin);
        assert_eq!(config.rate_limit.burst_size, 10);
        assert_eq!(config.rate_limit.requests_per_second, 100.0);
        assert_eq!(config.session.queue_capacity, 100);
    }

    #[test]
    fn test_websocket_alias_selects_polling() {
        let file = write_config("transport: websocket\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.transport, TransportKind::Polling);
    }

    #[test]
    fn test_empty_file_is_error() {
        let file = write_config("   \n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::EmptyConfigFile)
        ));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let file = write_config("role: [unclosed\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let err = find_config_file(Some(Path::new("/nonexistent/aerogate.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigFileNotFound { .. }));
    }

    #[test]
    #[serial]
    fn test_load_validates() {
        let file = write_config("transport: polling\nport: 0\n");
        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe {
            std::env::set_var("AEROGATE_TRANSPORT", "polling");
            std::env::set_var("AEROGATE_PORT", "not-a-port");
            std::env::set_var("AEROGATE_ROLE", "read-write");
            std::env::set_var("AEROGATE_BIND", "127.0.0.1");
        }

        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config);

        unsafe {
            std::env::remove_var("AEROGATE_TRANSPORT");
            std::env::remove_var("AEROGATE_PORT");
            std::env::remove_var("AEROGATE_ROLE");
            std::env::remove_var("AEROGATE_BIND");
        }

        assert_eq!(config.transport, TransportKind::Polling);
        assert_eq!(config.port, 8080);
        assert_eq!(config.role, AccessRole::ReadWrite);
        assert_eq!(config.bind, "127.0.0.1");
    }
}
