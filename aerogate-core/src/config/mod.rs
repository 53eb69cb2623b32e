//! Gateway configuration: YAML schema, search path, env substitution and overrides.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{
    CONFIG_ENV_VAR, apply_env_overrides, default_config_paths, find_config_file, load,
    load_config, substitute_env_vars,
};
pub use schema::{AuditConfig, GatewayConfig, RateLimitConfig, SessionConfig, ValidatorConfig};
