//! Stateless input checks.
//!
//! Each check is independent and returns a field + message error; callers run
//! only the checks relevant to the operation at hand.
//! [`Validator::validate_arguments`] applies them to the well-known members of
//! an invocation's arguments.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ValidatorConfig;

const MAX_INDEX_NAME_LENGTH: usize = 256;
const MAX_MODULE_NAME_LENGTH: usize = 128;

/// Lower-case substrings rejected in server-side code payloads.
const DANGEROUS_CODE_PATTERNS: &[&str] = &["os.execute", "io.popen", "loadfile", "dofile"];

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// The pattern is exercised by test_identifier_pattern_compiles().
static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+$").expect("BUG: IDENTIFIER_PATTERN regex is invalid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn is_valid_identifier(s: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(s)
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: ValidatorConfig,
}

impl Validator {
    pub fn new(limits: ValidatorConfig) -> Self {
        Self { limits }
    }

    pub fn validate_namespace(&self, namespace: &str) -> Result<(), ValidationError> {
        if namespace.is_empty() {
            return Err(ValidationError::new("namespace", "cannot be empty"));
        }
        if namespace.len() > self.limits.max_namespace_length {
            return Err(ValidationError::new(
                "namespace",
                format!(
                    "exceeds maximum length of {}",
                    self.limits.max_namespace_length
                ),
            ));
        }
        if !is_valid_identifier(namespace) {
            return Err(ValidationError::new(
                "namespace",
                "contains invalid characters (must be alphanumeric, underscore, or hyphen)",
            ));
        }
        Ok(())
    }

    /// An empty set name is allowed (the set is optional).
    pub fn validate_set_name(&self, set_name: &str) -> Result<(), ValidationError> {
        if set_name.is_empty() {
            return Ok(());
        }
        if set_name.len() > self.limits.max_set_name_length {
            return Err(ValidationError::new(
                "set_name",
                format!(
                    "exceeds maximum length of {}",
                    self.limits.max_set_name_length
                ),
            ));
        }
        if !is_valid_identifier(set_name) {
            return Err(ValidationError::new(
                "set_name",
                "contains invalid characters (must be alphanumeric, underscore, or hyphen)",
            ));
        }
        Ok(())
    }

    /// Keys may contain any character; only emptiness and byte length are checked.
    pub fn validate_key(&self, key: &str) -> Result<(), ValidationError> {
        if key.is_empty() {
            return Err(ValidationError::new("key", "cannot be empty"));
        }
        if key.len() > self.limits.max_key_length {
            return Err(ValidationError::new(
                "key",
                format!("exceeds maximum length of {}", self.limits.max_key_length),
            ));
        }
        Ok(())
    }

    pub fn validate_bin_name(&self, bin_name: &str) -> Result<(), ValidationError> {
        if bin_name.is_empty() {
            return Err(ValidationError::new("bin_name", "cannot be empty"));
        }
        if bin_name.len() > self.limits.max_bin_name_length {
            return Err(ValidationError::new(
                "bin_name",
                format!(
                    "exceeds maximum length of {}",
                    self.limits.max_bin_name_length
                ),
            ));
        }
        if !is_valid_identifier(bin_name) {
            return Err(ValidationError::new(
                "bin_name",
                "contains invalid characters (must be alphanumeric, underscore, or hyphen)",
            ));
        }
        Ok(())
    }

    pub fn validate_bin_names<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ValidationError> {
        names
            .into_iter()
            .try_for_each(|name| self.validate_bin_name(name))
    }

    pub fn validate_batch_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::new("batch_size", "must be positive"));
        }
        if size > self.limits.max_batch_size {
            return Err(ValidationError::new(
                "batch_size",
                format!("exceeds maximum of {}", self.limits.max_batch_size),
            ));
        }
        Ok(())
    }

    /// Serialized size of a record's bins.
    pub fn validate_record_size(&self, size: usize) -> Result<(), ValidationError> {
        if size > self.limits.max_record_size {
            return Err(ValidationError::new(
                "record",
                format!(
                    "size {size} exceeds maximum of {} bytes",
                    self.limits.max_record_size
                ),
            ));
        }
        Ok(())
    }

    pub fn validate_index_name(&self, index_name: &str) -> Result<(), ValidationError> {
        if index_name.is_empty() {
            return Err(ValidationError::new("index_name", "cannot be empty"));
        }
        if index_name.len() > MAX_INDEX_NAME_LENGTH {
            return Err(ValidationError::new(
                "index_name",
                format!("exceeds maximum length of {MAX_INDEX_NAME_LENGTH}"),
            ));
        }
        if !is_valid_identifier(index_name) {
            return Err(ValidationError::new(
                "index_name",
                "contains invalid characters",
            ));
        }
        Ok(())
    }

    pub fn validate_module_name(&self, module_name: &str) -> Result<(), ValidationError> {
        if module_name.is_empty() {
            return Err(ValidationError::new("module_name", "cannot be empty"));
        }
        if module_name.len() > MAX_MODULE_NAME_LENGTH {
            return Err(ValidationError::new(
                "module_name",
                format!("exceeds maximum length of {MAX_MODULE_NAME_LENGTH}"),
            ));
        }
        if !module_name.to_ascii_lowercase().ends_with(".lua") {
            return Err(ValidationError::new(
                "module_name",
                "must end with .lua extension",
            ));
        }
        Ok(())
    }

    /// Case-insensitive denylist scan over executable code.
    pub fn validate_code(&self, code: &str) -> Result<(), ValidationError> {
        if code.is_empty() {
            return Err(ValidationError::new("code", "cannot be empty"));
        }
        let lower = code.to_lowercase();
        if let Some(pattern) = DANGEROUS_CODE_PATTERNS
            .iter()
            .find(|p| lower.contains(*p))
        {
            return Err(ValidationError::new(
                "code",
                format!("contains potentially dangerous function: {pattern}"),
            ));
        }
        Ok(())
    }

    /// Run every check whose member is present in an invocation's arguments.
    ///
    /// Members that are absent or of an unexpected JSON type are left to the
    /// capability itself.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<(), ValidationError> {
        let Some(args) = arguments.as_object() else {
            return Ok(());
        };
        if let Some(namespace) = str_member(args, &["namespace"]) {
            self.validate_namespace(namespace)?;
        }
        if let Some(set_name) = str_member(args, &["set_name", "set"]) {
            self.validate_set_name(set_name)?;
        }
        if let Some(key) = str_member(args, &["key"]) {
            self.validate_key(key)?;
        }

        match args.get("bins") {
            Some(Value::Object(bins)) => {
                self.validate_bin_names(bins.keys().map(String::as_str))?;
                let size = serde_json::to_vec(bins).map(|b| b.len()).unwrap_or(0);
                self.validate_record_size(size)?;
            }
            Some(Value::Array(names)) => {
                self.validate_bin_names(names.iter().filter_map(Value::as_str))?;
            }
            _ => {}
        }

        for member in ["keys", "records"] {
            if let Some(Value::Array(items)) = args.get(member) {
                self.validate_batch_size(items.len())?;
            }
        }

        if let Some(index_name) = str_member(args, &["index_name"]) {
            self.validate_index_name(index_name)?;
        }
        if let Some(module_name) = str_member(args, &["module_name", "module"]) {
            self.validate_module_name(module_name)?;
        }
        if let Some(code) = str_member(args, &["code", "content"]) {
            self.validate_code(code)?;
        }

        Ok(())
    }
}

fn str_member<'a>(args: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| args.get(*name).and_then(Value::as_str))
}
