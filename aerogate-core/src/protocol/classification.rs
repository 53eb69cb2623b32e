//! Static classification of operations and the role model that gates them.

use serde::{Deserialize, Serialize};

/// Operations that change record contents.
const WRITE_OPERATIONS: &[&str] = &["put_record", "delete_record", "batch_write", "operate"];

/// Operations that change schema, indexes or server-side code.
const ADMIN_OPERATIONS: &[&str] = &[
    "create_index",
    "drop_index",
    "truncate_set",
    "register_udf",
    "remove_udf",
];

/// What an operation does to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    Read,
    Write,
    Admin,
}

impl OperationCategory {
    /// Classify an operation by name. Unlisted names are reads.
    pub fn classify(operation: &str) -> Self {
        if WRITE_OPERATIONS.contains(&operation) {
            OperationCategory::Write
        } else if ADMIN_OPERATIONS.contains(&operation) {
            OperationCategory::Admin
        } else {
            OperationCategory::Read
        }
    }

    /// Mutating operations are rate limited.
    pub const fn is_mutating(self) -> bool {
        matches!(self, OperationCategory::Write | OperationCategory::Admin)
    }
}

/// Permission level granted to every caller of this gateway instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessRole {
    #[default]
    ReadOnly,
    ReadWrite,
    Admin,
}

impl AccessRole {
    pub const fn can_write(self) -> bool {
        matches!(self, AccessRole::ReadWrite | AccessRole::Admin)
    }

    pub const fn can_admin(self) -> bool {
        matches!(self, AccessRole::Admin)
    }

    /// Whether this role may run an operation of `category`.
    pub const fn permits(self, category: OperationCategory) -> bool {
        match category {
            OperationCategory::Read => true,
            OperationCategory::Write => self.can_write(),
            OperationCategory::Admin => self.can_admin(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AccessRole::ReadOnly => "read-only",
            AccessRole::ReadWrite => "read-write",
            AccessRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AccessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(AccessRole::ReadOnly),
            "read-write" => Ok(AccessRole::ReadWrite),
            "admin" => Ok(AccessRole::Admin),
            other => Err(format!(
                "invalid role '{other}' (must be read-only, read-write, or admin)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(OperationCategory::classify("put_record"), OperationCategory::Write);
        assert_eq!(OperationCategory::classify("operate"), OperationCategory::Write);
        assert_eq!(OperationCategory::classify("truncate_set"), OperationCategory::Admin);
        assert_eq!(OperationCategory::classify("get_record"), OperationCategory::Read);
        assert_eq!(OperationCategory::classify("unheard_of"), OperationCategory::Read);
    }

    #[test]
    fn test_mutating() {
        assert!(OperationCategory::Write.is_mutating());
        assert!(OperationCategory::Admin.is_mutating());
        assert!(!OperationCategory::Read.is_mutating());
    }

    #[test]
    fn test_role_permissions() {
        assert!(AccessRole::ReadOnly.permits(OperationCategory::Read));
        assert!(!AccessRole::ReadOnly.permits(OperationCategory::Write));
        assert!(!AccessRole::ReadOnly.permits(OperationCategory::Admin));

        assert!(AccessRole::ReadWrite.permits(OperationCategory::Write));
        assert!(!AccessRole::ReadWrite.permits(OperationCategory::Admin));

        assert!(AccessRole::Admin.permits(OperationCategory::Write));
        assert!(AccessRole::Admin.permits(OperationCategory::Admin));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("read-write".parse::<AccessRole>(), Ok(AccessRole::ReadWrite));
        assert!("superuser".parse::<AccessRole>().is_err());
        assert_eq!(AccessRole::default(), AccessRole::ReadOnly);
    }
}
