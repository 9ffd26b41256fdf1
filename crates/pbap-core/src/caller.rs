//! Caller context for the synchronous query surface

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::errors::{PbapError, PbapResult};

/// Platform permission a caller may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Read connection state
    Bluetooth,
    /// Change connection state
    BluetoothAdmin,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Bluetooth => f.write_str("BLUETOOTH"),
            Permission::BluetoothAdmin => f.write_str("BLUETOOTH_ADMIN"),
        }
    }
}

/// Identity of whoever is calling into the query surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub permissions: Vec<Permission>,
    /// Calls from a user other than the foreground user get empty answers
    pub active_user: bool,
}

impl CallerContext {
    /// A caller holding both permissions as the active user
    pub fn privileged() -> Self {
        Self {
            permissions: vec![Permission::Bluetooth, Permission::BluetoothAdmin],
            active_user: true,
        }
    }

    /// A caller with only read access
    pub fn reader() -> Self {
        Self {
            permissions: vec![Permission::Bluetooth],
            active_user: true,
        }
    }

    pub fn with_active_user(mut self, active: bool) -> Self {
        self.active_user = active;
        self
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Fail with `PermissionDenied` unless the caller holds `permission`
    pub fn enforce(&self, permission: Permission) -> PbapResult<()> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(PbapError::permission_denied(permission))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforce() {
        let reader = CallerContext::reader();
        assert!(reader.enforce(Permission::Bluetooth).is_ok());
        assert!(matches!(
            reader.enforce(Permission::BluetoothAdmin),
            Err(PbapError::PermissionDenied {
                required: Permission::BluetoothAdmin
            })
        ));
    }
}
