//! Bitwise user permissions, lowest to highest.
//!
//! | bit | name |
//! |---|---|
//! | 0 | read content |
//! | 1 | write content |
//! | 2 | delete content, including the own profile |
//! | 3 | update content, including the own profile |
//! | 4, 5 | reserved |
//! | 6 | delete other users |
//! | 7 | grant permissions (super user) |

use std::fmt;
use std::str::FromStr;

use failure::Fail;

pub const NO_PERMISSIONS: i16 = 0;
pub const READ: i16 = 1 << 0;
pub const WRITE: i16 = 1 << 1;
pub const DELETE: i16 = 1 << 2;
pub const UPDATE: i16 = 1 << 3;
pub const RESERVE_1: i16 = 1 << 4;
pub const RESERVE_2: i16 = 1 << 5;
pub const DELETE_USERS: i16 = 1 << 6;
pub const GRANT_PERMISSION: i16 = 1 << 7;

/// What a freshly created user may do.
pub const DEFAULT_PERMISSIONS: i16 = READ | WRITE | DELETE | UPDATE;

const NAMES: [(&str, i16); 8] = [
    ("read", READ),
    ("write", WRITE),
    ("delete", DELETE),
    ("update", UPDATE),
    ("reserve-1", RESERVE_1),
    ("reserve-2", RESERVE_2),
    ("delete-users", DELETE_USERS),
    ("grant-permission", GRANT_PERMISSION),
];

#[derive(Debug, Fail, PartialEq, Eq)]
pub enum PermissionError {
    #[fail(display = "Invalid permission {}: code must be between 0 and 255", _0)]
    OutOfRange(i16),
    #[fail(display = "Multiple permissions in {:#010b}: only one can be changed at a time", _0)]
    Multiple(i16),
    #[fail(display = "Unknown permission {:?}", _0)]
    Unknown(String),
}

fn validate(code: i16) -> Result<i16, PermissionError> {
    if code < 0 || code > 255 {
        return Err(PermissionError::OutOfRange(code));
    }
    Ok(code)
}

fn validate_single(code: i16) -> Result<i16, PermissionError> {
    let code = validate(code)?;
    if code & code.wrapping_sub(1) != 0 {
        return Err(PermissionError::Multiple(code));
    }
    Ok(code)
}

/// The permission mask stored in `users.permissions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permissions(i16);

impl Permissions {
    pub fn from_bits(bits: i16) -> Self {
        Permissions(bits)
    }

    pub fn bits(self) -> i16 {
        self.0
    }

    /// True if any bit of `permission` is held.
    pub fn check(self, permission: i16) -> Result<bool, PermissionError> {
        Ok(self.0 & validate(permission)? != NO_PERMISSIONS)
    }

    pub fn grant(self, permission: i16) -> Result<Self, PermissionError> {
        Ok(Permissions(self.0 | validate_single(permission)?))
    }

    pub fn revoke(self, permission: i16) -> Result<Self, PermissionError> {
        Ok(Permissions(self.0 & !validate_single(permission)?))
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions(DEFAULT_PERMISSIONS)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held: Vec<&str> = NAMES
            .iter()
            .filter(|(_, bit)| self.0 & bit != 0)
            .map(|(name, _)| *name)
            .collect();
        if held.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", held.join(","))
        }
    }
}

/// A single permission bit, parsed from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permission(pub i16);

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, bit)| Permission(*bit))
            .ok_or_else(|| PermissionError::Unknown(s.to_string()))
    }
}
