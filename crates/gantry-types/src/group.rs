//! Partition keys keeping unrelated pieces from being merged together.
//!
//! Valid group keys:
//! - Must be non-empty and at most 64 bytes
//! - Lowercase alphanumerics plus `.`, `_`, `-`
//! - Must not start or end with a separator
//! - Must not contain consecutive separators

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum group key length in bytes.
const MAX_GROUP_KEY_LEN: usize = 64;

/// Separator characters allowed between alphanumeric runs.
const SEPARATORS: &[char] = &['.', '_', '-'];

/// Partition/tenancy key for the aggregation pipeline.
///
/// Pieces, buffers, and containers all carry a `GroupKey`; merging only ever
/// happens within one group. Keys are validated at construction so a bad key
/// never reaches a queue partition or an index entry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey(String);

impl GroupKey {
    /// Create a validated group key.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        validate_group_key(&key)?;
        Ok(Self(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({})", self.0)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for GroupKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.0
    }
}

/// Validate a group key, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use gantry_types::group::validate_group_key;
///
/// assert!(validate_group_key("tenant-a").is_ok());
/// assert!(validate_group_key("us.west-2_cold").is_ok());
/// assert!(validate_group_key("").is_err());
/// assert!(validate_group_key("Tenant").is_err());
/// ```
pub fn validate_group_key(key: &str) -> Result<(), TypeError> {
    if key.is_empty() {
        return Err(TypeError::InvalidGroupKey {
            key: key.to_string(),
            reason: "group key must not be empty".into(),
        });
    }

    if key.len() > MAX_GROUP_KEY_LEN {
        return Err(TypeError::InvalidGroupKey {
            key: key.to_string(),
            reason: format!("longer than {MAX_GROUP_KEY_LEN} bytes"),
        });
    }

    for ch in key.chars() {
        let ok = ch.is_ascii_lowercase() || ch.is_ascii_digit() || SEPARATORS.contains(&ch);
        if !ok {
            return Err(TypeError::InvalidGroupKey {
                key: key.to_string(),
                reason: format!("contains forbidden character: {ch:?}"),
            });
        }
    }

    let first = key.chars().next().unwrap_or('-');
    let last = key.chars().last().unwrap_or('-');
    if SEPARATORS.contains(&first) || SEPARATORS.contains(&last) {
        return Err(TypeError::InvalidGroupKey {
            key: key.to_string(),
            reason: "must not start or end with a separator".into(),
        });
    }

    let mut prev_sep = false;
    for ch in key.chars() {
        let is_sep = SEPARATORS.contains(&ch);
        if is_sep && prev_sep {
            return Err(TypeError::InvalidGroupKey {
                key: key.to_string(),
                reason: "must not contain consecutive separators".into(),
            });
        }
        prev_sep = is_sep;
    }

    Ok(())
}
