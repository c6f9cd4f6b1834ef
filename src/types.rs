use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

const MAX_NAME_LEN: usize = 128;
const MAX_IDENTITY_NAME_LEN: usize = 256;

/// Organization id used when nothing more specific applies.
pub const DEFAULT_ORG_ID: &str = "host-org";

/// Sentinel meaning "the caller's own organization".
///
/// Keys carrying it are rewritten to [`DEFAULT_ORG_ID`].
pub const SELF_ORG_ID: &str = "SELF";

/// Separator between name and organization in an identity key.
pub const KEY_DELIMITER: &str = "~;~";

fn validate_simple_name(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidId(format!("{kind} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::InvalidId(format!(
            "{kind} length must be <= {MAX_NAME_LEN}"
        )));
    }
    if !trimmed.chars().all(is_allowed_name_char) {
        return Err(Error::InvalidId(format!(
            "{kind} contains invalid characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn is_allowed_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-' | '.')
}

// Identity names are display names (`Jane Doe`, `ops@example.com`), so only
// control characters and the key delimiter are rejected.
fn validate_identity_name(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidId("identity name must not be empty".to_string()));
    }
    if trimmed.len() > MAX_IDENTITY_NAME_LEN {
        return Err(Error::InvalidId(format!(
            "identity name length must be <= {MAX_IDENTITY_NAME_LEN}"
        )));
    }
    if trimmed.chars().any(char::is_control) || trimmed.contains(KEY_DELIMITER) {
        return Err(Error::InvalidId(
            "identity name contains invalid characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Organization identifier.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Creates a validated identifier.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        validate_simple_name(value.as_ref(), "organization id").map(Self)
    }

    /// Creates an identifier from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the default organization.
    pub fn default_org() -> Self {
        Self(DEFAULT_ORG_ID.to_string())
    }

    /// Returns the "own organization" sentinel.
    pub fn self_org() -> Self {
        Self(SELF_ORG_ID.to_string())
    }

    /// Returns true for the "own organization" sentinel.
    pub fn is_self(&self) -> bool {
        self.0 == SELF_ORG_ID
    }

    /// Returns true for the default organization.
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_ORG_ID
    }

    /// Rewrites the sentinel to the default organization.
    pub fn normalized(self) -> Self {
        if self.is_self() {
            Self::default_org()
        } else {
            self
        }
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::default_org()
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrganizationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for OrganizationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for OrganizationId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<String> for OrganizationId {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl<'de> Deserialize<'de> for OrganizationId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Kind of principal an identity names.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityType {
    /// A login user.
    User,
    /// A user group.
    Group,
    /// A role.
    Role,
    /// A whole organization.
    Organization,
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
            Self::Organization => "organization",
        })
    }
}

/// Stable reference to a user, group or role: a name within an organization.
///
/// The "own organization" sentinel is stored as the default organization.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityId {
    name: String,
    org_id: OrganizationId,
}

impl IdentityId {
    /// Creates a validated identity id.
    pub fn new(name: impl AsRef<str>, org_id: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            name: validate_identity_name(name.as_ref())?,
            org_id: OrganizationId::new(org_id)?.normalized(),
        })
    }

    /// Creates an identity id from an already validated organization.
    pub fn in_org(name: impl AsRef<str>, org_id: OrganizationId) -> Result<Self> {
        Ok(Self {
            name: validate_identity_name(name.as_ref())?,
            org_id: org_id.normalized(),
        })
    }

    /// Creates an identity id from trusted parts without validation.
    pub fn from_trusted(name: String, org_id: OrganizationId) -> Self {
        Self {
            name,
            org_id: org_id.normalized(),
        }
    }

    /// Returns the identity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning organization.
    pub fn org_id(&self) -> &OrganizationId {
        &self.org_id
    }

    /// Returns a copy of this id moved into another organization.
    pub fn with_org_id(&self, org_id: OrganizationId) -> Self {
        Self {
            name: self.name.clone(),
            org_id: org_id.normalized(),
        }
    }

    /// Encodes the id as `name~;~org`.
    pub fn to_key(&self) -> String {
        format!("{}{KEY_DELIMITER}{}", self.name, self.org_id)
    }

    /// Decodes a key produced by [`IdentityId::to_key`].
    ///
    /// A key without delimiter is placed in the default organization.
    pub fn parse_key(key: &str) -> Result<Self> {
        match key.rsplit_once(KEY_DELIMITER) {
            Some((name, org)) => Self::new(name, org),
            None => Self::in_org(key, OrganizationId::default_org()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdentityId {
    name: String,
    #[serde(default)]
    org_id: OrganizationId,
}

impl<'de> Deserialize<'de> for IdentityId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawIdentityId::deserialize(deserializer)?;
        Self::in_org(raw.name, raw.org_id).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.org_id)
    }
}
