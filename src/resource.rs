use crate::context::OrganizationContext;
use crate::error::{Error, Result};
use crate::types::{IdentityId, IdentityType, OrganizationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PATH_SEPARATOR: char = '/';
const ROOT_PATH: &str = "/";

/// Kind of securable object.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Report,
    Dashboard,
    Asset,
    DataSource,
    DataSourceFolder,
    Library,
    Schedule,
    Portal,
    SecurityUser,
    SecurityGroup,
    SecurityRole,
    SecurityOrganization,
}

impl ResourceType {
    const ALL: [Self; 12] = [
        Self::Report,
        Self::Dashboard,
        Self::Asset,
        Self::DataSource,
        Self::DataSourceFolder,
        Self::Library,
        Self::Schedule,
        Self::Portal,
        Self::SecurityUser,
        Self::SecurityGroup,
        Self::SecurityRole,
        Self::SecurityOrganization,
    ];

    /// Returns the stable upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Report => "REPORT",
            Self::Dashboard => "DASHBOARD",
            Self::Asset => "ASSET",
            Self::DataSource => "DATA_SOURCE",
            Self::DataSourceFolder => "DATA_SOURCE_FOLDER",
            Self::Library => "LIBRARY",
            Self::Schedule => "SCHEDULE",
            Self::Portal => "PORTAL",
            Self::SecurityUser => "SECURITY_USER",
            Self::SecurityGroup => "SECURITY_GROUP",
            Self::SecurityRole => "SECURITY_ROLE",
            Self::SecurityOrganization => "SECURITY_ORGANIZATION",
        }
    }

    /// Returns true for resource types that name identities rather than content.
    pub fn is_identity(&self) -> bool {
        self.identity_type().is_some()
    }

    /// Returns the identity kind for identity resource types.
    pub fn identity_type(&self) -> Option<IdentityType> {
        match self {
            Self::SecurityUser => Some(IdentityType::User),
            Self::SecurityGroup => Some(IdentityType::Group),
            Self::SecurityRole => Some(IdentityType::Role),
            Self::SecurityOrganization => Some(IdentityType::Organization),
            _ => None,
        }
    }

    /// Returns the identity resource type for an identity kind.
    pub fn for_identity(kind: IdentityType) -> Self {
        match kind {
            IdentityType::User => Self::SecurityUser,
            IdentityType::Group => Self::SecurityGroup,
            IdentityType::Role => Self::SecurityRole,
            IdentityType::Organization => Self::SecurityOrganization,
        }
    }

    /// Returns true when grants on a folder apply to everything below it.
    pub fn is_hierarchical(&self) -> bool {
        matches!(
            self,
            Self::Report | Self::Dashboard | Self::Asset | Self::DataSourceFolder | Self::Library
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidResource(format!("unknown resource type {wanted:?}")))
    }
}

/// Action a grant applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceAction {
    Read,
    Write,
    Delete,
    Share,
    Admin,
    Access,
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Delete => "DELETE",
            Self::Share => "SHARE",
            Self::Admin => "ADMIN",
            Self::Access => "ACCESS",
        })
    }
}

fn validate_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidResource("path must not be empty".to_string()));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(Error::InvalidResource(
            "path contains control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn parent_path(path: &str) -> Option<String> {
    if path == ROOT_PATH {
        return None;
    }
    let trimmed = path.trim_end_matches(PATH_SEPARATOR);
    match trimmed.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT_PATH.to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => Some(ROOT_PATH.to_string()),
    }
}

/// A securable object, independent of organization.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    path: String,
}

impl Resource {
    /// Creates a resource with a validated path.
    pub fn new(resource_type: ResourceType, path: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            resource_type,
            path: validate_path(path.as_ref())?,
        })
    }

    /// Returns the resource type.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Returns the resource path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Scopes this resource to an organization.
    pub fn in_org(&self, org_id: OrganizationId) -> ResourceKey {
        ResourceKey {
            resource_type: self.resource_type,
            path: self.path.clone(),
            org_id: org_id.normalized(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.path)
    }
}

/// A securable object scoped to an organization.
///
/// The "own organization" sentinel is rewritten to the default organization,
/// so keys differing only by that sentinel compare equal.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    path: String,
    org_id: OrganizationId,
}

impl ResourceKey {
    /// Creates a key with a validated path.
    pub fn new(
        resource_type: ResourceType,
        path: impl AsRef<str>,
        org_id: OrganizationId,
    ) -> Result<Self> {
        Ok(Self {
            resource_type,
            path: validate_path(path.as_ref())?,
            org_id: org_id.normalized(),
        })
    }

    /// Creates a key in the calling thread's current organization.
    pub fn in_current_org(resource_type: ResourceType, path: impl AsRef<str>) -> Result<Self> {
        Self::new(resource_type, path, OrganizationContext::current_or_default())
    }

    /// Creates the key under which grants on an identity are stored.
    pub fn for_identity(resource_type: ResourceType, identity: &IdentityId) -> Self {
        Self {
            resource_type,
            path: identity.to_key(),
            org_id: identity.org_id().clone().normalized(),
        }
    }

    /// Returns the resource type.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Returns the resource path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the owning organization.
    pub fn org_id(&self) -> &OrganizationId {
        &self.org_id
    }

    /// Returns a copy of this key in another organization.
    pub fn with_org_id(&self, org_id: OrganizationId) -> Self {
        Self {
            resource_type: self.resource_type,
            path: self.path.clone(),
            org_id: org_id.normalized(),
        }
    }

    /// Drops the organization.
    pub fn resource(&self) -> Resource {
        Resource {
            resource_type: self.resource_type,
            path: self.path.clone(),
        }
    }

    /// Returns the identity named by an identity key.
    pub fn identity(&self) -> Option<IdentityId> {
        if !self.resource_type.is_identity() {
            return None;
        }
        IdentityId::parse_key(&self.path).ok()
    }

    /// Returns the enclosing folder for hierarchical resource types.
    pub fn parent(&self) -> Option<Self> {
        if !self.resource_type.is_hierarchical() {
            return None;
        }
        parent_path(&self.path).map(|path| Self {
            resource_type: self.resource_type,
            path,
            org_id: self.org_id.clone(),
        })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.resource_type, self.path, self.org_id)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResourceKey {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    path: String,
    #[serde(default)]
    org_id: OrganizationId,
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawResourceKey::deserialize(deserializer)?;
        Self::new(raw.resource_type, raw.path, raw.org_id).map_err(serde::de::Error::custom)
    }
}
