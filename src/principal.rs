use crate::types::{IdentityId, OrganizationId};
use serde::{Deserialize, Serialize};

/// An authenticated subject asking for access.
///
/// Roles and groups listed here are the ones attached to the session; the
/// authentication provider may contribute more when permissions are checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    id: IdentityId,
    #[serde(default)]
    roles: Vec<IdentityId>,
    #[serde(default)]
    groups: Vec<IdentityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl Principal {
    /// Creates a principal without roles or groups.
    pub fn new(id: IdentityId) -> Self {
        Self {
            id,
            roles: Vec::new(),
            groups: Vec::new(),
            session_id: None,
        }
    }

    /// Adds a session role.
    pub fn with_role(mut self, role: IdentityId) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Adds a session group.
    pub fn with_group(mut self, group: IdentityId) -> Self {
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    /// Attaches the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn id(&self) -> &IdentityId {
        &self.id
    }

    pub fn org_id(&self) -> &OrganizationId {
        self.id.org_id()
    }

    pub fn roles(&self) -> &[IdentityId] {
        &self.roles
    }

    pub fn groups(&self) -> &[IdentityId] {
        &self.groups
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_ORG_ID, SELF_ORG_ID};

    #[test]
    fn own_org_principal_should_belong_to_default_org() {
        let principal = Principal::new(IdentityId::new("alice", SELF_ORG_ID).unwrap())
            .with_role(IdentityId::new("viewer", SELF_ORG_ID).unwrap());

        assert!(principal.org_id().is_default());
        assert_eq!(
            principal.roles(),
            [IdentityId::new("viewer", DEFAULT_ORG_ID).unwrap()]
        );
    }

    #[test]
    fn deserialized_principal_should_normalize_own_org() {
        let principal: Principal = serde_json::from_value(serde_json::json!({
            "id": {"name": "alice", "orgId": "SELF"},
            "sessionId": "s-1"
        }))
        .unwrap();

        assert_eq!(principal.org_id().as_str(), DEFAULT_ORG_ID);
        assert_eq!(principal.session_id(), Some("s-1"));
    }
}
