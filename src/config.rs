use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property naming the permission check strategy.
pub const PERMISSION_STRATEGY_KEY: &str = "security.permission.strategy";
/// Property naming the SSO user provider.
pub const SSO_USER_PROVIDER_KEY: &str = "sso.user.provider";
/// Property bounding role and group inheritance depth.
pub const MAX_INHERIT_DEPTH_KEY: &str = "security.role.maxInheritDepth";

const DEFAULT_MAX_INHERIT_DEPTH: usize = 16;

fn default_max_inherit_depth() -> usize {
    DEFAULT_MAX_INHERIT_DEPTH
}

/// Security configuration read once when providers are assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    /// Registered name of the permission check strategy.
    pub permission_strategy: Option<String>,
    /// Registered name of the SSO user provider.
    pub sso_user_provider: Option<String>,
    /// Maximum role and group inheritance depth.
    #[serde(default = "default_max_inherit_depth")]
    pub max_inherit_depth: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            permission_strategy: None,
            sso_user_provider: None,
            max_inherit_depth: DEFAULT_MAX_INHERIT_DEPTH,
        }
    }
}

impl SecurityConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the permission check strategy name.
    pub fn permission_strategy(mut self, name: impl Into<String>) -> Self {
        self.permission_strategy = Some(name.into());
        self
    }

    /// Sets the SSO user provider name.
    pub fn sso_user_provider(mut self, name: impl Into<String>) -> Self {
        self.sso_user_provider = Some(name.into());
        self
    }

    /// Sets the maximum inheritance depth.
    pub fn max_inherit_depth(mut self, depth: usize) -> Self {
        self.max_inherit_depth = depth;
        self
    }

    /// Decodes a JSON configuration document.
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Builds a configuration from flat `key = value` properties.
    ///
    /// Unknown keys are ignored. Blank values count as unset.
    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let value = value.as_ref().trim();
            match key.as_ref().trim() {
                PERMISSION_STRATEGY_KEY => config.permission_strategy = non_blank(value),
                SSO_USER_PROVIDER_KEY => config.sso_user_provider = non_blank(value),
                MAX_INHERIT_DEPTH_KEY => match value.parse() {
                    Ok(depth) => config.max_inherit_depth = depth,
                    Err(_) => tracing::warn!(
                        key = MAX_INHERIT_DEPTH_KEY,
                        value,
                        "ignoring unparsable inheritance depth"
                    ),
                },
                _ => {}
            }
        }
        config
    }
}

fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
