use crate::authentication::AuthenticationProvider;
use crate::authorization::{AuthorizationProvider, PermissionEntry};
use crate::capability::{CachableProvider, JsonConfigurableProvider, SecurityProvider};
use crate::config::SecurityConfig;
use crate::error::{Error, Result};
use crate::events::{AuthenticationChangeEvent, AuthenticationChangeListener, ChangeListeners};
use crate::permission::Permission;
use crate::principal::Principal;
use crate::resource::{ResourceAction, ResourceKey};
use crate::session::{LoginEvent, SessionEvent, SessionNotifier};
use crate::strategy::{
    CheckPermissionStrategy, DEFAULT_STRATEGY, Decision, DefaultCheckPermissionStrategy,
    StrategyRegistry,
};
use crate::types::IdentityId;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

const COMPOSITE_PROVIDER_NAME: &str = "composite";

/// Security facade over one authentication and one authorization back-end.
///
/// Only [`CompositeBuilder::build`] (or [`CompositeSecurityProvider::create`])
/// produces instances, and the check strategy is attached before the
/// composite is handed out. The strategy never changes afterwards.
pub struct CompositeSecurityProvider {
    name: String,
    authentication: Arc<dyn AuthenticationProvider>,
    authorization: Arc<dyn AuthorizationProvider>,
    strategy: Box<dyn CheckPermissionStrategy>,
    strategy_name: String,
    config: SecurityConfig,
    sessions: Arc<SessionNotifier>,
    change_listeners: ChangeListeners,
    torn_down: AtomicBool,
}

/// Builder for [`CompositeSecurityProvider`].
pub struct CompositeBuilder {
    name: String,
    authentication: Arc<dyn AuthenticationProvider>,
    authorization: Arc<dyn AuthorizationProvider>,
    config: SecurityConfig,
    strategies: StrategyRegistry,
    sessions: Option<Arc<SessionNotifier>>,
}

impl CompositeBuilder {
    /// Creates a builder with default configuration and built-in strategies.
    pub fn new(
        authentication: Arc<dyn AuthenticationProvider>,
        authorization: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            name: COMPOSITE_PROVIDER_NAME.to_string(),
            authentication,
            authorization,
            config: SecurityConfig::default(),
            strategies: StrategyRegistry::with_defaults(),
            sessions: None,
        }
    }

    /// Sets the provider label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: SecurityConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the strategy registry the configured strategy is looked up in.
    pub fn strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    /// Shares a session notifier with other components.
    pub fn sessions(mut self, sessions: Arc<SessionNotifier>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Builds the composite and attaches its check strategy.
    ///
    /// Never fails: a strategy that cannot be created is logged and replaced
    /// by the default strategy.
    pub fn build(self) -> Arc<CompositeSecurityProvider> {
        let Self {
            name,
            authentication,
            authorization,
            config,
            strategies,
            sessions,
        } = self;

        Arc::new_cyclic(|composite| {
            let (strategy, strategy_name) =
                resolve_strategy(&strategies, config.permission_strategy.as_deref(), composite);
            CompositeSecurityProvider {
                name,
                authentication,
                authorization,
                strategy,
                strategy_name,
                config,
                sessions: sessions.unwrap_or_default(),
                change_listeners: ChangeListeners::new(),
                torn_down: AtomicBool::new(false),
            }
        })
    }
}

fn resolve_strategy(
    strategies: &StrategyRegistry,
    requested: Option<&str>,
    composite: &Weak<CompositeSecurityProvider>,
) -> (Box<dyn CheckPermissionStrategy>, String) {
    if let Some(name) = requested.map(str::trim).filter(|name| !name.is_empty()) {
        let created = catch_unwind(AssertUnwindSafe(|| {
            strategies.create(name, composite.clone())
        }));
        match created {
            Ok(Ok(strategy)) => return (strategy, name.to_string()),
            Ok(Err(error)) => tracing::error!(
                strategy = name,
                %error,
                "failed to create permission check strategy, using default"
            ),
            Err(_) => tracing::error!(
                strategy = name,
                "permission check strategy factory panicked, using default"
            ),
        }
    }
    (
        Box::new(DefaultCheckPermissionStrategy::new(composite.clone())),
        DEFAULT_STRATEGY.to_string(),
    )
}

impl CompositeSecurityProvider {
    /// Starts building a composite.
    pub fn builder(
        authentication: Arc<dyn AuthenticationProvider>,
        authorization: Arc<dyn AuthorizationProvider>,
    ) -> CompositeBuilder {
        CompositeBuilder::new(authentication, authorization)
    }

    /// Builds a composite with the default configuration.
    pub fn create(
        authentication: Arc<dyn AuthenticationProvider>,
        authorization: Arc<dyn AuthorizationProvider>,
    ) -> Arc<Self> {
        Self::builder(authentication, authorization).build()
    }

    /// Builds a composite, selecting the strategy from `config`.
    pub fn create_with_config(
        authentication: Arc<dyn AuthenticationProvider>,
        authorization: Arc<dyn AuthorizationProvider>,
        config: SecurityConfig,
    ) -> Arc<Self> {
        Self::builder(authentication, authorization)
            .config(config)
            .build()
    }

    pub fn authentication(&self) -> &Arc<dyn AuthenticationProvider> {
        &self.authentication
    }

    pub fn authorization(&self) -> &Arc<dyn AuthorizationProvider> {
        &self.authorization
    }

    /// Returns the registered name of the strategy in use.
    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionNotifier> {
        &self.sessions
    }

    /// Listeners notified after the authorization store handled a change.
    pub fn change_listeners(&self) -> &ChangeListeners {
        &self.change_listeners
    }

    /// Decides whether `principal` may perform `action` on `key`.
    pub fn check_permission(
        &self,
        principal: &Principal,
        key: &ResourceKey,
        action: ResourceAction,
    ) -> Result<Decision> {
        let decision = self.strategy.check_permission(principal, key, action)?;
        tracing::trace!(
            principal = %principal.id(),
            resource = %key,
            %action,
            ?decision,
            "permission checked"
        );
        Ok(decision)
    }

    /// Verifies credentials and returns the authenticated principal.
    pub fn authenticate(&self, user: &IdentityId, password: &str) -> Result<Principal> {
        if !self.authentication.authenticate(user, password)? {
            tracing::debug!(%user, "authentication rejected");
            return Err(Error::authentication(format!("invalid credentials for {user}")));
        }
        let mut principal = Principal::new(user.clone());
        for role in self.authentication.user_roles(user)? {
            principal = principal.with_role(role);
        }
        for group in self.authentication.user_groups(user)? {
            principal = principal.with_group(group);
        }
        Ok(principal)
    }

    /// Authenticates and announces the new session.
    pub fn login(
        &self,
        user: &IdentityId,
        password: &str,
        session_id: impl Into<String>,
        remote_host: Option<String>,
    ) -> Result<Principal> {
        let principal = self.authenticate(user, password)?.with_session_id(session_id);
        self.sessions
            .fire_login(&LoginEvent::new(principal.clone(), remote_host));
        Ok(principal)
    }

    /// Announces the end of a session. Returns false if it was not active.
    pub fn logout(&self, principal: &Principal, invalidate_session: bool) -> bool {
        self.sessions
            .fire_logout(&SessionEvent::new(principal.clone(), invalidate_session))
    }
}

impl fmt::Debug for CompositeSecurityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSecurityProvider")
            .field("name", &self.name)
            .field("authentication", &self.authentication.provider_name())
            .field("authorization", &self.authorization.provider_name())
            .field("strategy", &self.strategy_name)
            .finish_non_exhaustive()
    }
}

impl SecurityProvider for CompositeSecurityProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    /// Unreachable once built, since composites are shared through `Arc`.
    /// Name the composite with [`CompositeBuilder::name`] instead.
    fn set_provider_name(&mut self, name: String) {
        self.name = name;
    }

    fn tear_down(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(provider = %self.name, "tearing down security providers");
        self.authorization.tear_down();
        self.authentication.tear_down();
    }
}

impl AuthenticationChangeListener for CompositeSecurityProvider {
    fn authentication_changed(&self, event: &AuthenticationChangeEvent) -> Result<()> {
        if event.is_removed() {
            tracing::info!(
                kind = %event.identity_type(),
                old = %event.old_id(),
                "propagating identity removal"
            );
        } else {
            tracing::info!(
                kind = %event.identity_type(),
                old = %event.old_id(),
                new = ?event.new_id(),
                "propagating identity rename"
            );
        }
        self.authorization.authentication_changed(event)?;
        self.change_listeners.dispatch(event)
    }
}

impl AuthorizationProvider for CompositeSecurityProvider {
    fn set_permission(&self, key: &ResourceKey, permission: Permission) -> Result<()> {
        self.authorization.set_permission(key, permission)
    }

    fn remove_permission(&self, key: &ResourceKey) -> Result<()> {
        self.authorization.remove_permission(key)
    }

    fn get_permission(&self, key: &ResourceKey) -> Result<Option<Permission>> {
        self.authorization.get_permission(key)
    }

    fn get_permissions(&self) -> Result<Vec<PermissionEntry>> {
        self.authorization.get_permissions()
    }

    fn supports_group_permission(&self) -> bool {
        self.authorization.supports_group_permission()
    }

    fn cache(&self) -> &dyn CachableProvider {
        self.authorization.cache()
    }

    fn configuration(&self) -> &dyn JsonConfigurableProvider {
        self.authorization.configuration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Grantee;
    use crate::resource::ResourceType;
    use crate::test_support::{TestDirectory, TestGrants, id, org};
    use crate::types::IdentityType;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn report(path: &str) -> ResourceKey {
        ResourceKey::new(ResourceType::Report, path, org("acme")).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<AuthenticationChangeEvent>>,
    }

    impl AuthenticationChangeListener for Recorder {
        fn authentication_changed(&self, event: &AuthenticationChangeEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn create_should_use_default_strategy_without_config() {
        let composite = CompositeSecurityProvider::create(
            Arc::new(TestDirectory::default()),
            Arc::new(TestGrants::default()),
        );
        assert_eq!(composite.strategy_name(), DEFAULT_STRATEGY);
        assert_eq!(composite.provider_name(), COMPOSITE_PROVIDER_NAME);
    }

    #[test]
    fn unknown_strategy_should_fall_back_to_default() {
        let composite = CompositeSecurityProvider::create_with_config(
            Arc::new(TestDirectory::default()),
            Arc::new(TestGrants::default()),
            SecurityConfig::new().permission_strategy("com.example.MissingStrategy"),
        );
        assert_eq!(composite.strategy_name(), DEFAULT_STRATEGY);
    }

    #[test]
    fn failing_and_panicking_factories_should_fall_back_to_default() {
        let strategies = StrategyRegistry::with_defaults()
            .with("broken", |_| Err(Error::authorization("missing dependency")))
            .with("explosive", |_| panic!("constructor blew up"));

        for name in ["broken", "explosive"] {
            let composite = CompositeSecurityProvider::builder(
                Arc::new(TestDirectory::default()),
                Arc::new(TestGrants::default()),
            )
            .strategies(strategies.clone())
            .config(SecurityConfig::new().permission_strategy(name))
            .build();
            assert_eq!(composite.strategy_name(), DEFAULT_STRATEGY, "strategy {name}");
        }
    }

    #[test]
    fn custom_strategy_should_receive_composite_handle() {
        struct OwnerOnly {
            composite: Weak<CompositeSecurityProvider>,
        }

        impl CheckPermissionStrategy for OwnerOnly {
            fn check_permission(
                &self,
                principal: &Principal,
                _key: &ResourceKey,
                _action: ResourceAction,
            ) -> Result<Decision> {
                let composite = self
                    .composite
                    .upgrade()
                    .ok_or(Error::ProviderUnavailable("composite"))?;
                Ok(Decision::from(
                    composite.provider_name() == "owner" && principal.id().name() == "owner",
                ))
            }
        }

        let strategies = StrategyRegistry::with_defaults().with("owner-only", |composite| {
            let strategy: Box<dyn CheckPermissionStrategy> = Box::new(OwnerOnly { composite });
            Ok(strategy)
        });
        let composite = CompositeSecurityProvider::builder(
            Arc::new(TestDirectory::default()),
            Arc::new(TestGrants::default()),
        )
        .name("owner")
        .strategies(strategies)
        .config(SecurityConfig::new().permission_strategy("owner-only"))
        .build();

        assert_eq!(composite.strategy_name(), "owner-only");
        let owner = Principal::new(id("owner", "acme"));
        let decision = composite
            .check_permission(&owner, &report("/a"), ResourceAction::Read)
            .unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn grant_operations_should_delegate_to_authorization() {
        let grants = Arc::new(TestGrants::default());
        let composite =
            CompositeSecurityProvider::create(Arc::new(TestDirectory::default()), grants.clone());
        let permission =
            Permission::new().with_grant(ResourceAction::Read, Grantee::Organization(org("acme")));

        composite.set_permission(&report("/a/b"), permission.clone()).unwrap();
        assert_eq!(grants.get_permission(&report("/a/b")).unwrap(), Some(permission));

        composite.remove_permission(&report("/a/b")).unwrap();
        composite.remove_permission(&report("/a/b")).unwrap();
        assert_eq!(composite.get_permission(&report("/a/b")).unwrap(), None);
        assert!(composite.get_permissions().unwrap().is_empty());
        assert!(composite.supports_group_permission());
    }

    #[test]
    fn change_event_should_reach_store_then_listeners() {
        let grants = Arc::new(TestGrants::default());
        let composite =
            CompositeSecurityProvider::create(Arc::new(TestDirectory::default()), grants.clone());
        let recorder = Arc::new(Recorder::default());
        composite.change_listeners().add(recorder.clone());

        let event = AuthenticationChangeEvent::identity_renamed(
            IdentityType::User,
            id("alice", "acme"),
            id("alicia", "acme"),
        );
        composite.authentication_changed(&event).unwrap();

        assert_eq!(grants.changes(), vec![event.clone()]);
        assert_eq!(*recorder.events.lock().unwrap(), vec![event]);
    }

    #[test]
    fn tear_down_should_run_once() {
        let grants = Arc::new(TestGrants::default());
        let composite =
            CompositeSecurityProvider::create(Arc::new(TestDirectory::default()), grants.clone());
        composite.tear_down();
        composite.tear_down();
        assert_eq!(grants.tear_downs(), 1);
    }

    #[test]
    fn login_should_announce_session_once() {
        #[derive(Default)]
        struct Logins(AtomicUsize);

        impl crate::session::SessionListener for Logins {
            fn logged_in(&self, _event: &LoginEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let directory = TestDirectory::default();
        directory.password(id("alice", "acme"), "secret");
        directory.user_role(id("alice", "acme"), id("analyst", "acme"));
        let composite =
            CompositeSecurityProvider::create(Arc::new(directory), Arc::new(TestGrants::default()));
        let logins = Arc::new(Logins::default());
        composite.sessions().add_listener(logins.clone());

        let principal = composite
            .login(&id("alice", "acme"), "secret", "s1", None)
            .unwrap();
        assert_eq!(principal.roles(), &[id("analyst", "acme")]);
        assert_eq!(principal.session_id(), Some("s1"));
        assert_eq!(logins.0.load(Ordering::SeqCst), 1);

        assert!(composite.logout(&principal, true));
        assert!(!composite.logout(&principal, true));
    }

    #[test]
    fn bad_password_should_be_authentication_error() {
        let directory = TestDirectory::default();
        directory.password(id("alice", "acme"), "secret");
        let composite =
            CompositeSecurityProvider::create(Arc::new(directory), Arc::new(TestGrants::default()));

        let err = composite
            .authenticate(&id("alice", "acme"), "wrong")
            .expect_err("must reject");
        assert_eq!(err.subsystem(), Some(crate::error::Subsystem::Authentication));
    }

    #[test]
    fn password_reset_should_propagate() {
        let directory = TestDirectory::default();
        directory.password(id("alice", "acme"), "secret");
        directory.require_reset(id("alice", "acme"));
        let composite =
            CompositeSecurityProvider::create(Arc::new(directory), Arc::new(TestGrants::default()));

        let err = composite
            .login(&id("alice", "acme"), "secret", "s1", None)
            .expect_err("must force reset");
        assert!(err.is_password_reset());
        assert!(!composite.sessions().is_active("s1"));
    }
}
