#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use bi_security::{
    AuthenticationChangeEvent, AuthenticationChangeListener, AuthorizationProvider,
    CachableProvider, CachingAuthorizationProvider, CompositeSecurityProvider, Decision, Error, Grantee,
    IdentityId, IdentityType, JsonConfigurableProvider, LoginEvent, MemoryAuthenticationProvider,
    MemoryAuthorizationProvider, OrganizationContext, OrganizationId, Permission, Principal,
    ResourceAction, ResourceKey, ResourceType, SecurityConfig, SecurityProvider, SessionEvent,
    SessionListener,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn id(name: &str, org: &str) -> IdentityId {
    IdentityId::new(name, org).unwrap()
}

fn org(value: &str) -> OrganizationId {
    OrganizationId::new(value).unwrap()
}

fn report(path: &str, org_name: &str) -> ResourceKey {
    ResourceKey::new(ResourceType::Report, path, org(org_name)).unwrap()
}

struct Fixture {
    directory: Arc<MemoryAuthenticationProvider>,
    grants: Arc<CachingAuthorizationProvider<MemoryAuthorizationProvider>>,
    security: Arc<CompositeSecurityProvider>,
}

fn fixture(config: SecurityConfig) -> Fixture {
    let directory = Arc::new(MemoryAuthenticationProvider::new());
    let grants = Arc::new(
        CachingAuthorizationProvider::new(MemoryAuthorizationProvider::new(), 256)
            .with_ttl(Duration::from_secs(60)),
    );
    let security =
        CompositeSecurityProvider::create_with_config(directory.clone(), grants.clone(), config);
    Fixture {
        directory,
        grants,
        security,
    }
}

fn check(security: &CompositeSecurityProvider, principal: &Principal, key: &ResourceKey) -> Decision {
    security
        .check_permission(principal, key, ResourceAction::Read)
        .unwrap()
}

#[test]
fn folder_grant_should_reach_nested_report_through_role_hierarchy() {
    let f = fixture(SecurityConfig::new());
    let alice = id("alice", "acme");
    f.directory.add_user(alice.clone(), "pw");
    f.directory.add_user_role(alice.clone(), id("analyst", "acme"));
    f.directory
        .add_role_parent(id("analyst", "acme"), id("viewer", "acme"));
    f.security
        .set_permission(
            &report("/sales", "acme"),
            Permission::new().with_grant(ResourceAction::Read, Grantee::Role(id("viewer", "acme"))),
        )
        .unwrap();

    let principal = f.security.authenticate(&alice, "pw").unwrap();

    assert_eq!(check(&f.security, &principal, &report("/sales/q1", "acme")), Decision::Allow);
    assert_eq!(check(&f.security, &principal, &report("/hr/q1", "acme")), Decision::Deny);
    assert_eq!(check(&f.security, &principal, &report("/sales/q1", "globex")), Decision::Deny);
}

#[test]
fn direct_strategy_should_ignore_folder_grants() {
    let f = fixture(SecurityConfig::new().permission_strategy("direct"));
    assert_eq!(f.security.strategy_name(), "direct");
    let alice = id("alice", "acme");
    f.directory.add_user(alice.clone(), "pw");
    f.security
        .set_permission(
            &report("/sales", "acme"),
            Permission::new().with_grant(ResourceAction::Read, Grantee::User(alice.clone())),
        )
        .unwrap();
    let principal = f.security.authenticate(&alice, "pw").unwrap();

    assert_eq!(check(&f.security, &principal, &report("/sales", "acme")), Decision::Allow);
    assert_eq!(check(&f.security, &principal, &report("/sales/q1", "acme")), Decision::Deny);
}

#[test]
fn unknown_strategy_should_fall_back_to_default() {
    let f = fixture(SecurityConfig::new().permission_strategy("com.example.Missing"));
    assert_eq!(f.security.strategy_name(), "default");
}

#[test]
fn self_org_key_should_read_default_org_grant() {
    let f = fixture(SecurityConfig::new());
    let grant = Permission::new().with_grant(
        ResourceAction::Read,
        Grantee::Organization(OrganizationId::default_org()),
    );
    f.security
        .set_permission(&report("/shared", bi_security::DEFAULT_ORG_ID), grant.clone())
        .unwrap();

    let own =
        ResourceKey::new(ResourceType::Report, "/shared", OrganizationId::self_org()).unwrap();
    assert_eq!(f.security.get_permission(&own).unwrap(), Some(grant));
}

#[test]
fn current_org_key_should_follow_context() {
    let f = fixture(SecurityConfig::new());
    let bob = id("bob", "globex");
    f.directory.add_user(bob.clone(), "pw");
    f.security
        .set_permission(
            &report("/ops", "globex"),
            Permission::new().with_grant(ResourceAction::Read, Grantee::Organization(org("globex"))),
        )
        .unwrap();
    let principal = f.security.authenticate(&bob, "pw").unwrap();

    let key = OrganizationContext::request_scope(org("globex"), || {
        ResourceKey::in_current_org(ResourceType::Report, "/ops/daily").unwrap()
    });

    assert_eq!(OrganizationContext::current(), None);
    assert_eq!(check(&f.security, &principal, &key), Decision::Allow);
}

#[test]
fn user_rename_should_move_identity_grant_and_keep_access() {
    let f = fixture(SecurityConfig::new());
    let alice = id("alice", "acme");
    let alicia = id("alicia", "acme");
    f.directory.add_user(alice.clone(), "pw");
    f.security
        .set_identity_permission(
            ResourceType::SecurityUser,
            &alice,
            Permission::new().with_grant(ResourceAction::Admin, Grantee::Role(id("hr", "acme"))),
        )
        .unwrap();
    let key = report("/a", "acme");
    f.security
        .set_permission(
            &key,
            Permission::new().with_grant(ResourceAction::Read, Grantee::User(alice.clone())),
        )
        .unwrap();
    let _ = f.security.get_permission(&key).unwrap();

    let event = f
        .directory
        .rename_identity(IdentityType::User, &alice, alicia.clone())
        .unwrap();
    f.security.authentication_changed(&event).unwrap();

    assert_eq!(
        f.security
            .get_identity_permission(ResourceType::SecurityUser, &alice)
            .unwrap(),
        None
    );
    assert!(
        f.security
            .get_identity_permission(ResourceType::SecurityUser, &alicia)
            .unwrap()
            .is_some()
    );
    let principal = f.security.authenticate(&alicia, "pw").unwrap();
    assert_eq!(check(&f.security, &principal, &key), Decision::Allow);
}

#[test]
fn organization_removal_should_reach_listeners_after_store() {
    struct Recorder {
        grants: Arc<CachingAuthorizationProvider<MemoryAuthorizationProvider>>,
        seen: Mutex<Vec<usize>>,
    }

    impl AuthenticationChangeListener for Recorder {
        fn authentication_changed(&self, _event: &AuthenticationChangeEvent) -> bi_security::Result<()> {
            self.seen.lock().unwrap().push(self.grants.inner().len());
            Ok(())
        }
    }

    let f = fixture(SecurityConfig::new());
    f.security
        .set_permission(&report("/a", "acme"), Permission::new())
        .unwrap();
    f.security
        .set_permission(&report("/b", "globex"), Permission::new())
        .unwrap();
    let recorder = Arc::new(Recorder {
        grants: f.grants.clone(),
        seen: Mutex::new(Vec::new()),
    });
    f.security.change_listeners().add(recorder.clone());

    f.security
        .authentication_changed(&AuthenticationChangeEvent::organization_removed(org("acme")))
        .unwrap();

    assert_eq!(*recorder.seen.lock().unwrap(), vec![1]);
}

#[test]
fn password_reset_should_surface_as_its_own_error() {
    let f = fixture(SecurityConfig::new());
    let alice = id("alice", "acme");
    f.directory.add_user(alice.clone(), "pw");
    f.directory.require_password_reset(alice.clone());

    let err = f.security.authenticate(&alice, "pw").unwrap_err();
    assert!(matches!(err, Error::PasswordReset { ref user } if user == &alice));

    let err = f.security.authenticate(&alice, "nope").unwrap_err();
    assert!(!err.is_password_reset());
}

#[test]
fn login_and_logout_should_notify_once_per_session() {
    #[derive(Default)]
    struct Audit {
        entries: Mutex<Vec<String>>,
    }

    impl SessionListener for Audit {
        fn logged_in(&self, event: &LoginEvent) {
            let entry = format!("in:{}", event.principal().id());
            self.entries.lock().unwrap().push(entry);
        }

        fn logged_out(&self, event: &SessionEvent) {
            let entry = format!("out:{}", event.principal().id());
            self.entries.lock().unwrap().push(entry);
        }
    }

    let f = fixture(SecurityConfig::new());
    let alice = id("alice", "acme");
    f.directory.add_user(alice.clone(), "pw");
    let audit = Arc::new(Audit::default());
    f.security.sessions().add_listener(audit.clone());

    let principal = f
        .security
        .login(&alice, "pw", "s-1", Some("10.0.0.1".to_string()))
        .unwrap();
    assert!(f.security.logout(&principal, true));
    assert!(!f.security.logout(&principal, true));

    assert_eq!(
        *audit.entries.lock().unwrap(),
        vec!["in:alice@acme".to_string(), "out:alice@acme".to_string()]
    );
}

#[test]
fn configuration_should_round_trip_through_composite() {
    let f = fixture(SecurityConfig::new());
    f.security
        .set_permission(
            &report("/a", "acme"),
            Permission::new().with_grant(ResourceAction::Read, Grantee::Organization(org("acme"))),
        )
        .unwrap();
    let document = f.security.configuration().write_configuration().unwrap();

    let other = fixture(SecurityConfig::new());
    other
        .security
        .configuration()
        .read_configuration(&document)
        .unwrap();
    assert_eq!(
        other.security.get_permissions().unwrap(),
        f.security.get_permissions().unwrap()
    );
    assert!(other.security.cache().is_cache_enabled());
}

#[test]
fn tear_down_should_release_grants_once() {
    let f = fixture(SecurityConfig::new());
    f.security
        .set_permission(&report("/a", "acme"), Permission::new())
        .unwrap();

    f.security.tear_down();
    f.security.tear_down();

    assert!(f.grants.inner().is_empty());
}

#[test]
fn concurrent_checks_should_see_grant_after_write() {
    let f = fixture(SecurityConfig::new());
    let alice = id("alice", "acme");
    f.directory.add_user(alice.clone(), "pw");
    let principal = f.security.authenticate(&alice, "pw").unwrap();
    let key = report("/sales/q1", "acme");
    assert_eq!(check(&f.security, &principal, &key), Decision::Deny);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let _ = check(&f.security, &principal, &key);
                }
            });
        }
        scope.spawn(|| {
            f.security
                .set_permission(
                    &report("/sales", "acme"),
                    Permission::new().with_grant(ResourceAction::Read, Grantee::User(alice.clone())),
                )
                .unwrap();
        });
    });

    assert_eq!(check(&f.security, &principal, &key), Decision::Allow);
}

#[test]
fn own_org_user_grant_should_match_default_org_principal() {
    let f = fixture(SecurityConfig::new());
    let own = id("alice", "SELF");
    f.directory.add_user(own.clone(), "pw");
    let key = report("/shared", bi_security::DEFAULT_ORG_ID);
    f.security
        .set_permission(
            &key,
            Permission::new().with_grant(ResourceAction::Read, Grantee::User(own.clone())),
        )
        .unwrap();

    let principal = f.security.authenticate(&id("alice", "host-org"), "pw").unwrap();
    assert_eq!(check(&f.security, &principal, &key), Decision::Allow);
}
