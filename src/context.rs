//! Current-organization context.
//!
//! Each thread carries an optional "current organization". It is never
//! inherited implicitly: work handed to another thread must carry a
//! [`ContextSnapshot`] (or use [`OrganizationContext::spawn`]), and every
//! entry point restores the previous value when its guard drops. A pooled
//! thread therefore never observes an organization left behind by an earlier
//! request.

use crate::types::OrganizationId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread::JoinHandle;

thread_local! {
    static CURRENT_ORG: RefCell<Option<OrganizationId>> = const { RefCell::new(None) };
}

fn replace_current(org: Option<OrganizationId>) -> Option<OrganizationId> {
    CURRENT_ORG.with(|slot| slot.replace(org))
}

/// Accessors for the calling thread's current organization.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationContext;

impl OrganizationContext {
    /// Returns the current organization, if any.
    pub fn current() -> Option<OrganizationId> {
        CURRENT_ORG.with(|slot| slot.borrow().clone())
    }

    /// Returns the current organization or the default organization.
    pub fn current_or_default() -> OrganizationId {
        Self::current().unwrap_or_default()
    }

    /// Makes `org` current until the returned guard drops.
    pub fn enter(org: OrganizationId) -> OrganizationGuard {
        let previous = replace_current(Some(org.normalized()));
        OrganizationGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Runs `f` with `org` current.
    pub fn scope<R>(org: OrganizationId, f: impl FnOnce() -> R) -> R {
        let _guard = Self::enter(org);
        f()
    }

    /// Runs one request with `org` current and an empty slot afterwards.
    ///
    /// Unlike [`OrganizationContext::scope`], nothing from before the request
    /// survives it, even if a caller leaked a value onto this thread.
    pub fn request_scope<R>(org: OrganizationId, f: impl FnOnce() -> R) -> R {
        struct ClearOnDrop;
        impl Drop for ClearOnDrop {
            fn drop(&mut self) {
                OrganizationContext::clear();
            }
        }

        let _clear = ClearOnDrop;
        replace_current(Some(org.normalized()));
        f()
    }

    /// Clears the calling thread's current organization.
    pub fn clear() {
        replace_current(None);
    }

    /// Captures the current organization for hand-off to another thread.
    pub fn capture() -> ContextSnapshot {
        ContextSnapshot {
            org: Self::current(),
        }
    }

    /// Spawns a thread that starts with the caller's current organization.
    pub fn spawn<F, T>(f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let snapshot = Self::capture();
        std::thread::spawn(move || snapshot.run(f))
    }
}

/// Restores the previous organization on drop.
#[derive(Debug)]
#[must_use = "the organization is reset when the guard drops"]
pub struct OrganizationGuard {
    previous: Option<OrganizationId>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for OrganizationGuard {
    fn drop(&mut self) {
        replace_current(self.previous.take());
    }
}

/// A captured current organization that can cross thread boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    org: Option<OrganizationId>,
}

impl ContextSnapshot {
    /// Returns the captured organization.
    pub fn organization(&self) -> Option<&OrganizationId> {
        self.org.as_ref()
    }

    /// Runs `f` with the captured organization current, restoring the
    /// thread's previous state afterwards.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = replace_current(self.org.clone());
        let _restore = OrganizationGuard {
            previous,
            _not_send: PhantomData,
        };
        f()
    }
}
