//! Lock capability over an externally owned session.
//!
//! Storage never owns a live `Session`. It borrows one through
//! `SessionHandle`, takes the read lock only long enough to copy what it
//! needs, and leaves in-place mutation (under the write lock) to the owner.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chatvault_types::session::Session;

/// Shared, lock-protected session as held by the application.
pub type SharedSession = Arc<RwLock<Session>>;

/// Read/write lock access to a session the caller owns.
pub trait SessionHandle: Send + Sync {
    /// Acquire the read lock.
    fn read(&self) -> RwLockReadGuard<'_, Session>;

    /// Acquire the write lock.
    fn write(&self) -> RwLockWriteGuard<'_, Session>;

    /// Clone the session under the read lock.
    fn snapshot(&self) -> Session {
        self.read().clone()
    }
}

// A poisoned lock only means another holder panicked mid-update; the data
// is still the best view we have, so recover the guard instead of failing.
impl SessionHandle for RwLock<Session> {
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        RwLock::read(self).unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        RwLock::write(self).unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: SessionHandle + ?Sized> SessionHandle for Arc<T> {
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        (**self).read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        (**self).write()
    }
}

/// Wrap a session for shared ownership.
pub fn share(session: Session) -> SharedSession {
    Arc::new(RwLock::new(session))
}
