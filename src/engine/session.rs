//! One in-flight analysis per session.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

struct ActiveRun {
    run: u64,
    abort: Option<AbortHandle>,
}

#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    active: Arc<Mutex<HashMap<SessionId, ActiveRun>>>,
    next_run: Arc<AtomicU64>,
}

impl SessionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the session; the claim lasts until the returned guard drops.
    pub(crate) fn begin(&self, session: &SessionId) -> Result<RunGuard, AnalysisError> {
        let mut active = self.lock();
        if active.contains_key(session) {
            return Err(AnalysisError::SessionBusy(session.to_string()));
        }
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        active.insert(session.clone(), ActiveRun { run, abort: None });
        Ok(RunGuard {
            registry: self.clone(),
            session: session.clone(),
            run,
        })
    }

    /// Records how to abort a claimed run. A run that was cancelled (or already finished)
    /// before it could be attached is aborted straight away.
    pub(crate) fn attach(&self, session: &SessionId, run: u64, abort: AbortHandle) {
        let mut active = self.lock();
        match active.get_mut(session) {
            Some(entry) if entry.run == run => entry.abort = Some(abort),
            _ => abort.abort(),
        }
    }

    /// Releases the session and aborts its run. Returns false when the session was idle.
    pub(crate) fn cancel(&self, session: &SessionId) -> bool {
        let removed = self.lock().remove(session);
        match removed {
            Some(entry) => {
                if let Some(abort) = entry.abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_active(&self, session: &SessionId) -> bool {
        self.lock().contains_key(session)
    }

    fn release(&self, session: &SessionId, run: u64) {
        let mut active = self.lock();
        if active.get(session).is_some_and(|entry| entry.run == run) {
            active.remove(session);
        }
    }
}

pub(crate) struct RunGuard {
    registry: SessionRegistry,
    session: SessionId,
    run: u64,
}

impl RunGuard {
    pub(crate) fn run(&self) -> u64 {
        self.run
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.release(&self.session, self.run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_busy() {
        let registry = SessionRegistry::default();
        let session = SessionId::new("a");
        let _guard = registry.begin(&session).unwrap();
        assert_eq!(
            registry.begin(&session).err(),
            Some(AnalysisError::SessionBusy("a".into()))
        );
        assert!(registry.begin(&SessionId::new("b")).is_ok());
    }

    #[test]
    fn test_guard_releases_session() {
        let registry = SessionRegistry::default();
        let session = SessionId::new("a");
        {
            let _guard = registry.begin(&session).unwrap();
            assert!(registry.is_active(&session));
        }
        assert!(!registry.is_active(&session));
        assert!(registry.begin(&session).is_ok());
    }

    #[test]
    fn test_stale_guard_does_not_release_new_claim() {
        let registry = SessionRegistry::default();
        let session = SessionId::new("a");
        let old = registry.begin(&session).unwrap();
        assert!(registry.cancel(&session));
        let _new = registry.begin(&session).unwrap();
        drop(old);
        assert!(registry.is_active(&session));
    }

    #[test]
    fn test_cancel_idle_session() {
        let registry = SessionRegistry::default();
        assert!(!registry.cancel(&SessionId::new("idle")));
    }
}
