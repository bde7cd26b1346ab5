//! Process-local registry of chat threads being mirrored into job documents.
//!
//! The registry is the only state shared between concurrently handled events.
//! Every mutation is a single write-locked check-and-set, and no lock is held
//! beyond the call that takes it.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};

use crate::collaborators::DocumentHandle;
use crate::job_number::JobNumber;

/// A thread bound to a job number and its document. Immutable once bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedThread {
    pub job_number: JobNumber,
    pub document: DocumentHandle,
}

/// Result of [`ThreadRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The thread was untracked and is now bound by this call.
    Registered,
    /// The thread was already bound to the same job and document.
    AlreadyRegistered,
    /// The thread is bound to a different job or document; the first binding stays.
    Conflict { existing: TrackedThread },
}

#[derive(Debug, Default)]
struct RegistryInner {
    threads: HashMap<String, TrackedThread>,
    relayed_files: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Default)]
pub struct ThreadRegistry {
    inner: RwLock<RegistryInner>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, thread_ts: &str) -> Option<TrackedThread> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.threads.get(thread_ts).cloned()
    }

    pub fn is_tracked(&self, thread_ts: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.threads.contains_key(thread_ts)
    }

    /// Bind a thread to a job. First registration wins.
    pub fn register(
        &self,
        thread_ts: &str,
        job_number: JobNumber,
        document: DocumentHandle,
    ) -> RegisterOutcome {
        let candidate = TrackedThread {
            job_number,
            document,
        };
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.threads.get(thread_ts) {
            Some(existing) if *existing == candidate => RegisterOutcome::AlreadyRegistered,
            Some(existing) => {
                warn!(
                    "thread {} already tracked for job {} (doc {}); ignoring job {} (doc {})",
                    thread_ts,
                    existing.job_number,
                    existing.document.id,
                    candidate.job_number,
                    candidate.document.id
                );
                RegisterOutcome::Conflict {
                    existing: existing.clone(),
                }
            }
            None => {
                info!(
                    "tracking thread {} for job {} (doc {})",
                    thread_ts, candidate.job_number, candidate.document.id
                );
                inner.threads.insert(thread_ts.to_string(), candidate);
                RegisterOutcome::Registered
            }
        }
    }

    /// Claim a file for relay into a tracked thread's document.
    ///
    /// Returns true only for the first claim of `file_id` within `thread_ts`,
    /// and false when the thread is not tracked.
    pub fn mark_file_relayed(&self, thread_ts: &str, file_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.threads.contains_key(thread_ts) {
            return false;
        }
        inner
            .relayed_files
            .entry(thread_ts.to_string())
            .or_default()
            .insert(file_id.to_string())
    }

    /// Drop a claim taken by [`mark_file_relayed`](Self::mark_file_relayed)
    /// so a later event can relay the file again.
    pub fn release_file(&self, thread_ts: &str, file_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(files) = inner.relayed_files.get_mut(thread_ts) {
            files.remove(file_id);
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::job_number::extract_job_number;

    fn job(digits: &str) -> JobNumber {
        extract_job_number(&format!("#{}!", digits)).expect("job number")
    }

    fn doc(id: &str) -> DocumentHandle {
        DocumentHandle::new(id)
    }

    #[test]
    fn register_then_lookup() {
        let registry = ThreadRegistry::new();
        assert!(registry.lookup("T1").is_none());

        let outcome = registry.register("T1", job("55555"), doc("doc-1"));
        assert_eq!(outcome, RegisterOutcome::Registered);

        let tracked = registry.lookup("T1").expect("tracked");
        assert_eq!(tracked.job_number.as_str(), "55555");
        assert_eq!(tracked.document.id, "doc-1");
        assert!(registry.is_tracked("T1"));
        assert!(!registry.is_tracked("T2"));
    }

    #[test]
    fn identical_registration_is_idempotent() {
        let registry = ThreadRegistry::new();
        registry.register("T1", job("55555"), doc("doc-1"));
        let outcome = registry.register("T1", job("55555"), doc("doc-1"));

        assert_eq!(outcome, RegisterOutcome::AlreadyRegistered);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("T1").expect("tracked").document.id, "doc-1");
    }

    #[test]
    fn conflicting_registration_keeps_first_binding() {
        let registry = ThreadRegistry::new();
        registry.register("T1", job("55555"), doc("doc-1"));
        let outcome = registry.register("T1", job("66666"), doc("doc-2"));

        match outcome {
            RegisterOutcome::Conflict { existing } => {
                assert_eq!(existing.job_number.as_str(), "55555");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        let tracked = registry.lookup("T1").expect("tracked");
        assert_eq!(tracked.job_number.as_str(), "55555");
        assert_eq!(tracked.document.id, "doc-1");
    }

    #[test]
    fn file_relay_claims_are_single_use_per_tracked_thread() {
        let registry = ThreadRegistry::new();
        assert!(!registry.mark_file_relayed("T1", "F1"));

        registry.register("T1", job("55555"), doc("doc-1"));
        assert!(registry.mark_file_relayed("T1", "F1"));
        assert!(!registry.mark_file_relayed("T1", "F1"));
        assert!(registry.mark_file_relayed("T1", "F2"));
    }

    #[test]
    fn released_file_can_be_claimed_again() {
        let registry = ThreadRegistry::new();
        registry.register("T1", job("55555"), doc("doc-1"));
        assert!(registry.mark_file_relayed("T1", "F1"));

        registry.release_file("T1", "F1");
        assert!(registry.mark_file_relayed("T1", "F1"));

        registry.release_file("T9", "F1");
        assert!(!registry.mark_file_relayed("T1", "F1"));
    }

    #[test]
    fn concurrent_registration_has_one_winner() {
        let registry = Arc::new(ThreadRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register("T1", job("55555"), doc("doc-1")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .filter(|outcome| *outcome == RegisterOutcome::Registered)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
