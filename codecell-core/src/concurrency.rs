//! Bounded admission control: a fixed number of requests may be admitted
//! to wait at all (the bounded queue), and among those, only
//! `concurrency_cap` may actually run a sandbox call at once. Overflow
//! beyond the admission window is refused immediately rather than queued
//! indefinitely.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct AdmittedPermit {
    _admission: OwnedSemaphorePermit,
    _execution: OwnedSemaphorePermit,
}

pub struct AdmissionGate {
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
}

impl AdmissionGate {
    pub fn new(concurrency_cap: usize, max_queue: usize) -> Self {
        let concurrency_cap = concurrency_cap.max(1);
        Self {
            admission: Arc::new(Semaphore::new(concurrency_cap + max_queue)),
            execution: Arc::new(Semaphore::new(concurrency_cap)),
        }
    }

    /// Admits the caller, or refuses immediately if the admission window
    /// (concurrency cap + queue bound) is already full. A successful
    /// admission may still wait for an execution slot, but that wait is
    /// bounded by the admission window's size.
    pub async fn acquire(&self) -> Option<AdmittedPermit> {
        let admission = self.admission.clone().try_acquire_owned().ok()?;
        let execution = self
            .execution
            .clone()
            .acquire_owned()
            .await
            .expect("execution semaphore is never closed");
        Some(AdmittedPermit {
            _admission: admission,
            _execution: execution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_within_capacity() {
        let gate = AdmissionGate::new(2, 2);
        assert!(gate.acquire().await.is_some());
    }

    #[tokio::test]
    async fn refuses_once_admission_window_is_full() {
        let gate = AdmissionGate::new(1, 0);
        let _held = gate.acquire().await.unwrap();
        assert!(gate.acquire().await.is_none());
    }

    #[tokio::test]
    async fn releases_capacity_on_drop() {
        let gate = AdmissionGate::new(1, 0);
        {
            let _held = gate.acquire().await.unwrap();
            assert!(gate.acquire().await.is_none());
        }
        assert!(gate.acquire().await.is_some());
    }
}
