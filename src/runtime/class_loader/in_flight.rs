use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::Mutex;

use crate::error::LoadError;

/// Tracks which thread is loading which class and which class every blocked thread waits on.
/// A wait that would close a loop is refused instead of blocking forever.
#[derive(Debug, Default)]
pub(super) struct InFlight {
    state: Mutex<InFlightState>,
}

#[derive(Debug, Default)]
struct InFlightState {
    owners: HashMap<Arc<str>, ThreadId>,
    waiting: HashMap<ThreadId, Arc<str>>,
}

impl InFlight {
    /// Records the current thread as the loader of `name` until the guard is dropped.
    pub(super) fn start(&self, name: &Arc<str>) -> OwnerGuard<'_> {
        self.state
            .lock()
            .owners
            .insert(Arc::clone(name), thread::current().id());
        OwnerGuard {
            in_flight: self,
            name: Arc::clone(name),
        }
    }

    /// Registers the current thread as waiting for `name`. Fails if `name` is being loaded by
    /// this thread, directly or through a chain of threads waiting on each other.
    pub(super) fn wait_for(&self, name: &Arc<str>) -> Result<WaitGuard<'_>, LoadError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let mut owner = state.owners.get(name).copied();
        // every waiting thread is visited at most once
        for _ in 0..=state.waiting.len() {
            let Some(thread) = owner else {
                break;
            };
            if thread == me {
                return Err(LoadError::CircularDependency {
                    class: Arc::clone(name),
                });
            }
            owner = state
                .waiting
                .get(&thread)
                .and_then(|waited| state.owners.get(waited))
                .copied();
        }

        state.waiting.insert(me, Arc::clone(name));
        Ok(WaitGuard {
            in_flight: self,
            thread: me,
        })
    }
}

pub(super) struct OwnerGuard<'a> {
    in_flight: &'a InFlight,
    name: Arc<str>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.state.lock().owners.remove(&self.name);
    }
}

pub(super) struct WaitGuard<'a> {
    in_flight: &'a InFlight,
    thread: ThreadId,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.state.lock().waiting.remove(&self.thread);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn same_thread_reentry_is_circular() {
        let in_flight = InFlight::default();
        let name: Arc<str> = Arc::from("demo/A");
        let _owner = in_flight.start(&name);
        assert!(matches!(
            in_flight.wait_for(&name),
            Err(LoadError::CircularDependency { class }) if &*class == "demo/A"
        ));
    }

    #[test]
    fn waiting_on_a_finished_load_is_allowed() {
        let in_flight = InFlight::default();
        let name: Arc<str> = Arc::from("demo/A");
        drop(in_flight.start(&name));
        let guard = in_flight.wait_for(&name).unwrap();
        drop(guard);
        assert!(in_flight.state.lock().waiting.is_empty());
    }

    #[test]
    fn cross_thread_wait_cycle_is_refused() {
        let in_flight = Arc::new(InFlight::default());
        let a: Arc<str> = Arc::from("demo/A");
        let b: Arc<str> = Arc::from("demo/B");

        let _owner_a = in_flight.start(&a);
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let other = {
            let in_flight = Arc::clone(&in_flight);
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                // owns B and waits for A
                let _owner_b = in_flight.start(&b);
                let _wait = in_flight.wait_for(&a).unwrap();
                ready_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
        };

        ready_rx.recv().unwrap();
        assert!(matches!(
            in_flight.wait_for(&b),
            Err(LoadError::CircularDependency { class }) if &*class == "demo/B"
        ));
        done_tx.send(()).unwrap();
        other.join().unwrap();
    }
}
