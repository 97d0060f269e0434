//! Keyed debouncing of deferred actions.
//!
//! Each key owns at most one pending action. Scheduling again under the same
//! key cancels the previous timer and restarts the quiet period.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::task::JoinHandle;

use super::lock;
use crate::deeds::DeedField;

type DeferredAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// What a debounced write persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    Field(DeedField),
    /// The whole extra-fields map; edits to different keys share one write.
    ExtraFields,
}

/// Debounce key for a pending write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteKey {
    pub deed_id: String,
    pub target: WriteTarget,
}

impl WriteKey {
    pub fn field(deed_id: impl Into<String>, field: DeedField) -> Self {
        Self {
            deed_id: deed_id.into(),
            target: WriteTarget::Field(field),
        }
    }

    pub fn extra_fields(deed_id: impl Into<String>) -> Self {
        Self {
            deed_id: deed_id.into(),
            target: WriteTarget::ExtraFields,
        }
    }
}

struct PendingTask {
    generation: u64,
    timer: JoinHandle<()>,
    action: Option<DeferredAction>,
}

struct DebounceState<K> {
    next_generation: u64,
    tasks: HashMap<K, PendingTask>,
}

/// Map from key to a cancellable deferred task.
pub struct Debouncer<K> {
    delay: Duration,
    state: Arc<Mutex<DebounceState<K>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState {
                next_generation: 0,
                tasks: HashMap::new(),
            })),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `action` once `delay` passes without another `schedule` for `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: DeferredAction = Box::new(move || action().boxed());
        let mut state = lock(&self.state);
        state.next_generation += 1;
        let generation = state.next_generation;

        let weak_state = Arc::downgrade(&self.state);
        let delay = self.delay;
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            let action = {
                let mut state = lock(&state);
                match state.tasks.get(&timer_key) {
                    Some(task) if task.generation == generation => {}
                    // superseded between wake-up and lock
                    _ => return,
                }
                state.tasks.remove(&timer_key).and_then(|task| task.action)
            };
            if let Some(action) = action {
                action().await;
            }
        });

        let replaced = state.tasks.insert(
            key,
            PendingTask {
                generation,
                timer,
                action: Some(action),
            },
        );
        if let Some(previous) = replaced {
            previous.timer.abort();
        }
    }

    /// Drops the pending action for `key` without running it.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.state).tasks.remove(key) {
            Some(task) => {
                task.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Drops every pending action whose key matches `predicate`.
    pub fn cancel_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut state = lock(&self.state);
        let keys: Vec<K> = state
            .tasks
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(task) = state.tasks.remove(key) {
                task.timer.abort();
            }
        }
        keys.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.state).tasks.contains_key(key)
    }

    pub fn pending_keys(&self) -> Vec<K> {
        lock(&self.state).tasks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every pending action now, concurrently, and waits for them.
    pub async fn flush_all(&self) {
        let actions: Vec<DeferredAction> = {
            let mut state = lock(&self.state);
            state
                .tasks
                .drain()
                .filter_map(|(_, mut task)| {
                    task.timer.abort();
                    task.action.take()
                })
                .collect()
        };
        join_all(actions.into_iter().map(|action| action())).await;
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        for (_, task) in state.tasks.drain() {
            task.timer.abort();
        }
    }
}
