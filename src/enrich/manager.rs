// src/enrich/manager.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::oneshot;

use super::{EntityKey, StartError, TaskKind, TaskSlot, TaskStatus, TextPolicy};
use crate::error::{contained, RemoteCallResult};

/// Keyed arena of task slots. Clones share the same slots.
///
/// Invariants:
/// - at most one run per entity is in flight, whatever its kind;
/// - a settlement only ever writes the slot of the (entity, kind, run) that started it.
pub struct EnrichmentTaskManager<T> {
    inner: Arc<Mutex<Inner<T>>>,
    policy: TextPolicy,
}

impl<T> Clone for EnrichmentTaskManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
        }
    }
}

struct Inner<T> {
    slots: HashMap<(EntityKey, TaskKind), SlotEntry<T>>,
    /// Entity -> (kind, run id) currently in flight.
    running: HashMap<EntityKey, (TaskKind, u64)>,
    next_run: u64,
}

struct SlotEntry<T> {
    slot: TaskSlot<T>,
    run_id: u64,
}

/// Handle to an accepted run. Dropping it does not affect the run.
pub struct TaskTicket<T> {
    rx: oneshot::Receiver<Option<TaskSlot<T>>>,
}

impl<T> TaskTicket<T> {
    /// Wait for the run to settle and return the slot as it was written.
    pub async fn settled(self) -> Option<TaskSlot<T>> {
        self.rx.await.ok().flatten()
    }
}

impl<T> EnrichmentTaskManager<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(policy: TextPolicy) -> Self {
        crate::metrics::ensure_described();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::new(),
                running: HashMap::new(),
                next_run: 0,
            })),
            policy,
        }
    }

    pub fn policy(&self) -> TextPolicy {
        self.policy
    }

    /// Accept or reject a run of `op(text)` for `(key, kind)`.
    ///
    /// Rejections are synchronous and leave every slot untouched. On acceptance the slot is
    /// `Running` before this returns and `op` runs on its own task.
    pub fn start<F, Fut>(
        &self,
        key: &EntityKey,
        kind: TaskKind,
        text: String,
        op: F,
    ) -> Result<TaskTicket<T>, StartError>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = RemoteCallResult<T>> + Send + 'static,
    {
        let len = text.chars().count();
        let min = self.policy.min_chars(kind);
        if len < min {
            counter!("enrichment_rejected_total", "kind" => kind.as_str(), "reason" => "text_too_short")
                .increment(1);
            return Err(StartError::TextTooShort { kind, len, min });
        }

        let run_id = {
            let mut inner = self.inner.lock().expect("enrichment slots poisoned");
            if let Some(&(running, _)) = inner.running.get(key) {
                counter!("enrichment_rejected_total", "kind" => kind.as_str(), "reason" => "already_running")
                    .increment(1);
                return Err(StartError::AlreadyRunning {
                    key: key.clone(),
                    running,
                });
            }
            inner.next_run += 1;
            let run_id = inner.next_run;
            let entry = inner
                .slots
                .entry((key.clone(), kind))
                .or_insert_with(|| SlotEntry {
                    slot: TaskSlot::default(),
                    run_id,
                });
            entry.run_id = run_id;
            entry.slot.status = TaskStatus::Running;
            entry.slot.error = None;
            inner.running.insert(key.clone(), (kind, run_id));
            run_id
        };

        counter!("enrichment_started_total", "kind" => kind.as_str()).increment(1);
        tracing::debug!(entity = %key.short_hash(), %kind, run_id, "enrichment started");

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let outcome = contained(op(text)).await;
            let ms = t0.elapsed().as_secs_f64() * 1_000.0;
            histogram!("enrichment_ms", "kind" => kind.as_str()).record(ms);
            let written = settle(&inner, &key, kind, run_id, outcome);
            if let Some(slot) = &written {
                let status = match slot.status {
                    TaskStatus::Succeeded => "succeeded",
                    _ => "failed",
                };
                counter!("enrichment_settled_total", "kind" => kind.as_str(), "status" => status)
                    .increment(1);
                match &slot.error {
                    None => tracing::debug!(entity = %key.short_hash(), %kind, elapsed_ms = ms, "enrichment done"),
                    Some(e) => tracing::warn!(entity = %key.short_hash(), %kind, error = %e, "enrichment failed"),
                }
            }
            let _ = tx.send(written);
        });

        Ok(TaskTicket { rx })
    }

    /// Current slot; `Idle` when nothing was ever started.
    pub fn state_of(&self, key: &EntityKey, kind: TaskKind) -> TaskSlot<T> {
        let inner = self.inner.lock().expect("enrichment slots poisoned");
        inner
            .slots
            .get(&(key.clone(), kind))
            .map(|e| e.slot.clone())
            .unwrap_or_default()
    }

    /// Kind in flight for `key`, if any.
    pub fn running_kind(&self, key: &EntityKey) -> Option<TaskKind> {
        let inner = self.inner.lock().expect("enrichment slots poisoned");
        inner.running.get(key).map(|&(kind, _)| kind)
    }

    pub fn slots_for(&self, key: &EntityKey) -> BTreeMap<TaskKind, TaskSlot<T>> {
        let inner = self.inner.lock().expect("enrichment slots poisoned");
        TaskKind::ALL
            .into_iter()
            .filter_map(|kind| {
                inner
                    .slots
                    .get(&(key.clone(), kind))
                    .map(|e| (kind, e.slot.clone()))
            })
            .collect()
    }

    /// Drop slots of entities not in `live`. Entities with a run in flight are kept.
    /// Returns the number of slots removed.
    pub fn prune(&self, live: &HashSet<EntityKey>) -> usize {
        let mut inner = self.inner.lock().expect("enrichment slots poisoned");
        let Inner { slots, running, .. } = &mut *inner;
        let before = slots.len();
        slots.retain(|(key, _), _| live.contains(key) || running.contains_key(key));
        before - slots.len()
    }
}

fn settle<T: Clone>(
    inner: &Mutex<Inner<T>>,
    key: &EntityKey,
    kind: TaskKind,
    run_id: u64,
    outcome: RemoteCallResult<T>,
) -> Option<TaskSlot<T>> {
    let mut inner = inner.lock().expect("enrichment slots poisoned");
    if inner.running.get(key) == Some(&(kind, run_id)) {
        inner.running.remove(key);
    }
    let entry = inner.slots.get_mut(&(key.clone(), kind))?;
    if entry.run_id != run_id {
        return None;
    }
    match outcome {
        Ok(value) => {
            entry.slot.status = TaskStatus::Succeeded;
            entry.slot.result = Some(value);
            entry.slot.error = None;
        }
        Err(e) => {
            entry.slot.status = TaskStatus::Failed;
            entry.slot.result = None;
            entry.slot.error = Some(e.detail);
        }
    }
    Some(entry.slot.clone())
}
