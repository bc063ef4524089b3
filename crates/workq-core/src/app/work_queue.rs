//! WorkQueue - group の振り分けと定期ドレインの司令塔
//!
//! # 設計
//! - ordered / randomized の group map はそれぞれ独立した Mutex で守る
//!   （片方の変更がもう片方と競合しない）
//! - map のロックは dispatch の間だけ保持し、ドレインの完了は待たない
//! - グローバル変数は持たない。インスタンスごとに独立して動く

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::config::WorkQueueConfig;
use super::loops::{ingest_loop, timer_loop};
use super::submitter::Submitter;
use super::WorkQueueBuilder;
use crate::domain::{Discipline, Submission};
use crate::observability::GroupStats;
use crate::queue::{Group, StartGate};

type GroupMap<T> = HashMap<String, Arc<Group<T>>>;

struct Shared<T> {
    ordered: Mutex<GroupMap<T>>,
    randomized: Mutex<GroupMap<T>>,
    drain_interval: RwLock<Duration>,
    forward_completion: bool,
    tx: mpsc::Sender<Submission<T>>,
    rx: Mutex<Option<mpsc::Receiver<Submission<T>>>>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

/// Group-partitioned work queue drained on a timer.
///
/// Cheap to clone; every clone drives the same groups.
///
/// # フロー
/// 1. `submitter().submit(..)` で channel に投入
/// 2. ingest loop が discipline / group 名で振り分け（group は遅延生成）
/// 3. 各 discipline のタイマーが tick ごとに、未処理があり gate が開いている
///    group のドレインを spawn
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> WorkQueue<T> {
    pub fn builder() -> WorkQueueBuilder<T> {
        WorkQueueBuilder::new()
    }

    /// Callers go through `WorkQueueBuilder::build`, which validates `config`.
    pub(crate) fn from_config(config: &WorkQueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                ordered: Mutex::new(HashMap::new()),
                randomized: Mutex::new(HashMap::new()),
                drain_interval: RwLock::new(config.drain_interval()),
                forward_completion: config.forward_completion_callbacks,
                tx,
                rx: Mutex::new(Some(rx)),
                started: AtomicBool::new(false),
                shutdown_tx,
                loops: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Launch the ingest loop and both timer loops.
    ///
    /// Only the first call on a queue does anything; it returns `true`.
    /// Must be called from inside a tokio runtime.
    pub fn start(&self) -> bool {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Some(rx) = lock(&self.shared.rx).take() else {
            return false;
        };

        let handles = vec![
            tokio::spawn(ingest_loop(
                self.clone(),
                rx,
                self.shared.shutdown_tx.subscribe(),
            )),
            tokio::spawn(timer_loop(
                self.clone(),
                Discipline::Ordered,
                self.shared.shutdown_tx.subscribe(),
            )),
            tokio::spawn(timer_loop(
                self.clone(),
                Discipline::Randomized,
                self.shared.shutdown_tx.subscribe(),
            )),
        ];
        lock(&self.shared.loops).extend(handles);

        info!(interval = ?self.drain_interval(), "work queue started");
        true
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Stop the background loops and wait for them to exit.
    ///
    /// Drains already spawned run to completion on their own. The queue
    /// cannot be started again afterwards.
    pub async fn shutdown(&self) {
        // ignore send error: no loop may be subscribed yet
        let _ = self.shared.shutdown_tx.send(true);

        let handles = std::mem::take(&mut *lock(&self.shared.loops));
        for handle in handles {
            let _ = handle.await;
        }
        info!("work queue stopped");
    }

    pub fn submitter(&self) -> Submitter<T> {
        Submitter::new(self.shared.tx.clone())
    }

    /// Route a submission directly, bypassing the channel.
    pub fn enqueue(&self, submission: Submission<T>) {
        self.route(submission);
    }

    pub fn drain_interval(&self) -> Duration {
        *self
            .shared
            .drain_interval
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes effect when each timer next re-arms. A zero interval is ignored.
    pub fn set_drain_interval(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("ignoring zero drain interval");
            return;
        }
        *self
            .shared
            .drain_interval
            .write()
            .unwrap_or_else(PoisonError::into_inner) = interval;
    }

    /// Gate both the ordered and the randomized group called `name`.
    ///
    /// Either group is created if missing. The gate is evaluated on each tick
    /// with that discipline's group map locked, so it must not call back into
    /// this queue.
    pub fn set_group_start_gate<F>(&self, name: &str, gate: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let gate: StartGate = Arc::new(gate);
        self.replace_start_gate(name, Some(gate));
    }

    /// Remove the gate from both groups called `name`.
    pub fn clear_group_start_gate(&self, name: &str) {
        self.replace_start_gate(name, None);
    }

    fn replace_start_gate(&self, name: &str, gate: Option<StartGate>) {
        for discipline in [Discipline::Ordered, Discipline::Randomized] {
            let mut groups = self.groups(discipline);
            group_entry(&mut groups, name, discipline).set_start_gate(gate.clone());
        }
    }

    /// Forget both groups called `name`. A drain already running finishes unaffected.
    pub fn remove_group(&self, name: &str) {
        for discipline in [Discipline::Ordered, Discipline::Randomized] {
            if self.groups(discipline).remove(name).is_some() {
                debug!(group = name, %discipline, "group removed");
            }
        }
    }

    pub fn group(&self, name: &str, discipline: Discipline) -> Option<Arc<Group<T>>> {
        self.groups(discipline).get(name).cloned()
    }

    /// Entries waiting in a group; zero when the group does not exist.
    pub fn pending(&self, name: &str, discipline: Discipline) -> usize {
        self.group(name, discipline)
            .map(|group| group.pending())
            .unwrap_or(0)
    }

    /// Every group of both disciplines, sorted by discipline then name.
    pub fn snapshot(&self) -> Vec<GroupStats> {
        let mut stats = Vec::new();
        for discipline in [Discipline::Ordered, Discipline::Randomized] {
            let groups = self.groups(discipline);
            let mut names: Vec<&String> = groups.keys().collect();
            names.sort();
            stats.extend(names.into_iter().map(|name| {
                let group = &groups[name];
                GroupStats {
                    name: name.clone(),
                    discipline,
                    pending: group.pending(),
                    draining: group.is_draining(),
                    gated: group.has_start_gate(),
                    last_drain_at: group.last_drain_at(),
                }
            }));
        }
        stats
    }

    /// One ordered tick by hand. Returns how many drains were spawned.
    pub fn dispatch_ordered(&self) -> usize {
        self.dispatch(Discipline::Ordered)
    }

    /// One randomized tick by hand. Returns how many drains were spawned.
    pub fn dispatch_randomized(&self) -> usize {
        self.dispatch(Discipline::Randomized)
    }

    pub(crate) fn dispatch(&self, discipline: Discipline) -> usize {
        let groups = self.groups(discipline);
        let mut dispatched = 0;

        for group in groups.values() {
            if !group.has_pending() {
                continue;
            }
            if !group.is_ready() {
                trace!(group = group.name(), %discipline, "start gate closed");
                continue;
            }
            let group = Arc::clone(group);
            tokio::spawn(async move {
                group.drain().await;
            });
            dispatched += 1;
        }

        dispatched
    }

    pub(crate) fn route(&self, submission: Submission<T>) {
        let (discipline, name, entry) = submission.into_routed(self.shared.forward_completion);
        trace!(group = %name, %discipline, entry = %entry.id(), "routing submission");

        // Push with the map locked so a concurrent remove_group cannot strand the entry.
        let mut groups = self.groups(discipline);
        group_entry(&mut groups, &name, discipline).push(entry);
    }

    fn groups(&self, discipline: Discipline) -> MutexGuard<'_, GroupMap<T>> {
        match discipline {
            Discipline::Ordered => lock(&self.shared.ordered),
            Discipline::Randomized => lock(&self.shared.randomized),
        }
    }
}

fn group_entry<'a, T: Send + Sync + 'static>(
    groups: &'a mut GroupMap<T>,
    name: &str,
    discipline: Discipline,
) -> &'a Arc<Group<T>> {
    groups.entry(name.to_string()).or_insert_with(|| {
        debug!(group = name, %discipline, "group created");
        Arc::new(Group::new(name, discipline))
    })
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
