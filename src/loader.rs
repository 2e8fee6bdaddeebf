//! Deferred page construction: a priority preload queue plus background
//! builder threads that hand finished pages back over a channel.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, VitrineError};
use crate::page::{Page, PageFactory};

/// Callback invoked once when a load finishes, with the page id and
/// whether construction succeeded.
pub type LoadCallback = Box<dyn FnOnce(&str, bool) + Send>;

/// A queued preload request, ranked by priority then arrival order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreloadRequest {
    /// Id of the page to construct.
    pub page_id: String,
    /// Scheduling priority; higher drains first.
    pub priority: i32,
    seq: u64,
}

/// A finished load, fresh for the current generation.
///
/// Stale results (loads outlived by an [`LazyPageLoader::invalidate`]
/// call) never surface here; they are destroyed inside the loader.
pub struct LoadCompletion {
    /// Id of the page that finished loading.
    pub page_id: String,
    /// Wall-clock construction time measured on the builder thread.
    pub elapsed: Duration,
    /// The constructed page, or the construction error.
    pub outcome: Result<Box<dyn Page>>,
}

struct RawCompletion {
    page_id: String,
    generation: u64,
    elapsed: Duration,
    outcome: Result<Box<dyn Page>>,
}

/// Where a background build stands, from spawn until its completion is
/// consumed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BuildState {
    Running,
    Done { ok: bool },
}

/// Schedules deferred page construction.
///
/// Preload requests wait in a priority queue until the driver starts
/// them; construction itself runs on short-lived builder threads. Each
/// builder sends its result and updates the shared build table under a
/// single lock hold, so an id the table still tracks always has a
/// completion already sent or on the way.
pub struct LazyPageLoader {
    queue: Vec<PreloadRequest>,
    seq: u64,
    builds: Arc<Mutex<HashMap<String, BuildState>>>,
    callbacks: HashMap<String, Vec<LoadCallback>>,
    tx: Sender<RawCompletion>,
    rx: Receiver<RawCompletion>,
    pending: Vec<RawCompletion>,
    generation: u64,
}

impl Default for LazyPageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyPageLoader {
    /// Creates an idle loader with an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            queue: Vec::new(),
            seq: 0,
            builds: Arc::new(Mutex::new(HashMap::new())),
            callbacks: HashMap::new(),
            tx,
            rx,
            pending: Vec::new(),
            generation: 0,
        }
    }

    /// Queues a page for background construction.
    ///
    /// A request for an id that is already queued with an equal or higher
    /// priority, or already being constructed, is a no-op. A strictly
    /// higher priority replaces the queued entry at its new rank. Returns
    /// whether the queue changed.
    pub fn enqueue_preload(&mut self, id: &str, priority: i32) -> bool {
        if self.is_loading(id) {
            debug!(page_id = %id, "loader.preload.already_loading");
            return false;
        }
        if let Some(pos) = self.queue.iter().position(|r| r.page_id == id) {
            if self.queue[pos].priority >= priority {
                return false;
            }
            self.queue.remove(pos);
            debug!(page_id = %id, priority, "loader.preload.requeued");
        } else {
            debug!(page_id = %id, priority, "loader.preload.queued");
        }
        self.seq += 1;
        let request = PreloadRequest {
            page_id: id.to_owned(),
            priority,
            seq: self.seq,
        };
        let at = self
            .queue
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, request);
        true
    }

    /// Removes a queued request, returning whether one was present.
    pub fn remove_preload(&mut self, id: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|r| r.page_id != id);
        before != self.queue.len()
    }

    /// Takes the highest-priority request off the queue.
    pub fn pop_next_preload(&mut self) -> Option<PreloadRequest> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    /// Returns whether a request for `id` is waiting in the queue.
    pub fn is_queued(&self, id: &str) -> bool {
        self.queue.iter().any(|r| r.page_id == id)
    }

    /// Number of queued requests.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns whether a builder thread is constructing `id` right now.
    pub fn is_loading(&self, id: &str) -> bool {
        matches!(self.builds.lock().get(id), Some(BuildState::Running))
    }

    /// Number of in-flight constructions.
    pub fn loading_count(&self) -> usize {
        self.builds
            .lock()
            .values()
            .filter(|state| matches!(state, BuildState::Running))
            .count()
    }

    /// Returns whether a successful build of `id` sits undrained, waiting
    /// for the owning thread to apply it.
    pub fn is_ready(&self, id: &str) -> bool {
        matches!(
            self.builds.lock().get(id),
            Some(BuildState::Done { ok: true })
        )
    }

    /// Registers a one-shot callback for the next completion of `id`.
    pub fn add_callback<F>(&mut self, id: &str, callback: F)
    where
        F: FnOnce(&str, bool) + Send + 'static,
    {
        self.callbacks
            .entry(id.to_owned())
            .or_default()
            .push(Box::new(callback));
    }

    /// Starts a builder thread for `id`.
    ///
    /// Returns `Ok(false)` without spawning when a construction for the id
    /// is already in flight or its result is already waiting to be drained.
    pub fn spawn_load(&mut self, id: &str, factory: Arc<dyn PageFactory>) -> Result<bool> {
        {
            let mut builds = self.builds.lock();
            if builds.contains_key(id) {
                return Ok(false);
            }
            builds.insert(id.to_owned(), BuildState::Running);
        }
        let builds = Arc::clone(&self.builds);
        let tx = self.tx.clone();
        let generation = self.generation;
        let page_id = id.to_owned();
        let spawned = thread::Builder::new()
            .name(format!("vitrine-load-{page_id}"))
            .spawn(move || {
                let started = Instant::now();
                let outcome = build_page(&page_id, factory.as_ref());
                let elapsed = started.elapsed();
                let ok = outcome.is_ok();
                // Send and table update share one lock hold: whoever sees
                // the build leave `Running` can already receive the result.
                let mut builds = builds.lock();
                let _ = tx.send(RawCompletion {
                    page_id: page_id.clone(),
                    generation,
                    elapsed,
                    outcome,
                });
                builds.insert(page_id, BuildState::Done { ok });
            });
        match spawned {
            Ok(_) => Ok(true),
            Err(err) => {
                self.builds.lock().remove(id);
                Err(VitrineError::construction(id, err))
            }
        }
    }

    /// Constructs a page synchronously, claiming an in-flight background
    /// build for the same id instead of constructing twice.
    ///
    /// Returns the outcome together with the construction time. Callbacks
    /// registered for the id fire before this returns.
    pub fn load_blocking(
        &mut self,
        id: &str,
        factory: Arc<dyn PageFactory>,
    ) -> (Result<Box<dyn Page>>, Duration) {
        if let Some(completion) = self.claim_in_flight(id) {
            let elapsed = completion.elapsed;
            if let Some(completion) = self.finish(completion) {
                return (completion.outcome, elapsed);
            }
        }
        let started = Instant::now();
        let outcome = build_page(id, factory.as_ref());
        let elapsed = started.elapsed();
        self.fire_callbacks(id, outcome.is_ok());
        (outcome, elapsed)
    }

    /// Pumps the completion channel, firing callbacks for every fresh
    /// result and returning the batch for the caller to integrate.
    ///
    /// Stale results are destroyed here and never returned.
    pub fn drain_completions(&mut self) -> Vec<LoadCompletion> {
        self.stash_ready();
        let raw: Vec<RawCompletion> = self.pending.drain(..).collect();
        raw.into_iter()
            .filter_map(|completion| self.finish(completion))
            .collect()
    }

    /// Invalidates every outstanding load and queued request.
    ///
    /// The queue, the callback table, and any undrained results are
    /// discarded; builder threads already running finish on their own and
    /// their results are destroyed when drained.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.queue.clear();
        self.callbacks.clear();
        self.stash_ready();
        let stale: Vec<RawCompletion> = self.pending.drain(..).collect();
        for completion in stale {
            self.builds.lock().remove(&completion.page_id);
            discard(completion);
        }
    }

    /// Moves everything waiting on the channel into the pending stash.
    fn stash_ready(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(completion) => self.pending.push(completion),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Waits for an in-flight build of `id` to land, stashing completions
    /// for other ids. Returns `None` when nothing for `id` is in flight.
    fn claim_in_flight(&mut self, id: &str) -> Option<RawCompletion> {
        self.stash_ready();
        if let Some(pos) = self.pending.iter().position(|c| c.page_id == id) {
            return Some(self.pending.remove(pos));
        }
        if !self.builds.lock().contains_key(id) {
            return None;
        }
        // The builder always sends exactly one completion, so this loop
        // terminates.
        loop {
            match self.rx.recv() {
                Ok(completion) if completion.page_id == id => return Some(completion),
                Ok(completion) => self.pending.push(completion),
                Err(_) => return None,
            }
        }
    }

    /// Applies freshness and callback handling to one raw completion.
    fn finish(&mut self, completion: RawCompletion) -> Option<LoadCompletion> {
        self.builds.lock().remove(&completion.page_id);
        if completion.generation != self.generation {
            debug!(page_id = %completion.page_id, "loader.completion.stale");
            discard(completion);
            return None;
        }
        match &completion.outcome {
            Ok(_) => debug!(
                page_id = %completion.page_id,
                elapsed_ms = completion.elapsed.as_millis() as u64,
                "loader.load.completed"
            ),
            Err(err) => warn!(
                page_id = %completion.page_id,
                error = %err,
                "loader.load.failed"
            ),
        }
        self.fire_callbacks(&completion.page_id, completion.outcome.is_ok());
        Some(LoadCompletion {
            page_id: completion.page_id,
            elapsed: completion.elapsed,
            outcome: completion.outcome,
        })
    }

    fn fire_callbacks(&mut self, id: &str, success: bool) {
        if let Some(callbacks) = self.callbacks.remove(id) {
            for callback in callbacks {
                callback(id, success);
            }
        }
    }
}

fn build_page(id: &str, factory: &dyn PageFactory) -> Result<Box<dyn Page>> {
    match panic::catch_unwind(AssertUnwindSafe(|| factory.create())) {
        Ok(outcome) => outcome,
        Err(payload) => Err(VitrineError::construction(
            id,
            format!("factory panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

fn discard(completion: RawCompletion) {
    if let Ok(mut page) = completion.outcome {
        page.destroy();
    }
}
