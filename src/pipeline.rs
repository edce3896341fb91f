//! Batch loop that drives pending messages through
//! limiter -> classifier -> router -> move.

use log::{debug, error, info, warn};
use std::collections::HashSet;

use crate::classify::Classifier;
use crate::error::PipelineError;
use crate::limiter::{Clock, RateLimiter, SystemClock};
use crate::mail::{MailStore, Message, MessageId};
use crate::router::CategoryRouter;

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// What to do when classifying or moving a single message fails.
/// Listing and fetch failures abort the run under either policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Abort,
    /// Log, count in [`RunStats::failed`], go on with the next message.
    Skip,
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub batch_size: usize,
    /// Classify and route but never issue a move.
    pub dry_run: bool,
    pub on_error: FailurePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            on_error: FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Messages classified (or attempted).
    pub considered: usize,
    /// Messages moved, or that would have been in a dry run.
    pub moved: usize,
    /// Messages routed to the inbox and left untouched.
    pub left: usize,
    /// Messages skipped after an error under [`FailurePolicy::Skip`].
    pub failed: usize,
    /// Pending identifiers the store no longer returned.
    pub missing: usize,
    pub batches: usize,
}

enum Outcome {
    Moved,
    Left,
}

pub struct Pipeline<C, K = SystemClock> {
    classifier: C,
    router: CategoryRouter,
    limiter: RateLimiter<K>,
    options: RunOptions,
}

impl<C: Classifier, K: Clock> Pipeline<C, K> {
    pub fn new(
        classifier: C,
        router: CategoryRouter,
        limiter: RateLimiter<K>,
        options: RunOptions,
    ) -> Self {
        Self {
            classifier,
            router,
            limiter,
            options,
        }
    }

    pub fn limiter(&self) -> &RateLimiter<K> {
        &self.limiter
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Processes every message pending in the inbox once.
    ///
    /// The pending set is snapshotted up front and split into batches of
    /// `batch_size`; each batch fetches only its own identifiers. Moves already
    /// made stay in place when a later step fails.
    pub fn run<S: MailStore>(&mut self, store: &mut S) -> Result<RunStats, PipelineError> {
        log_folders(store);

        let inbox = self.router.inbox().to_string();
        let pending = store.list_pending(&inbox)?;
        let mut stats = RunStats::default();

        if pending.is_empty() {
            info!("No new emails in {inbox}");
            return Ok(stats);
        }

        let batch_size = self.options.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        info!(
            "{} pending message(s) in {inbox}, {total_batches} batch(es) of up to {batch_size}, {:?} between requests",
            pending.len(),
            self.limiter.interval()
        );

        let mut seen: HashSet<MessageId> = HashSet::with_capacity(pending.len());

        for (n, batch) in pending.chunks(batch_size).enumerate() {
            info!("Batch {}/{total_batches}: fetching {} message(s)", n + 1, batch.len());
            let messages = store.fetch_batch(batch)?;
            stats.batches += 1;

            let mut returned = 0;
            for msg in messages {
                if !batch.contains(&msg.id) || !seen.insert(msg.id) {
                    warn!("Ignoring unexpected or repeated message {} from fetch", msg.id);
                    continue;
                }
                returned += 1;
                stats.considered += 1;

                match self.process(store, &msg) {
                    Ok(Outcome::Moved) => stats.moved += 1,
                    Ok(Outcome::Left) => stats.left += 1,
                    Err(e) if self.options.on_error == FailurePolicy::Skip => {
                        warn!("Skipping message {}: {}", msg.id, error_chain(&e));
                        stats.failed += 1;
                    }
                    Err(e) => {
                        error!(
                            "Stopping run at message {}; {} moved, {} left so far",
                            msg.id, stats.moved, stats.left
                        );
                        return Err(e);
                    }
                }
            }

            if returned < batch.len() {
                debug!("{} message(s) of batch {} no longer exist", batch.len() - returned, n + 1);
                stats.missing += batch.len() - returned;
            }
        }

        info!(
            "All emails processed: {} considered, {} moved, {} left in place, {} failed",
            stats.considered, stats.moved, stats.left, stats.failed
        );
        Ok(stats)
    }

    fn process<S: MailStore>(&mut self, store: &mut S, msg: &Message) -> Result<Outcome, PipelineError> {
        self.limiter.wait();

        let senders = msg.joined_senders();
        info!("Classifying email {}: subject={:?} senders={}", msg.id, msg.subject, senders);

        let result = self
            .classifier
            .classify(&msg.subject, &senders, &msg.body)
            .map_err(|source| PipelineError::Classify { id: msg.id, source })?;

        if let Some(raw) = &result.raw {
            debug!("Classifier response for {}: {raw}", msg.id);
        }
        info!("Email {} classified as {:?}", msg.id, result.label.trim());

        let folder = self.router.route(&result.label);
        if self.router.is_inbox(folder) {
            info!("Email {} not moved, stays in {folder}", msg.id);
            return Ok(Outcome::Left);
        }

        if self.options.dry_run {
            info!("Dry run: email {} would move to {folder}", msg.id);
            return Ok(Outcome::Moved);
        }

        store
            .move_message(msg.id, folder)
            .map_err(|source| PipelineError::Move {
                id: msg.id,
                folder: folder.to_string(),
                source,
            })?;
        info!("Email {} moved to {folder}", msg.id);
        Ok(Outcome::Moved)
    }
}

fn log_folders<S: MailStore>(store: &mut S) {
    match store.list_folders() {
        Ok(folders) => {
            for folder in folders {
                info!("Folder: {folder}");
            }
        }
        Err(e) => warn!("Could not list folders: {e}"),
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(inner) = cur {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        cur = inner.source();
    }
    out
}
