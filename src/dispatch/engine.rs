//! The engine-context bridge: pending-command queue and tick loop.
//!
//! Hosts like a 3D content tool run a single non-reentrant main loop that is
//! the only place their state may be touched. Connection-handler threads
//! never call into host state directly; they enqueue a [`PendingCommand`]
//! and the engine context drains the queue on its own scheduling tick. The
//! drain is a non-blocking poll so the host's event loop is never starved
//! waiting for bridge work.
//!
//! Embedded hosts call [`EngineQueue::drain`] from their own timer.
//! Standalone hosts and tests use [`EngineLoop`], which owns a dedicated
//! tick thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::CommandError;
use crate::protocol::CommandParams;

use super::{run_handler, Handler};

/// Default interval between engine queue drains.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// A command waiting to be executed on the engine context.
pub struct PendingCommand {
    pub(crate) method: String,
    pub(crate) handler: Handler,
    pub(crate) params: CommandParams,
    /// Completion signal back to the blocked caller; capacity 1, signaled
    /// exactly once.
    pub(crate) completion: SyncSender<Result<Value, CommandError>>,
    /// Set by the caller on timeout; a cancelled command is dropped by the
    /// drain, never executed.
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) enqueued_at: Instant,
}

/// Single-consumer work queue drained by the engine context.
#[derive(Default)]
pub struct EngineQueue {
    queue: Mutex<VecDeque<PendingCommand>>,
    engine_thread: Mutex<Option<ThreadId>>,
}

impl EngineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the calling thread as the engine context. Dispatch from this
    /// thread will run handlers inline instead of queueing.
    pub fn bind_current_thread(&self) {
        let mut bound = self.engine_thread.lock().expect("engine binding poisoned");
        *bound = Some(thread::current().id());
    }

    /// True when the calling thread is the bound engine context.
    pub fn is_engine_thread(&self) -> bool {
        let bound = self.engine_thread.lock().expect("engine binding poisoned");
        *bound == Some(thread::current().id())
    }

    pub(crate) fn enqueue(&self, command: PendingCommand) {
        let mut queue = self.queue.lock().expect("engine queue poisoned");
        queue.push_back(command);
    }

    /// Number of commands currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("engine queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the queue from the engine context.
    ///
    /// Takes everything queued at entry in FIFO order, drops commands whose
    /// caller already timed out, runs the rest, and signals each completion
    /// channel once. Handlers run with the queue lock released so a slow
    /// command never blocks enqueueing threads. Returns the number of
    /// commands executed.
    pub fn drain(&self) -> usize {
        let batch: VecDeque<PendingCommand> = {
            let mut queue = self.queue.lock().expect("engine queue poisoned");
            std::mem::take(&mut *queue)
        };

        let mut executed = 0;
        for command in batch {
            if command.cancelled.load(Ordering::SeqCst) {
                tracing::debug!(
                    method = %command.method,
                    queued_for = ?command.enqueued_at.elapsed(),
                    "dropping cancelled command"
                );
                continue;
            }
            tracing::debug!(
                method = %command.method,
                queued_for = ?command.enqueued_at.elapsed(),
                "executing queued command on engine context"
            );
            let result = run_handler(&command.handler, command.params);
            executed += 1;
            // The caller may have timed out between the cancellation check
            // and now; a dead receiver is not an error.
            let _ = command.completion.send(result);
        }
        executed
    }
}

/// Owned tick thread for standalone hosts.
///
/// Binds the queue to a dedicated thread and drains it every
/// `tick_interval` until [`EngineLoop::shutdown`] is called. Shutdown
/// performs one final drain so commands enqueued just before the flag flip
/// are still answered.
pub struct EngineLoop {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EngineLoop {
    /// Spawn the engine thread.
    pub fn spawn(queue: Arc<EngineQueue>, tick_interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("engine-tick".to_string())
            .spawn(move || {
                queue.bind_current_thread();
                tracing::debug!(tick = ?tick_interval, "engine tick loop started");
                while !shutdown_flag.load(Ordering::SeqCst) {
                    queue.drain();
                    thread::sleep(tick_interval);
                }
                let remaining = queue.drain();
                tracing::debug!(executed = remaining, "engine tick loop stopped");
            })
            .expect("failed to spawn engine thread");
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the tick thread and join it.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineLoop {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
