//! The dedicated cleanup thread.
//!
//! A single background thread drains [`DeferredCallback`]s queued by
//! [`super::context::Context::rcu_call`]. It batches whatever is pending,
//! waits out one grace period, then runs them. [`barrier`] drains the queue
//! synchronously by pushing a sentinel down the same FIFO channel and
//! waiting for the cleanup thread to acknowledge it — since the channel is
//! FIFO, by the time the sentinel is processed every callback queued before
//! it has already run.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::OnceLock;
use std::thread::JoinHandle;

use crate::rcu::callback::DeferredCallback;
use crate::rcu::context::{Context, RcuContext};

enum Command {
    Execute(DeferredCallback),
    Barrier(Sender<()>),
    Shutdown,
}

struct Cleaner {
    commands: Receiver<Command>,
}

impl Cleaner {
    fn start(commands: Receiver<Command>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("registry-rcu-cleanup".to_string())
            .spawn(move || Self { commands }.run())
            .expect("failed to spawn RCU cleanup thread")
    }

    fn run(self) {
        let mut context = Context::rcu_register().expect("cleanup thread registers exactly once");
        crate::safety::mark_callback_thread();
        let mut pending = Vec::new();

        loop {
            match self.commands.recv() {
                Ok(Command::Execute(callback)) => pending.push(callback),
                Ok(Command::Barrier(ack)) => {
                    self.drain(&mut context, &mut pending);
                    if ack.send(()).is_err() {
                        log::warn!("barrier caller disappeared before acknowledgement");
                    }
                }
                Ok(Command::Shutdown) | Err(_) => {
                    self.drain(&mut context, &mut pending);
                    log::info!("shutting down RCU cleanup thread");
                    break;
                }
            }
        }
    }

    /// Runs every pending callback, then keeps going as long as running
    /// those callbacks synchronously queued more (a TSM's own free-callback
    /// recursively tears down its own sub-map before returning, which
    /// queues its children's frees on this same channel) — bounded by
    /// containment depth, not unbounded chaining. This is what lets a
    /// single `barrier()` call observe a fully quiescent queue rather than
    /// acking while nested reclamation is still outstanding (SPEC_FULL §9
    /// Open Question; see DESIGN.md).
    fn drain(&self, context: &mut Context, pending: &mut Vec<DeferredCallback>) {
        loop {
            if pending.is_empty() {
                return;
            }

            context.rcu_synchronize();

            crate::safety::enter_callback();
            for callback in pending.drain(..) {
                callback.run();
            }
            crate::safety::exit_callback();

            // Absorb whatever those callbacks queued synchronously before
            // reporting this drain complete. FIFO ordering means any
            // `Barrier` waiting behind freshly-queued `Execute`s has
            // nothing left undrained ahead of it once we reach it here.
            while let Ok(cmd) = self.commands.try_recv() {
                match cmd {
                    Command::Execute(callback) => pending.push(callback),
                    Command::Barrier(ack) => {
                        if ack.send(()).is_err() {
                            log::warn!("barrier caller disappeared before acknowledgement");
                        }
                    }
                    Command::Shutdown => {
                        log::info!("shutting down RCU cleanup thread");
                    }
                }
            }
        }
    }
}

struct CleanupThread {
    _thread: JoinHandle<()>,
    commands: Sender<Command>,
}

impl CleanupThread {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            _thread: Cleaner::start(rx),
            commands: tx,
        }
    }
}

static CLEANUP_THREAD: OnceLock<CleanupThread> = OnceLock::new();

fn commands() -> &'static Sender<Command> {
    &CLEANUP_THREAD.get_or_init(CleanupThread::new).commands
}

/// Queues a callback to run once the current grace period ends.
pub(crate) fn cleanup_send(callback: DeferredCallback) {
    if commands().send(Command::Execute(callback)).is_err() {
        log::error!("failed to queue RCU cleanup callback: cleanup thread is gone");
    }
}

/// Blocks until every callback queued before this call has run.
///
/// Must not be called from within a read-section or from within a deferred
/// callback itself (SPEC_FULL §4.A, §5).
pub fn barrier() {
    crate::safety::assert_not_in_read_section("rcu_barrier");
    crate::safety::assert_not_in_callback("rcu_barrier");

    let (tx, rx) = mpsc::channel();

    if commands().send(Command::Barrier(tx)).is_err() {
        log::error!("failed to send RCU barrier: cleanup thread is gone");
        return;
    }

    if rx.recv().is_err() {
        log::error!("RCU barrier acknowledgement lost");
    }
}
