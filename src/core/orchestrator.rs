//! # ShutdownOrchestrator: starts one shutdown sequence and hands out its handle.
//!
//! ## Architecture
//! ```text
//! ShutdownOrchestrator::start(ctx, collaborators, request)
//!   ├─ claim the shutdown slot
//!   ├─ allocate a port, watch LAUNCHED | QUIT
//!   ├─ snapshot the registry ─► TrackedLists (Arc<Mutex<_>>)
//!   ├─ spawn translator: port ─► roster notification ─► lists + InternalEvent
//!   └─ spawn worker:     Worker::run() ─► cleanup ─► publish ShutdownOutcome
//!
//! ShutdownHandle ── cancel / decline / kill / reboot ──► InternalEvent queue
//!                ◄── wait() ── watch<Option<ShutdownOutcome>>
//! ```
//!
//! ## Rules
//! - The translator only files, unfiles and forwards; the worker alone decides.
//! - On exit the sequence unsubscribes, stops the translator and releases the
//!   slot before its outcome becomes visible.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::delivery::Messenger;
use crate::error::ShutdownError;
use crate::protocol::{FIELD_TEAM, Message, MessageCode, ShutdownRequest};
use crate::roster::{Platform, ProcessId, ProcessRegistry, StatusSurface};
use crate::subscribers::panic_message;
use crate::watching::{EventMask, Watcher};

use super::context::RegistrarContext;
use super::internal::{InternalEvent, InternalEventKind};
use super::lists::TrackedLists;
use super::outcome::ShutdownOutcome;
use super::phase::ShutdownPhase;
use super::worker::{Worker, lock_lists};

/// External parties a sequence consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ProcessRegistry>,
    pub platform: Arc<dyn Platform>,
    pub status: Arc<dyn StatusSurface>,
}

/// Entry point for shutdown sequences.
pub struct ShutdownOrchestrator;

impl ShutdownOrchestrator {
    /// Starts a shutdown sequence in the background.
    ///
    /// # Errors
    /// - [`ShutdownError::AlreadyInProgress`] while another sequence runs;
    /// - [`ShutdownError::Init`] outside a runtime, after the context stopped,
    ///   or when the roster subscription is refused;
    /// - [`ShutdownError::Registry`] when no snapshot can be taken.
    pub fn start(
        ctx: &Arc<RegistrarContext>,
        collab: Collaborators,
        request: ShutdownRequest,
    ) -> Result<ShutdownHandle, ShutdownError> {
        let runtime = Handle::try_current().map_err(|e| ShutdownError::Init {
            what: "worker",
            reason: e.to_string(),
        })?;
        if !ctx.scheduler().is_running() {
            return Err(ShutdownError::Init {
                what: "scheduler",
                reason: "scheduler stopped".into(),
            });
        }
        let claim = ctx
            .claim_shutdown()
            .ok_or(ShutdownError::AlreadyInProgress)?;

        let (port, port_rx) = ctx.allocate_port();
        let team = ctx.config().self_process.unwrap_or(ProcessId(0));
        let messenger = Messenger::new(team, Arc::new(port));
        let port_id = messenger.port_id();
        if !ctx
            .watching()
            .add_watcher(Watcher::new(messenger, EventMask::LAUNCHED | EventMask::QUIT))
        {
            return Err(ShutdownError::Init {
                what: "notification subscription",
                reason: format!("port {port_id} already watching"),
            });
        }

        // Launches racing the snapshot are caught by the watcher; the lists
        // absorb the duplicates.
        let snapshot = match collab.registry.shutdown_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                ctx.watching().remove_watcher(port_id);
                return Err(err.into());
            }
        };
        let lists = Arc::new(Mutex::new(TrackedLists::from_snapshot(
            snapshot,
            ctx.config().self_process,
        )));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let token = ctx.token().child_token();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        runtime.spawn(translate_notifications(
            port_rx,
            Arc::clone(&lists),
            Arc::clone(&collab.registry),
            events_tx.clone(),
            token.clone(),
        ));

        let worker = Worker::new(
            Arc::clone(ctx),
            collab,
            request,
            Arc::clone(&lists),
            events_rx,
            events_tx.clone(),
            token.clone(),
        );
        let cleanup_ctx = Arc::clone(ctx);
        let cleanup_token = token.clone();
        runtime.spawn(async move {
            let outcome = match std::panic::AssertUnwindSafe(worker.run()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    tracing::error!(info = %panic_message(&*panic), "shutdown worker panicked");
                    ShutdownOutcome::Stopped
                }
            };
            cleanup_ctx.watching().remove_watcher(port_id);
            cleanup_token.cancel();
            drop(claim);
            tracing::info!(?outcome, "shutdown sequence finished");
            outcome_tx.send_replace(Some(outcome));
        });

        Ok(ShutdownHandle {
            events: events_tx,
            lists,
            token,
            outcome: outcome_rx,
        })
    }
}

/// Turns roster notifications into list updates and worker events.
async fn translate_notifications(
    mut rx: mpsc::Receiver<Arc<Message>>,
    lists: Arc<Mutex<TrackedLists>>,
    registry: Arc<dyn ProcessRegistry>,
    events: mpsc::UnboundedSender<InternalEvent>,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            m = rx.recv() => match m {
                Some(m) => m,
                None => break,
            },
        };
        let Some(team) = message.find_i32(FIELD_TEAM) else {
            tracing::debug!(what = ?message.what(), "notification without team");
            continue;
        };
        let pid = ProcessId(team);

        match message.what() {
            MessageCode::SomeAppQuit => {
                let phase = {
                    let mut lists = lock_lists(&lists);
                    lists.remove(pid);
                    lists.phase
                };
                let _ = events.send(
                    InternalEvent::new(InternalEventKind::ProcessQuit, phase).with_process(pid),
                );
            }
            MessageCode::SomeAppLaunched => {
                let Some(record) = registry.record_for(pid) else {
                    continue;
                };
                let category = record.category;
                let adopted = {
                    let mut lists = lock_lists(&lists);
                    lists.adopt(record).then_some(lists.phase)
                };
                if let Some(phase) = adopted {
                    tracing::debug!(pid = team, category = category.as_str(), "adopted late launch");
                    let _ = events.send(
                        InternalEvent::new(InternalEventKind::ProcessLaunched, phase).with_process(pid),
                    );
                }
            }
            _ => {}
        }
    }
}

/// Control surface of a running sequence. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownHandle {
    events: mpsc::UnboundedSender<InternalEvent>,
    lists: Arc<Mutex<TrackedLists>>,
    token: CancellationToken,
    outcome: watch::Receiver<Option<ShutdownOutcome>>,
}

impl ShutdownHandle {
    pub(crate) fn push(&self, ev: InternalEvent) {
        if self.events.send(ev).is_err() {
            tracing::debug!(kind = ?ev.kind, "shutdown sequence already finished");
        }
    }

    fn request(&self, kind: InternalEventKind, process: Option<ProcessId>) {
        let mut ev = InternalEvent::new(kind, self.phase());
        ev.process = process;
        self.push(ev);
    }

    /// The user pressed cancel. Also acknowledges the abort notice.
    pub fn cancel(&self) {
        self.request(InternalEventKind::Abort, None);
    }

    /// `process` refused to quit.
    pub fn decline(&self, process: ProcessId) {
        self.request(InternalEventKind::Abort, Some(process));
    }

    /// The user asked to kill the blocked `process`.
    pub fn kill(&self, process: ProcessId) {
        self.request(InternalEventKind::KillRequest, Some(process));
    }

    /// Retries the power request from the safe halt state.
    pub fn reboot(&self) {
        self.request(InternalEventKind::Reboot, None);
    }

    /// Some process entered or left a debugger.
    pub fn debug_state_changed(&self) {
        self.request(InternalEventKind::DebugStateChanged, None);
    }

    /// Phase the sequence is in.
    pub fn phase(&self) -> ShutdownPhase {
        lock_lists(&self.lists).phase
    }

    /// Applications still waiting to be asked or to quit.
    pub fn tracked(&self) -> usize {
        lock_lists(&self.lists).tracked()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Stops the sequence without powering off.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Waits for the sequence to end.
    pub async fn wait(&self) -> ShutdownOutcome {
        let mut rx = self.outcome.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(ShutdownOutcome::Stopped),
            Err(_) => ShutdownOutcome::Stopped,
        }
    }
}
