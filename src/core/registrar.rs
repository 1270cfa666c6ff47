//! # Registrar: request dispatcher in front of the registry and the shutdown core.
//!
//! Registration changes are forwarded to the [`ProcessRegistry`] and followed
//! by watcher notifications. A shutdown request starts a sequence in the single
//! orchestrator slot; synchronous requests are answered once it has ended.
//!
//! [`ProcessRegistry`]: crate::roster::ProcessRegistry

use std::sync::{Arc, Mutex};

use crate::protocol::{ErrorCode, FIELD_ACTIVE, Message, MessageCode, Reply, Request, ShutdownRequest};
use crate::roster::{ProcessId, ProcessRecord, RegistrationChange, RosterEvent};
use crate::watching::Watcher;

use super::context::RegistrarContext;
use super::orchestrator::{Collaborators, ShutdownHandle, ShutdownOrchestrator};
use super::outcome::ShutdownOutcome;

pub struct Registrar {
    ctx: Arc<RegistrarContext>,
    collab: Collaborators,
    active: Mutex<Option<ShutdownHandle>>,
}

impl Registrar {
    pub fn new(ctx: Arc<RegistrarContext>, collab: Collaborators) -> Self {
        Self {
            ctx,
            collab,
            active: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<RegistrarContext> {
        &self.ctx
    }

    /// Handle of the most recent shutdown sequence, finished or not.
    pub fn active_shutdown(&self) -> Option<ShutdownHandle> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ShutdownHandle>> {
        self.active.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("shutdown slot lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Answers one request.
    pub async fn handle(&self, request: Request) -> Reply {
        let code = request.code();
        let reply = match request {
            Request::AddApp(record) => self.register(RegistrationChange::Add(record)),
            Request::CompleteRegistration { process } => {
                self.register(RegistrationChange::Complete(process))
            }
            Request::RemoveApp { process } => self.register(RegistrationChange::Remove(process)),
            Request::ActivateApp { process } => self.register(RegistrationChange::Activate(process)),
            Request::Broadcast { message, sender } => self.broadcast(message, sender),
            Request::StartWatching { target, events } => {
                if self.ctx.watching().add_watcher(Watcher::new(target, events)) {
                    Reply::Success
                } else {
                    Reply::Error(ErrorCode::BadValue)
                }
            }
            Request::StopWatching { port } => {
                if self.ctx.watching().remove_watcher(port) {
                    Reply::Success
                } else {
                    Reply::Error(ErrorCode::BadValue)
                }
            }
            Request::ShutDown(flags) => self.shut_down(flags).await,
        };
        tracing::debug!(?code, ?reply, "request handled");
        reply
    }

    fn register(&self, change: RegistrationChange) -> Reply {
        let notify: Option<fn(ProcessRecord) -> RosterEvent> = match &change {
            RegistrationChange::Add(_) => None,
            RegistrationChange::Complete(_) => Some(RosterEvent::Launched),
            RegistrationChange::Remove(_) => Some(RosterEvent::Quit),
            RegistrationChange::Activate(_) => Some(RosterEvent::Activated),
        };
        let activated = matches!(change, RegistrationChange::Activate(_));

        let record = match self.collab.registry.apply(change) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(error = %err, label = err.as_label(), "registration refused");
                return Reply::Error(ErrorCode::from(&err));
            }
        };

        if let (Some(event), Some(record)) = (notify, record) {
            if activated {
                let message = Message::new(MessageCode::AppActivated).with_bool(FIELD_ACTIVE, true);
                if let Err(err) = self.ctx.deliverer().deliver_message(
                    message,
                    record.messenger.clone(),
                    self.ctx.config().message_timeout(),
                ) {
                    tracing::debug!(process = record.process.0, error = %err, "activation not delivered");
                }
            }
            self.ctx.notify_watchers(&event(record));
        }
        Reply::Success
    }

    fn broadcast(&self, message: Message, sender: Option<ProcessId>) -> Reply {
        let targets: Vec<_> = self
            .collab
            .registry
            .registered()
            .into_iter()
            .filter(|r| Some(r.process) != sender)
            .map(|r| r.messenger)
            .collect();
        if targets.is_empty() {
            return Reply::Success;
        }
        // The requester is answered before delivery; failures are only logged.
        if let Err(err) =
            self.ctx
                .deliverer()
                .deliver_message(message, targets, self.ctx.config().message_timeout())
        {
            tracing::debug!(error = %err, "broadcast failed");
        }
        Reply::Success
    }

    async fn shut_down(&self, flags: ShutdownRequest) -> Reply {
        let handle = {
            let mut slot = self.slot();
            if slot.as_ref().is_some_and(|h| !h.is_finished()) {
                return Reply::Error(ErrorCode::ShutdownInProgress);
            }
            match ShutdownOrchestrator::start(&self.ctx, self.collab.clone(), flags) {
                Ok(handle) => {
                    *slot = Some(handle.clone());
                    handle
                }
                Err(err) => {
                    tracing::warn!(error = %err, label = err.as_label(), "shutdown not started");
                    return Reply::Error(ErrorCode::from(&err));
                }
            }
        };

        if !flags.synchronous {
            return Reply::Success;
        }
        match handle.wait().await {
            ShutdownOutcome::Completed { .. } => Reply::Success,
            ShutdownOutcome::Cancelled(_) => Reply::Error(ErrorCode::ShutdownCancelled),
            ShutdownOutcome::Halted | ShutdownOutcome::Stopped => {
                Reply::Error(ErrorCode::ShutdownFailed)
            }
        }
    }
}
