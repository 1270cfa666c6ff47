//! # Shutdown worker: the only task that advances a sequence.
//!
//! ## Architecture
//! ```text
//! run()
//!  └─► shut_down()
//!        confirm? ─► sync filesystems
//!        UserApps        quit_apps(User)        ─► wait_for_debugged()
//!        SystemApps      quit_apps(System)      ─► wait_for_debugged()   (cancel disabled, registry refuses launches)
//!        BackgroundApps  quit_background_apps() ─► wait_for_debugged()
//!        OtherProcesses  kill_other_processes()
//!        Done            power_off()  ─► forced reboot ─► safe halt
//!  └─► Err(Interrupt::Aborted(cause)) ─► abort(cause) ─► Cancelled(cause)
//!
//! wait_for_app(record):
//!   ProcessQuit ─► Quit
//!   Timeout     ─► quit_blocking_app(): debugged ─► defer | modal ─► offer kill | else ─► kill
//!   Abort       ─► UserApps: Interrupt::Aborted | SystemApps: Declined
//!
//! quit_background_apps():
//!   broadcast quit ─► one timeout ─► kill survivors
//!   ProcessLaunched ─► quit request to the late application
//! ```
//!
//! ## Rules
//! - Every wait goes through [`Worker::next_event`], which drops stale timeouts
//!   and observes the stop token.
//! - One timeout event is reused for the whole sequence; it is re-armed with
//!   `reschedule` and reclaimed when the worker is dropped.
//! - A forced kill always removes the record, whether or not the kill call succeeded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventKind};
use crate::protocol::{ShutdownRequest, quit_request};
use crate::roster::{Category, ProcessId, ProcessRecord, Signal};
use crate::timer::{Disposition, EventId, ScheduledEvent};

use super::context::RegistrarContext;
use super::internal::{InternalEvent, InternalEventKind};
use super::lists::{TrackedLists, kill_candidates};
use super::orchestrator::Collaborators;
use super::outcome::{AbortCause, KillReason, ShutdownOutcome};
use super::phase::ShutdownPhase;

/// Why a wait was cut short.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Aborted(AbortCause),
    Stopped,
}

/// How waiting for one application ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Quit,
    Killed,
    /// It refused outside the user phase and is left alone.
    Declined,
    /// It sits in a debugger; the end of the phase waits for it.
    Debugged,
}

/// Locks the shared lists, recovering from poisoning.
pub(crate) fn lock_lists(lists: &Mutex<TrackedLists>) -> MutexGuard<'_, TrackedLists> {
    lists.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("tracked lists lock poisoned, recovering");
        poisoned.into_inner()
    })
}

type TimeoutTarget = Arc<Mutex<(ShutdownPhase, Option<ProcessId>)>>;

pub(crate) struct Worker {
    ctx: Arc<RegistrarContext>,
    collab: Collaborators,
    request: ShutdownRequest,
    lists: Arc<Mutex<TrackedLists>>,
    events: mpsc::UnboundedReceiver<InternalEvent>,
    sender: mpsc::UnboundedSender<InternalEvent>,
    token: CancellationToken,
    phase: ShutdownPhase,
    timeout: Option<EventId>,
    timeout_target: TimeoutTarget,
    debugged: HashSet<ProcessId>,
}

impl Worker {
    pub(crate) fn new(
        ctx: Arc<RegistrarContext>,
        collab: Collaborators,
        request: ShutdownRequest,
        lists: Arc<Mutex<TrackedLists>>,
        events: mpsc::UnboundedReceiver<InternalEvent>,
        sender: mpsc::UnboundedSender<InternalEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            collab,
            request,
            lists,
            events,
            sender,
            token,
            phase: ShutdownPhase::UserApps,
            timeout: None,
            timeout_target: Arc::new(Mutex::new((ShutdownPhase::UserApps, None))),
            debugged: HashSet::new(),
        }
    }

    pub(crate) async fn run(mut self) -> ShutdownOutcome {
        let mode = if self.request.reboot { "reboot" } else { "power_off" };
        self.publish(Event::new(EventKind::ShutdownRequested).with_reason(mode));

        match self.shut_down().await {
            Ok(outcome) => outcome,
            Err(Interrupt::Aborted(cause)) => self.abort(cause).await,
            Err(Interrupt::Stopped) => {
                self.collab.registry.set_shutting_down(false);
                ShutdownOutcome::Stopped
            }
        }
    }

    async fn shut_down(&mut self) -> Result<ShutdownOutcome, Interrupt> {
        let status = Arc::clone(&self.collab.status);

        if self.request.confirm {
            let confirmed = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Interrupt::Stopped),
                ok = status.confirm(self.request.reboot) => ok,
            };
            if !confirmed {
                self.publish(
                    Event::new(EventKind::ShutdownAborted)
                        .with_phase(self.phase)
                        .with_reason(AbortCause::User.as_str()),
                );
                return Ok(ShutdownOutcome::Cancelled(AbortCause::User));
            }
        }

        status.set_phase_text("Tidying things up a bit.");
        status.set_wait_animation(true);
        status.set_kill_enabled(false);
        status.set_cancel_enabled(true);
        self.collab.platform.sync_filesystems();

        self.enter_phase(ShutdownPhase::UserApps);
        self.quit_apps(Category::User).await?;
        self.wait_for_debugged().await?;

        status.set_cancel_enabled(false);
        self.collab.registry.set_shutting_down(true);
        self.enter_phase(ShutdownPhase::SystemApps);
        self.quit_apps(Category::System).await?;
        self.wait_for_debugged().await?;

        self.enter_phase(ShutdownPhase::BackgroundApps);
        self.quit_background_apps().await?;
        self.wait_for_debugged().await?;

        self.enter_phase(ShutdownPhase::OtherProcesses);
        self.kill_other_processes().await?;

        self.enter_phase(ShutdownPhase::Done);
        Ok(self.power_off().await)
    }

    fn publish(&self, ev: Event) {
        self.ctx.bus().publish(ev);
    }

    fn enter_phase(&mut self, phase: ShutdownPhase) {
        let tracked = {
            let mut lists = lock_lists(&self.lists);
            lists.phase = phase;
            lists.tracked()
        };
        self.phase = phase;
        tracing::debug!(phase = phase.as_str(), tracked, "entering shutdown phase");
        self.publish(
            Event::new(EventKind::PhaseEntered)
                .with_phase(phase)
                .with_count(tracked),
        );
    }

    /// Next event worth looking at. Stale timeouts are dropped here.
    pub(crate) async fn next_event(&mut self) -> Result<InternalEvent, Interrupt> {
        loop {
            let ev = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Interrupt::Stopped),
                ev = self.events.recv() => ev.ok_or(Interrupt::Stopped)?,
            };
            if ev.is_stale(self.phase) {
                tracing::debug!(origin = ev.phase.as_str(), current = self.phase.as_str(), "dropping stale timeout");
                continue;
            }
            match ev.kind {
                InternalEventKind::ProcessQuit => {
                    if let Some(pid) = ev.process {
                        self.debugged.remove(&pid);
                    }
                }
                InternalEventKind::DebugStateChanged => self.refresh_debugged(),
                _ => {}
            }
            return Ok(ev);
        }
    }

    fn refresh_debugged(&mut self) {
        let platform = &self.collab.platform;
        let registry = &self.collab.registry;
        self.debugged
            .retain(|pid| platform.is_being_debugged(*pid) && registry.is_running(*pid));
    }

    /// Points the reusable timeout at `process` and fires it after `after`.
    fn arm_timeout(&mut self, after: Duration, process: Option<ProcessId>) {
        let due = Instant::now() + after;
        let scheduler = self.ctx.scheduler();

        if let Some(id) = self.timeout {
            scheduler.cancel(id);
            self.set_timeout_target(process);
            if scheduler.reschedule(id, due) {
                return;
            }
            self.timeout = None;
        }
        self.set_timeout_target(process);

        let target = Arc::clone(&self.timeout_target);
        let sender = self.sender.clone();
        let event = ScheduledEvent::new(due, move || {
            let (phase, process) = match target.lock() {
                Ok(t) => *t,
                Err(poisoned) => *poisoned.into_inner(),
            };
            let mut ev = InternalEvent::new(InternalEventKind::Timeout, phase);
            ev.process = process;
            let _ = sender.send(ev);
            Disposition::Keep
        });
        match scheduler.schedule(event) {
            Ok(id) => self.timeout = Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "cannot arm shutdown timeout, timing out now");
                let mut ev = InternalEvent::new(InternalEventKind::Timeout, self.phase);
                ev.process = process;
                let _ = self.sender.send(ev);
            }
        }
    }

    fn set_timeout_target(&self, process: Option<ProcessId>) {
        let mut target = match self.timeout_target.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        *target = (self.phase, process);
    }

    fn disarm_timeout(&self) {
        if let Some(id) = self.timeout {
            self.ctx.scheduler().cancel(id);
        }
    }

    /// Asks every application of `category` to quit, one at a time.
    async fn quit_apps(&mut self, category: Category) -> Result<(), Interrupt> {
        let status = Arc::clone(&self.collab.status);
        let quit_timeout = self.ctx.config().app_quit_timeout;

        loop {
            let Some(record) = lock_lists(&self.lists).first(category) else {
                break;
            };
            let pid = record.process;

            if !self.collab.registry.is_running(pid) {
                tracing::debug!(pid = pid.0, "dropping stale record");
                lock_lists(&self.lists).remove(pid);
                continue;
            }

            status.set_current_process(Some(pid));
            status.set_phase_text(&format!("Asking \"{}\" to quit.", record.name));

            let message = quit_request(self.request.reboot);
            if let Err(err) =
                self.ctx
                    .deliverer()
                    .deliver_message(message, record.messenger.clone(), Some(quit_timeout))
            {
                tracing::debug!(pid = pid.0, error = %err, "application unreachable, treating as quit");
                lock_lists(&self.lists).remove(pid);
                continue;
            }
            self.publish_quit_requested(&record);

            let outcome = self.wait_for_app(&record).await;
            lock_lists(&self.lists).remove(pid);
            let outcome = outcome?;
            tracing::debug!(pid = pid.0, ?outcome, "application handled");
        }

        status.set_current_process(None);
        Ok(())
    }

    async fn wait_for_app(&mut self, record: &ProcessRecord) -> Result<WaitOutcome, Interrupt> {
        let pid = record.process;
        self.arm_timeout(self.ctx.config().app_quit_timeout, Some(pid));

        loop {
            let ev = match self.next_event().await {
                Ok(ev) => ev,
                Err(interrupt) => {
                    self.disarm_timeout();
                    return Err(interrupt);
                }
            };
            match ev.kind {
                InternalEventKind::ProcessQuit if ev.process == Some(pid) => {
                    self.disarm_timeout();
                    self.publish_quit(pid);
                    return Ok(WaitOutcome::Quit);
                }
                InternalEventKind::Abort => {
                    if let Some(result) = self.abort_request(ev, record) {
                        self.disarm_timeout();
                        return result;
                    }
                }
                InternalEventKind::Timeout if ev.process == Some(pid) => {
                    return self.quit_blocking_app(record).await;
                }
                _ => {}
            }
        }
    }

    /// Interprets an abort request while waiting for `record`.
    ///
    /// A refusal by the awaited process aborts the sequence while user
    /// applications are asked and merely drops the process later on. A user
    /// cancel aborts in every abortable phase. Anything else is ignored.
    fn abort_request(
        &self,
        ev: InternalEvent,
        record: &ProcessRecord,
    ) -> Option<Result<WaitOutcome, Interrupt>> {
        match ev.process {
            Some(pid) if pid == record.process => {
                if self.phase == ShutdownPhase::UserApps {
                    Some(Err(Interrupt::Aborted(AbortCause::Process {
                        process: pid,
                        name: Arc::clone(&record.name),
                    })))
                } else {
                    tracing::debug!(pid = pid.0, phase = self.phase.as_str(), "application declined, skipping");
                    Some(Ok(WaitOutcome::Declined))
                }
            }
            Some(_) => None,
            None if self.phase.is_abortable() => Some(Err(Interrupt::Aborted(AbortCause::User))),
            None => None,
        }
    }

    /// The escalation ladder for an application that did not quit in time.
    async fn quit_blocking_app(&mut self, record: &ProcessRecord) -> Result<WaitOutcome, Interrupt> {
        let pid = record.process;
        let platform = Arc::clone(&self.collab.platform);
        self.publish(
            Event::new(EventKind::ProcessTimedOut)
                .with_process(pid)
                .with_name(Arc::clone(&record.name))
                .with_phase(self.phase)
                .with_delay(self.ctx.config().app_quit_timeout),
        );

        if platform.is_being_debugged(pid) {
            self.debugged.insert(pid);
            self.publish(
                Event::new(EventKind::DebuggedWait)
                    .with_process(pid)
                    .with_phase(self.phase),
            );
            return Ok(WaitOutcome::Debugged);
        }

        if !platform.is_showing_modal(pid) {
            self.kill_process(pid, KillReason::Unresponsive);
            return Ok(WaitOutcome::Killed);
        }

        let status = Arc::clone(&self.collab.status);
        self.publish(
            Event::new(EventKind::ProcessBlocked)
                .with_process(pid)
                .with_name(Arc::clone(&record.name))
                .with_phase(self.phase),
        );
        status.set_phase_text(&format!("\"{}\" might be blocked on a modal panel.", record.name));
        status.set_kill_enabled(true);

        let outcome = loop {
            let ev = match self.next_event().await {
                Ok(ev) => ev,
                Err(interrupt) => break Err(interrupt),
            };
            match ev.kind {
                InternalEventKind::ProcessQuit if ev.process == Some(pid) => {
                    self.publish_quit(pid);
                    break Ok(WaitOutcome::Quit);
                }
                InternalEventKind::KillRequest if ev.process == Some(pid) => {
                    self.kill_process(pid, KillReason::UserRequest);
                    break Ok(WaitOutcome::Killed);
                }
                InternalEventKind::Abort => {
                    if let Some(result) = self.abort_request(ev, record) {
                        break result;
                    }
                }
                _ => {}
            }
        };
        status.set_kill_enabled(false);
        outcome
    }

    fn publish_quit(&self, pid: ProcessId) {
        self.publish(
            Event::new(EventKind::ProcessQuit)
                .with_process(pid)
                .with_phase(self.phase),
        );
    }

    fn kill_process(&self, pid: ProcessId, reason: KillReason) {
        let mut ev = Event::new(EventKind::ProcessKilled)
            .with_process(pid)
            .with_phase(self.phase)
            .with_kill_reason(reason);
        if let Err(err) = self.collab.platform.kill(pid) {
            tracing::warn!(pid = pid.0, error = %err, "kill failed");
            ev = ev.with_reason(err.to_string());
        }
        lock_lists(&self.lists).remove(pid);
        self.publish(ev);
    }

    /// Waits until no process left in a debugger is still alive.
    async fn wait_for_debugged(&mut self) -> Result<(), Interrupt> {
        self.refresh_debugged();
        while !self.debugged.is_empty() {
            let ev = self.next_event().await?;
            if ev.kind == InternalEventKind::Abort && ev.process.is_none() && self.phase.is_abortable() {
                return Err(Interrupt::Aborted(AbortCause::User));
            }
        }
        Ok(())
    }

    /// Broadcasts the quit request to every background application and waits
    /// out one timeout; survivors are killed.
    async fn quit_background_apps(&mut self) -> Result<(), Interrupt> {
        let registry = Arc::clone(&self.collab.registry);
        let records: Vec<ProcessRecord> = {
            let mut lists = lock_lists(&self.lists);
            let stale: Vec<ProcessId> = lists
                .list(Category::Background)
                .iter()
                .map(|r| r.process)
                .filter(|pid| !registry.is_running(*pid))
                .collect();
            for pid in stale {
                lists.remove(pid);
            }
            lists.list(Category::Background).to_vec()
        };
        if records.is_empty() {
            return Ok(());
        }

        self.collab
            .status
            .set_phase_text("Asking background applications to quit.");
        let timeout = self.ctx.config().background_quit_timeout;
        let targets = records.iter().map(|r| r.messenger.clone()).collect::<Vec<_>>();
        if let Err(err) =
            self.ctx
                .deliverer()
                .deliver_message(quit_request(self.request.reboot), targets, Some(timeout))
        {
            tracing::debug!(error = %err, "background quit request not delivered");
        }
        for record in &records {
            self.publish_quit_requested(record);
        }
        let mut asked: HashSet<ProcessId> = records.iter().map(|r| r.process).collect();

        self.arm_timeout(timeout, None);
        loop {
            if lock_lists(&self.lists).list(Category::Background).is_empty() {
                break;
            }
            let ev = match self.next_event().await {
                Ok(ev) => ev,
                Err(interrupt) => {
                    self.disarm_timeout();
                    return Err(interrupt);
                }
            };
            match ev.kind {
                InternalEventKind::Timeout if ev.process.is_none() => break,
                InternalEventKind::ProcessQuit => {
                    if let Some(pid) = ev.process {
                        self.publish_quit(pid);
                    }
                }
                InternalEventKind::ProcessLaunched => {
                    if let Some(pid) = ev.process {
                        self.ask_late_background_app(pid, &mut asked);
                    }
                }
                InternalEventKind::Abort if ev.process.is_none() => {
                    self.disarm_timeout();
                    return Err(Interrupt::Aborted(AbortCause::User));
                }
                _ => {}
            }
        }
        self.disarm_timeout();

        let survivors = lock_lists(&self.lists).list(Category::Background).to_vec();
        for record in survivors {
            self.kill_process(record.process, KillReason::Background);
        }
        Ok(())
    }

    /// Sends the quit request to a background application adopted after the
    /// broadcast. It shares the phase's single timeout.
    fn ask_late_background_app(&self, pid: ProcessId, asked: &mut HashSet<ProcessId>) {
        let record = lock_lists(&self.lists)
            .list(Category::Background)
            .iter()
            .find(|r| r.process == pid)
            .cloned();
        let Some(record) = record else {
            return;
        };
        if !asked.insert(pid) {
            return;
        }
        let timeout = self.ctx.config().background_quit_timeout;
        let message = quit_request(self.request.reboot);
        if let Err(err) = self
            .ctx
            .deliverer()
            .deliver_message(message, record.messenger.clone(), Some(timeout))
        {
            tracing::debug!(pid = pid.0, error = %err, "late background application unreachable");
            lock_lists(&self.lists).remove(pid);
            return;
        }
        self.publish_quit_requested(&record);
    }

    fn publish_quit_requested(&self, record: &ProcessRecord) {
        self.publish(
            Event::new(EventKind::QuitRequested)
                .with_process(record.process)
                .with_name(Arc::clone(&record.name))
                .with_phase(self.phase),
        );
    }

    /// Terminates every process without a quit protocol, sparing vital ones.
    async fn kill_other_processes(&mut self) -> Result<(), Interrupt> {
        let platform = Arc::clone(&self.collab.platform);
        let vital = lock_lists(&self.lists).vital().clone();
        self.collab.status.set_current_process(None);
        self.collab.status.set_phase_text("Asking other processes to quit.");

        let candidates = kill_candidates(&platform.processes(), &vital);
        for pid in &candidates {
            if let Err(err) = platform.send_signal(*pid, Signal::Terminate) {
                tracing::debug!(pid = pid.0, error = %err, "terminate signal failed");
            }
        }
        if candidates.is_empty() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(Interrupt::Stopped),
            _ = tokio::time::sleep(self.ctx.config().non_app_grace) => {}
        }

        for pid in kill_candidates(&platform.processes(), &vital) {
            self.kill_process(pid, KillReason::NonApp);
        }
        Ok(())
    }

    /// Issues the power request with its fallbacks.
    async fn power_off(&mut self) -> ShutdownOutcome {
        let status = Arc::clone(&self.collab.status);
        let platform = Arc::clone(&self.collab.platform);
        let reboot = self.request.reboot;

        status.set_kill_enabled(false);
        status.set_cancel_enabled(false);
        status.set_wait_for_completion(true);
        status.set_phase_text(if reboot { "Restarting…" } else { "Shutting down…" });

        match platform.shutdown(reboot) {
            Ok(()) => return self.completed(reboot),
            Err(err) => self.platform_failed(&err),
        }
        match platform.shutdown(true) {
            Ok(()) => return self.completed(true),
            Err(err) => self.platform_failed(&err),
        }

        self.publish(Event::new(EventKind::SafeHaltEntered));
        status.set_wait_animation(false);
        status.set_phase_text("It's now safe to turn off the computer.");

        loop {
            match self.next_event().await {
                Err(_) => return ShutdownOutcome::Halted,
                Ok(ev) if ev.kind == InternalEventKind::Reboot => match platform.shutdown(true) {
                    Ok(()) => return self.completed(true),
                    Err(err) => self.platform_failed(&err),
                },
                Ok(_) => {}
            }
        }
    }

    fn completed(&self, reboot: bool) -> ShutdownOutcome {
        let mode = if reboot { "reboot" } else { "power_off" };
        self.publish(Event::new(EventKind::ShutdownCompleted).with_reason(mode));
        ShutdownOutcome::Completed { reboot }
    }

    fn platform_failed(&self, err: &crate::error::PlatformError) {
        tracing::warn!(error = %err, "platform shutdown request failed");
        self.publish(Event::new(EventKind::PlatformShutdownFailed).with_reason(err.to_string()));
    }

    /// Shows why the sequence was cancelled until acknowledged or timed out.
    async fn abort(&mut self, cause: AbortCause) -> ShutdownOutcome {
        self.disarm_timeout();
        self.enter_aborted();

        let mut ev = Event::new(EventKind::ShutdownAborted)
            .with_phase(self.phase)
            .with_reason(cause.as_str());
        if let AbortCause::Process { process, name } = &cause {
            ev = ev.with_process(*process).with_name(Arc::clone(name));
        }
        self.publish(ev);
        self.collab.registry.set_shutting_down(false);

        let status = Arc::clone(&self.collab.status);
        status.set_kill_enabled(false);
        status.set_wait_animation(false);
        status.set_current_process(None);
        match &cause {
            AbortCause::User => status.set_phase_text("Shutdown cancelled by user."),
            AbortCause::Process { name, .. } => status.set_phase_text(&format!(
                "Application \"{name}\" has aborted the shutdown process."
            )),
        }
        status.set_cancel_enabled(true);

        self.arm_timeout(self.ctx.config().abort_display, None);
        loop {
            match self.next_event().await {
                Err(_) => break,
                Ok(ev) => match ev.kind {
                    InternalEventKind::Timeout if ev.process.is_none() => break,
                    InternalEventKind::Abort if ev.process.is_none() => break,
                    _ => {}
                },
            }
        }
        self.disarm_timeout();
        status.set_cancel_enabled(false);
        ShutdownOutcome::Cancelled(cause)
    }

    fn enter_aborted(&mut self) {
        lock_lists(&self.lists).phase = ShutdownPhase::Aborted;
        self.phase = ShutdownPhase::Aborted;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(id) = self.timeout.take() {
            let _ = self.ctx.scheduler().take(id);
        }
    }
}
