//! Test doubles for the collaborators of the shutdown core.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::core::{Collaborators, RegistrarContext};
use crate::delivery::{ChannelPort, Messenger, Port, PortError, PortId};
use crate::error::{PlatformError, RegistryError};
use crate::events::{Event, EventKind};
use crate::protocol::{FIELD_SHUTDOWN, Message, MessageCode};
use crate::roster::{
    Category, Platform, ProcessId, ProcessRecord, ProcessRegistry, RegistrationChange,
    RosterEvent, ShutdownSnapshot, Signal, StatusSurface,
};

/// Port that reports itself full for the first `full_for` attempts.
pub(crate) struct ScriptedPort {
    id: PortId,
    full_for: u32,
    attempts: AtomicU32,
    closed: AtomicBool,
    received: Mutex<Vec<MessageCode>>,
}

impl ScriptedPort {
    pub(crate) fn new(id: PortId, full_for: u32) -> Self {
        Self {
            id,
            full_for,
            attempts: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn received(&self) -> Vec<MessageCode> {
        self.received.lock().unwrap().clone()
    }

    /// Every `try_send` call, including refused ones.
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Port for ScriptedPort {
    fn id(&self) -> PortId {
        self.id
    }

    fn try_send(&self, message: Arc<Message>) -> Result<(), PortError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PortError::Gone);
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.full_for {
            return Err(PortError::Full);
        }
        self.received.lock().unwrap().push(message.what());
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// An application registered with [`FakeSystem`] and its mailbox.
pub(crate) struct FakeApp {
    pub(crate) pid: ProcessId,
    pub(crate) record: ProcessRecord,
    pub(crate) rx: mpsc::Receiver<Arc<Message>>,
}

impl FakeApp {
    /// Waits for the shutdown quit request.
    pub(crate) async fn expect_quit(&mut self) -> Arc<Message> {
        let message = self.rx.recv().await.expect("mailbox closed");
        assert_eq!(message.what(), MessageCode::QuitRequested);
        assert_eq!(message.find_bool(FIELD_SHUTDOWN), Some(true));
        message
    }

    pub(crate) fn has_mail(&mut self) -> bool {
        !self.rx.is_empty()
    }
}

#[derive(Default)]
struct SystemState {
    apps: Vec<ProcessRecord>,
    pending: Vec<ProcessRecord>,
    running: Vec<ProcessId>,
    vital: HashSet<ProcessId>,
    modal: HashSet<ProcessId>,
    debugged: HashSet<ProcessId>,
    exit_on_terminate: HashSet<ProcessId>,
    kills: Vec<ProcessId>,
    signals: Vec<(ProcessId, Signal)>,
    shutdown_results: VecDeque<Result<(), PlatformError>>,
    shutdown_calls: Vec<bool>,
    shutting_down: bool,
    snapshot_fails: bool,
    after_snapshot: Option<Box<dyn FnOnce(&FakeSystem) + Send>>,
    synced: bool,
}

/// Registry and platform sharing one simulated process table.
#[derive(Default)]
pub(crate) struct FakeSystem {
    state: Mutex<SystemState>,
}

impl FakeSystem {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SystemState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn collaborators(self: &Arc<Self>, status: Arc<RecordingStatus>) -> Collaborators {
        Collaborators {
            registry: self.clone(),
            platform: self.clone(),
            status,
        }
    }

    fn make_app(pid: i32, name: &str, category: Category) -> FakeApp {
        let (port, rx) = ChannelPort::channel(PortId(pid as u32), 8);
        let process = ProcessId(pid);
        let record = ProcessRecord::new(process, Messenger::new(process, Arc::new(port)), name, category);
        FakeApp {
            pid: process,
            record,
            rx,
        }
    }

    /// Registers and starts an application.
    pub(crate) fn add_app(&self, pid: i32, name: &str, category: Category) -> FakeApp {
        let app = Self::make_app(pid, name, category);
        self.register(app.record.clone());
        app
    }

    /// Files `record` as a running, registered application.
    pub(crate) fn register(&self, record: ProcessRecord) {
        let mut state = self.state();
        state.running.push(record.process);
        state.apps.push(record);
    }

    /// Runs `hook` right after the next snapshot was taken.
    pub(crate) fn after_snapshot(&self, hook: impl FnOnce(&FakeSystem) + Send + 'static) {
        self.state().after_snapshot = Some(Box::new(hook));
    }

    /// An application that has not registered yet.
    pub(crate) fn unregistered_app(&self, pid: i32, name: &str, category: Category) -> FakeApp {
        Self::make_app(pid, name, category)
    }

    /// Starts a process without a quit protocol.
    pub(crate) fn add_process(&self, pid: i32) {
        self.state().running.push(ProcessId(pid));
    }

    pub(crate) fn add_vital(&self, pid: i32) {
        let mut state = self.state();
        state.running.push(ProcessId(pid));
        state.vital.insert(ProcessId(pid));
    }

    pub(crate) fn set_modal(&self, pid: ProcessId) {
        self.state().modal.insert(pid);
    }

    pub(crate) fn set_debugged(&self, pid: ProcessId, debugged: bool) {
        let mut state = self.state();
        if debugged {
            state.debugged.insert(pid);
        } else {
            state.debugged.remove(&pid);
        }
    }

    pub(crate) fn exit_on_terminate(&self, pid: i32) {
        self.state().exit_on_terminate.insert(ProcessId(pid));
    }

    pub(crate) fn fail_snapshot(&self) {
        self.state().snapshot_fails = true;
    }

    /// Queues the answer of the next power request. Unqueued requests succeed.
    pub(crate) fn push_shutdown_result(&self, result: Result<(), PlatformError>) {
        self.state().shutdown_results.push_back(result);
    }

    /// The process exits and the roster tells its watchers.
    pub(crate) fn quit(&self, ctx: &RegistrarContext, pid: ProcessId) {
        let record = {
            let mut state = self.state();
            state.running.retain(|p| *p != pid);
            state.debugged.remove(&pid);
            let pos = state.apps.iter().position(|r| r.process == pid);
            pos.map(|pos| state.apps.remove(pos))
        };
        if let Some(record) = record {
            ctx.notify_watchers(&RosterEvent::Quit(record));
        }
    }

    /// Starts and registers an application while a sequence runs.
    pub(crate) fn launch(&self, ctx: &RegistrarContext, pid: i32, name: &str, category: Category) -> FakeApp {
        let app = self.add_app(pid, name, category);
        ctx.notify_watchers(&RosterEvent::Launched(app.record.clone()));
        app
    }

    pub(crate) fn kills(&self) -> Vec<ProcessId> {
        self.state().kills.clone()
    }

    pub(crate) fn signals(&self) -> Vec<(ProcessId, Signal)> {
        self.state().signals.clone()
    }

    pub(crate) fn shutdown_calls(&self) -> Vec<bool> {
        self.state().shutdown_calls.clone()
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    pub(crate) fn synced(&self) -> bool {
        self.state().synced
    }
}

impl ProcessRegistry for FakeSystem {
    fn shutdown_snapshot(&self) -> Result<ShutdownSnapshot, RegistryError> {
        let (snapshot, hook) = {
            let mut state = self.state();
            if state.snapshot_fails {
                return Err(RegistryError::Unavailable {
                    reason: "scripted failure".into(),
                });
            }
            let of = |category: Category| -> Vec<ProcessRecord> {
                state
                    .apps
                    .iter()
                    .filter(|r| r.category == category)
                    .cloned()
                    .collect()
            };
            let snapshot = ShutdownSnapshot {
                user: of(Category::User),
                system: of(Category::System),
                background: of(Category::Background),
                vital: state.vital.clone(),
            };
            (snapshot, state.after_snapshot.take())
        };
        if let Some(hook) = hook {
            hook(self);
        }
        Ok(snapshot)
    }

    fn record_for(&self, process: ProcessId) -> Option<ProcessRecord> {
        self.state().apps.iter().find(|r| r.process == process).cloned()
    }

    fn registered(&self) -> Vec<ProcessRecord> {
        self.state().apps.clone()
    }

    fn is_running(&self, process: ProcessId) -> bool {
        self.state().running.contains(&process)
    }

    fn set_shutting_down(&self, shutting_down: bool) {
        self.state().shutting_down = shutting_down;
    }

    fn apply(&self, change: RegistrationChange) -> Result<Option<ProcessRecord>, RegistryError> {
        let mut state = self.state();
        match change {
            RegistrationChange::Add(record) => {
                if state.shutting_down {
                    return Err(RegistryError::ShuttingDown);
                }
                state.pending.push(record);
                Ok(None)
            }
            RegistrationChange::Complete(process) => {
                let pos = state
                    .pending
                    .iter()
                    .position(|r| r.process == process)
                    .ok_or(RegistryError::NotFound { process })?;
                let record = state.pending.remove(pos);
                state.apps.push(record.clone());
                state.running.push(process);
                Ok(Some(record))
            }
            RegistrationChange::Remove(process) => {
                let pos = state
                    .apps
                    .iter()
                    .position(|r| r.process == process)
                    .ok_or(RegistryError::NotFound { process })?;
                Ok(Some(state.apps.remove(pos)))
            }
            RegistrationChange::Activate(process) => state
                .apps
                .iter()
                .find(|r| r.process == process)
                .cloned()
                .map(Some)
                .ok_or(RegistryError::NotFound { process }),
        }
    }
}

impl Platform for FakeSystem {
    fn processes(&self) -> Vec<ProcessId> {
        self.state().running.clone()
    }

    fn send_signal(&self, process: ProcessId, signal: Signal) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.signals.push((process, signal));
        if signal == Signal::Terminate && state.exit_on_terminate.contains(&process) {
            state.running.retain(|p| *p != process);
        }
        Ok(())
    }

    fn kill(&self, process: ProcessId) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.kills.push(process);
        state.running.retain(|p| *p != process);
        state.apps.retain(|r| r.process != process);
        Ok(())
    }

    fn is_being_debugged(&self, process: ProcessId) -> bool {
        self.state().debugged.contains(&process)
    }

    fn is_showing_modal(&self, process: ProcessId) -> bool {
        self.state().modal.contains(&process)
    }

    fn sync_filesystems(&self) {
        self.state().synced = true;
    }

    fn shutdown(&self, reboot: bool) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.shutdown_calls.push(reboot);
        state.shutdown_results.pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default)]
struct StatusLog {
    texts: Vec<String>,
    kill_enabled: bool,
    cancel_enabled: bool,
    waiting_for_completion: bool,
    confirmations: u32,
}

/// Status surface that remembers everything it was told.
pub(crate) struct RecordingStatus {
    log: Mutex<StatusLog>,
    confirm: bool,
}

impl RecordingStatus {
    pub(crate) fn new() -> Arc<Self> {
        Self::confirming(true)
    }

    pub(crate) fn confirming(confirm: bool) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(StatusLog::default()),
            confirm,
        })
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.log.lock().unwrap().texts.clone()
    }

    pub(crate) fn has_text(&self, text: &str) -> bool {
        self.log.lock().unwrap().texts.iter().any(|t| t == text)
    }

    pub(crate) fn kill_enabled(&self) -> bool {
        self.log.lock().unwrap().kill_enabled
    }

    pub(crate) fn cancel_enabled(&self) -> bool {
        self.log.lock().unwrap().cancel_enabled
    }

    pub(crate) fn waiting_for_completion(&self) -> bool {
        self.log.lock().unwrap().waiting_for_completion
    }

    pub(crate) fn confirmations(&self) -> u32 {
        self.log.lock().unwrap().confirmations
    }
}

#[async_trait]
impl StatusSurface for RecordingStatus {
    fn set_phase_text(&self, text: &str) {
        self.log.lock().unwrap().texts.push(text.to_string());
    }

    fn set_current_process(&self, _process: Option<ProcessId>) {}

    fn set_kill_enabled(&self, enabled: bool) {
        self.log.lock().unwrap().kill_enabled = enabled;
    }

    fn set_cancel_enabled(&self, enabled: bool) {
        self.log.lock().unwrap().cancel_enabled = enabled;
    }

    fn set_wait_animation(&self, _enabled: bool) {}

    fn set_wait_for_completion(&self, waiting: bool) {
        self.log.lock().unwrap().waiting_for_completion = waiting;
    }

    async fn confirm(&self, _reboot: bool) -> bool {
        self.log.lock().unwrap().confirmations += 1;
        self.confirm
    }
}

/// Receives bus events until one of `kind` arrives.
pub(crate) async fn wait_for_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    loop {
        match rx.recv().await {
            Ok(ev) if ev.kind == kind => return ev,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => panic!("bus closed before {kind:?}"),
        }
    }
}

/// Every event already on the bus.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
