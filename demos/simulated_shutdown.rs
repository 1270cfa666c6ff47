//! # Example: simulated_shutdown
//!
//! Runs a full shutdown sequence against a simulated machine.
//!
//! Shows how to:
//! - Implement the [`ProcessRegistry`] and [`Platform`] collaborators.
//! - Attach the [`LogWriter`] subscriber to the [`RegistrarContext`].
//! - Drive a sequence through the [`Registrar`] request interface.
//!
//! ## Flow
//! ```text
//! Registrar::handle(ShutDown { synchronous })
//!     ├─► UserApps:       StyledEdit quits, Hung never answers ─► killed
//!     ├─► SystemApps:     Tracker quits
//!     ├─► BackgroundApps: mail_daemon quits
//!     ├─► OtherProcesses: SIGTERM to the stray process
//!     └─► Done:           power request
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=registrar=debug cargo run --example simulated_shutdown --features logging
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use registrar::{
    Category, ChannelPort, Collaborators, Config, LogWriter, MessageCode, Messenger, NullStatus,
    Platform, PlatformError, PortId, ProcessId, ProcessRecord, ProcessRegistry, RegistrarContext,
    Registrar, RegistrationChange, RegistryError, Reply, Request, RosterEvent, ShutdownRequest,
    ShutdownSnapshot, Signal, Subscribe,
};
use tracing_subscriber::EnvFilter;

/// How a simulated application reacts to a quit request.
#[derive(Clone, Copy)]
enum Behavior {
    Quits(Duration),
    Hangs,
}

#[derive(Default)]
struct Machine {
    apps: Mutex<Vec<ProcessRecord>>,
    running: Mutex<Vec<ProcessId>>,
}

impl Machine {
    fn exit(&self, pid: ProcessId) -> Option<ProcessRecord> {
        self.running.lock().unwrap().retain(|p| *p != pid);
        let mut apps = self.apps.lock().unwrap();
        let pos = apps.iter().position(|r| r.process == pid)?;
        Some(apps.remove(pos))
    }
}

impl ProcessRegistry for Machine {
    fn shutdown_snapshot(&self) -> Result<ShutdownSnapshot, RegistryError> {
        let apps = self.apps.lock().unwrap();
        let of = |category: Category| -> Vec<ProcessRecord> {
            apps.iter().filter(|r| r.category == category).cloned().collect()
        };
        Ok(ShutdownSnapshot {
            user: of(Category::User),
            system: of(Category::System),
            background: of(Category::Background),
            vital: [ProcessId(1)].into_iter().collect(),
        })
    }

    fn record_for(&self, process: ProcessId) -> Option<ProcessRecord> {
        self.apps.lock().unwrap().iter().find(|r| r.process == process).cloned()
    }

    fn registered(&self) -> Vec<ProcessRecord> {
        self.apps.lock().unwrap().clone()
    }

    fn is_running(&self, process: ProcessId) -> bool {
        self.running.lock().unwrap().contains(&process)
    }

    fn set_shutting_down(&self, shutting_down: bool) {
        println!("[machine] registry shutting down: {shutting_down}");
    }

    fn apply(&self, _change: RegistrationChange) -> Result<Option<ProcessRecord>, RegistryError> {
        Err(RegistryError::ShuttingDown)
    }
}

impl Platform for Machine {
    fn processes(&self) -> Vec<ProcessId> {
        self.running.lock().unwrap().clone()
    }

    fn send_signal(&self, process: ProcessId, signal: Signal) -> Result<(), PlatformError> {
        println!("[machine] {signal:?} -> {process}");
        self.exit(process);
        Ok(())
    }

    fn kill(&self, process: ProcessId) -> Result<(), PlatformError> {
        println!("[machine] kill -> {process}");
        self.exit(process);
        Ok(())
    }

    fn shutdown(&self, reboot: bool) -> Result<(), PlatformError> {
        println!("[machine] power request (reboot={reboot})");
        Ok(())
    }
}

/// Registers an application and runs its message loop.
fn spawn_app(
    ctx: &Arc<RegistrarContext>,
    machine: &Arc<Machine>,
    pid: i32,
    name: &str,
    category: Category,
    behavior: Behavior,
) {
    let (port, mut rx) = ChannelPort::channel(PortId(pid as u32), 8);
    let process = ProcessId(pid);
    let record = ProcessRecord::new(process, Messenger::new(process, Arc::new(port)), name, category);
    machine.apps.lock().unwrap().push(record);
    machine.running.lock().unwrap().push(process);

    let ctx = Arc::clone(ctx);
    let machine = Arc::clone(machine);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if message.what() != MessageCode::QuitRequested {
                continue;
            }
            match behavior {
                Behavior::Quits(after) => {
                    tokio::time::sleep(after).await;
                    if let Some(record) = machine.exit(process) {
                        ctx.notify_watchers(&RosterEvent::Quit(record));
                    }
                    return;
                }
                Behavior::Hangs => {}
            }
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "registrar=info".into()))
        .init();

    let cfg = Config {
        app_quit_timeout: Duration::from_secs(1),
        background_quit_timeout: Duration::from_secs(1),
        ..Config::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let ctx = RegistrarContext::builder(cfg).with_subscribers(subs).build()?;

    let machine = Arc::new(Machine::default());
    machine.running.lock().unwrap().extend([ProcessId(1), ProcessId(500)]);
    spawn_app(&ctx, &machine, 101, "StyledEdit", Category::User, Behavior::Quits(Duration::from_millis(200)));
    spawn_app(&ctx, &machine, 102, "Hung", Category::User, Behavior::Hangs);
    spawn_app(&ctx, &machine, 201, "Tracker", Category::System, Behavior::Quits(Duration::from_millis(100)));
    spawn_app(&ctx, &machine, 301, "mail_daemon", Category::Background, Behavior::Quits(Duration::from_millis(50)));

    let collab = Collaborators {
        registry: machine.clone(),
        platform: machine.clone(),
        status: Arc::new(NullStatus),
    };
    let registrar = Registrar::new(Arc::clone(&ctx), collab);

    let reply = registrar
        .handle(Request::ShutDown(ShutdownRequest::power_off().with_synchronous(true)))
        .await;
    println!("[demo] reply: {reply:?}");
    assert_eq!(reply, Reply::Success);

    ctx.shutdown().await;
    Ok(())
}
