//! The `com.canonical.Unity.LauncherEntry.Update` signal and the session bus it travels on.
use std::{collections::HashMap, path::Path, sync::mpsc::SyncSender};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use zbus::zvariant::Value;

use crate::names;

/// One entry of the update dictionary, typed the way shells expect it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute {
    ProgressVisible(bool),
    Progress(f64),
    CountVisible(bool),
    Count(i32),
}

impl Attribute {
    pub fn key(&self) -> &'static str {
        match self {
            Attribute::ProgressVisible(_) => names::KEY_PROGRESS_VISIBLE,
            Attribute::Progress(_) => names::KEY_PROGRESS,
            Attribute::CountVisible(_) => names::KEY_COUNT_VISIBLE,
            Attribute::Count(_) => names::KEY_COUNT,
        }
    }

    pub fn to_value(&self) -> Value<'static> {
        match *self {
            Attribute::ProgressVisible(visible) | Attribute::CountVisible(visible) => Value::from(visible),
            Attribute::Progress(progress) => Value::from(progress),
            Attribute::Count(count) => Value::from(count),
        }
    }

    /// The four attributes a freshly created launcher entry starts out with.
    pub fn defaults() -> [Attribute; 4] {
        [Attribute::ProgressVisible(true), Attribute::Progress(0.0), Attribute::CountVisible(false), Attribute::Count(0)]
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribute::ProgressVisible(x) | Attribute::CountVisible(x) => write!(f, "{}: {}", self.key(), x),
            Attribute::Progress(x) => write!(f, "{}: {}", self.key(), x),
            Attribute::Count(x) => write!(f, "{}: {}", self.key(), x),
        }
    }
}

/// Body of one `Update` signal.
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherUpdate {
    pub app_uri: String,
    pub attributes: Vec<Attribute>,
}

impl LauncherUpdate {
    pub fn new(desktop_file: &Path, attributes: Vec<Attribute>) -> Self {
        Self { app_uri: format!("{}{}", names::APPLICATION_URI_SCHEME, desktop_file.display()), attributes }
    }

    /// The `a{sv}` argument of the signal.
    pub fn properties(&self) -> HashMap<&'static str, Value<'static>> {
        self.attributes.iter().map(|attr| (attr.key(), attr.to_value())).collect()
    }
}

/// Where updates get sent. Sending is fire-and-forget: nobody acknowledges a signal.
pub trait SessionBus {
    fn is_connected(&self) -> bool;
    fn send(&self, object_path: &str, update: &LauncherUpdate) -> zbus::Result<()>;

    /// Why the bus could not be reached, if known.
    fn unreachable_reason(&self) -> Option<&str> {
        None
    }
}

type Outgoing = (String, LauncherUpdate);

/// The per-user session bus, reached through zbus.
///
/// zbus is async, so the connection lives on its own thread with its own runtime. That keeps the
/// handle usable from plain threads and from inside a host's tokio runtime alike. [`send`] only
/// queues the update; dropping the handle waits until everything queued has been written.
///
/// [`send`]: SessionBus::send
pub struct DbusSessionBus {
    outbox: Option<UnboundedSender<Outgoing>>,
    worker: Option<std::thread::JoinHandle<()>>,
    unreachable_reason: Option<String>,
}

impl DbusSessionBus {
    /// Connect to the session bus. Failing to connect is not an error here, it just gives a
    /// disconnected handle; the preflight checks report it.
    pub fn connect() -> Self {
        let (outbox, inbox) = tokio::sync::mpsc::unbounded_channel();
        let (ready_send, ready_recv) = std::sync::mpsc::sync_channel(1);

        let worker = std::thread::Builder::new()
            .name("taskbar-progress-dbus".to_string())
            .spawn(move || run_worker(inbox, ready_send));
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => return Self::unreachable(format!("failed to spawn the session bus thread: {}", err)),
        };

        let reason = match ready_recv.recv() {
            Ok(Ok(())) => return Self { outbox: Some(outbox), worker: Some(worker), unreachable_reason: None },
            Ok(Err(reason)) => reason,
            Err(_) => "the session bus thread exited unexpectedly".to_string(),
        };
        let _ = worker.join();
        Self::unreachable(reason)
    }

    /// A handle that never reaches anyone.
    pub fn disconnected() -> Self {
        Self { outbox: None, worker: None, unreachable_reason: None }
    }

    fn unreachable(reason: String) -> Self {
        log::warn!("Could not connect to the session bus: {}", reason);
        Self { outbox: None, worker: None, unreachable_reason: Some(reason) }
    }
}

fn run_worker(mut inbox: UnboundedReceiver<Outgoing>, ready: SyncSender<std::result::Result<(), String>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(format!("failed to initialize tokio runtime: {}", err)));
            return;
        }
    };

    runtime.block_on(async move {
        let connection = match zbus::Connection::session().await {
            Ok(connection) => connection,
            Err(err) => {
                let _ = ready.send(Err(err.to_string()));
                return;
            }
        };
        log::debug!("Connected to the session bus as {:?}", connection.unique_name());
        let _ = ready.send(Ok(()));

        while let Some((object_path, update)) = inbox.recv().await {
            let body = (update.app_uri.as_str(), update.properties());
            let result = connection
                .emit_signal(None::<&str>, object_path.as_str(), names::LAUNCHER_ENTRY_INTERFACE, names::UPDATE_MEMBER, &body)
                .await;
            if let Err(err) = result {
                log::debug!("Taskbar update was not delivered: {}", err);
            }
        }
    });
}

impl std::fmt::Debug for DbusSessionBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbusSessionBus")
            .field("connected", &self.is_connected())
            .field("unreachable_reason", &self.unreachable_reason)
            .finish()
    }
}

impl SessionBus for DbusSessionBus {
    fn is_connected(&self) -> bool {
        self.outbox.is_some()
    }

    fn send(&self, object_path: &str, update: &LauncherUpdate) -> zbus::Result<()> {
        let Some(outbox) = &self.outbox else {
            return Ok(());
        };
        outbox
            .send((object_path.to_string(), update.clone()))
            .map_err(|_| zbus::Error::Failure("the session bus thread is gone".to_string()))
    }

    fn unreachable_reason(&self) -> Option<&str> {
        self.unreachable_reason.as_deref()
    }
}

impl Drop for DbusSessionBus {
    fn drop(&mut self) {
        // closing the channel ends the worker once the queue is flushed
        self.outbox.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("The session bus thread panicked");
            }
        }
    }
}
