use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use smart_default::SmartDefault;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    bus::{Attribute, DbusSessionBus, LauncherUpdate, SessionBus},
    desktop_file::{default_applications_dir, AppInfo, DesktopFile},
    environment::{check_bus, Environment, ProcessLookup, SystemProcesses},
    names, Error,
};

/// Notifications for local observers. Change events fire whether or not the shell got the update.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProgressChanged(f64),
    ProgressVisibleChanged(bool),
    CounterChanged(i32),
    CounterVisibleChanged(bool),
    ErrorOccurred(String),
}

/// The last values set locally.
#[derive(Debug, Clone, Copy, PartialEq, SmartDefault)]
pub struct ProgressState {
    #[default = true]
    pub progress_visible: bool,
    pub progress: f64,
    pub counter_visible: bool,
    pub counter: i32,
}

#[derive(Debug)]
pub enum Status {
    /// Updates are sent to the shell.
    Ready,
    /// The host can't show taskbar progress. Updates only reach local observers.
    Ineligible(Error),
    /// The desktop file is gone for good.
    TornDown,
}

#[derive(Debug, Clone, SmartDefault)]
pub struct Options {
    #[default(names::DEFAULT_OBJECT_PATH.to_string())]
    pub object_path: String,
    #[default(default_session_markers())]
    pub session_markers: Vec<String>,
    /// How long to wait for each `pidof` while looking for the session.
    #[default(Duration::from_secs(2))]
    pub lookup_timeout: Duration,
    /// Defaults to `$XDG_DATA_HOME/applications`.
    pub applications_dir: Option<PathBuf>,
    #[default(std::env::consts::OS.to_string())]
    pub os: String,
}

fn default_session_markers() -> Vec<String> {
    names::SESSION_MARKERS.iter().map(|marker| marker.to_string()).collect()
}

pub struct TaskbarProgressBuilder {
    app: AppInfo,
    options: Options,
    bus: Option<Box<dyn SessionBus + Send>>,
    processes: Option<Box<dyn ProcessLookup + Send>>,
    listeners: Vec<UnboundedSender<Event>>,
}

impl TaskbarProgressBuilder {
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn object_path(mut self, object_path: impl Into<String>) -> Self {
        self.options.object_path = object_path.into();
        self
    }

    pub fn applications_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.applications_dir = Some(dir.into());
        self
    }

    pub fn session_markers<S: Into<String>>(mut self, markers: impl IntoIterator<Item = S>) -> Self {
        self.options.session_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.options.lookup_timeout = timeout;
        self
    }

    /// Pretend to run on another operating system.
    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.options.os = os.into();
        self
    }

    /// Send updates somewhere other than the session bus.
    pub fn bus(mut self, bus: impl SessionBus + Send + 'static) -> Self {
        self.bus = Some(Box::new(bus));
        self
    }

    pub fn processes(mut self, processes: impl ProcessLookup + Send + 'static) -> Self {
        self.processes = Some(Box::new(processes));
        self
    }

    /// Attach an observer before construction, so it also sees errors from the preflight checks.
    pub fn listener(mut self, listener: UnboundedSender<Event>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Run the preflight checks and, if they pass, create the desktop file and send the initial reset.
    ///
    /// This never fails. An ineligible host yields an inert instance and an [`Event::ErrorOccurred`].
    pub fn build(self) -> TaskbarProgress {
        let TaskbarProgressBuilder { app, options, bus, processes, listeners } = self;
        let processes = processes.unwrap_or_else(|| Box::new(SystemProcesses::new(options.lookup_timeout)));
        let env = Environment { os: &options.os, session_markers: &options.session_markers, processes: processes.as_ref() };

        let (bus, eligibility): (Box<dyn SessionBus + Send>, _) = match env.check_host() {
            Ok(()) => {
                let bus = bus.unwrap_or_else(|| Box::new(DbusSessionBus::connect()));
                let eligibility = check_bus(bus.as_ref());
                (bus, eligibility)
            }
            Err(err) => (bus.unwrap_or_else(|| Box::new(DbusSessionBus::disconnected())), Err(err)),
        };

        let applications_dir = options.applications_dir.or_else(default_applications_dir).unwrap_or_else(|| {
            log::warn!("Neither XDG_DATA_HOME nor HOME is set, writing the desktop file to the temp dir");
            std::env::temp_dir().join("applications")
        });
        let mut taskbar = TaskbarProgress {
            status: Status::Ready,
            desktop_file: DesktopFile::new(applications_dir, app),
            bus,
            object_path: options.object_path,
            state: ProgressState::default(),
            listeners,
        };

        match eligibility.and_then(|()| taskbar.desktop_file.ensure().map(|_| ())) {
            Ok(()) => taskbar.reset(),
            Err(err) => taskbar.fail(err),
        }
        taskbar
    }
}

/// Shows progress and a counter badge on the application's taskbar entry.
///
/// Each instance owns a throwaway desktop file that identifies it to the shell; it is deleted on
/// [`TaskbarProgress::close`] or drop.
pub struct TaskbarProgress {
    status: Status,
    desktop_file: DesktopFile,
    bus: Box<dyn SessionBus + Send>,
    object_path: String,
    state: ProgressState,
    listeners: Vec<UnboundedSender<Event>>,
}

impl TaskbarProgress {
    /// Create an instance talking to the real session bus, with default options.
    pub fn new(app: AppInfo) -> Self {
        Self::builder(app).build()
    }

    pub fn builder(app: AppInfo) -> TaskbarProgressBuilder {
        TaskbarProgressBuilder { app, options: Options::default(), bus: None, processes: None, listeners: Vec::new() }
    }

    pub fn set_progress(&mut self, progress: f64) {
        self.state.progress = progress;
        self.emit(vec![Attribute::Progress(progress)]);
        self.notify(Event::ProgressChanged(progress));
    }

    pub fn set_progress_visible(&mut self, visible: bool) {
        self.state.progress_visible = visible;
        self.emit(vec![Attribute::ProgressVisible(visible)]);
        self.notify(Event::ProgressVisibleChanged(visible));
    }

    pub fn set_counter(&mut self, counter: i32) {
        self.state.counter = counter;
        self.emit(vec![Attribute::Count(counter)]);
        self.notify(Event::CounterChanged(counter));
    }

    pub fn set_counter_visible(&mut self, visible: bool) {
        self.state.counter_visible = visible;
        self.emit(vec![Attribute::CountVisible(visible)]);
        self.notify(Event::CounterVisibleChanged(visible));
    }

    /// Put the taskbar entry back to a visible, empty progress bar and a hidden counter.
    pub fn reset(&mut self) {
        self.state = ProgressState::default();
        self.emit(Attribute::defaults().to_vec());
    }

    /// Path of the desktop file identifying this instance, if one was created.
    pub fn desktop_filename(&self) -> Option<&Path> {
        self.desktop_file.path()
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, Status::Ready)
    }

    /// Register another observer.
    pub fn subscribe(&mut self) -> UnboundedReceiver<Event> {
        let (send, recv) = tokio::sync::mpsc::unbounded_channel();
        self.listeners.push(send);
        recv
    }

    /// Delete the desktop file and stop sending updates. Dropping does the same.
    pub fn close(&mut self) {
        self.desktop_file.teardown();
        if self.is_ready() {
            self.status = Status::TornDown;
        }
    }

    fn fail(&mut self, err: Error) {
        match &err {
            Error::BusUnreachable { reason } => log::error!("{} ({})", err, reason),
            _ => log::error!("{}", err),
        }
        self.notify(Event::ErrorOccurred(err.to_string()));
        self.status = Status::Ineligible(err);
    }

    fn emit(&mut self, attributes: Vec<Attribute>) {
        if !self.is_ready() {
            log::debug!("Not sending taskbar update, status is {:?}", self.status);
            return;
        }

        let recreated = !self.desktop_file.exists();
        let path = match self.desktop_file.ensure() {
            Ok(path) => path.to_path_buf(),
            Err(err) => {
                log::error!("Skipping taskbar update: {}", err);
                return;
            }
        };

        // the shell sees a brand new entry, so start it from a known state
        if recreated && attributes != Attribute::defaults() {
            self.send(&LauncherUpdate::new(&path, Attribute::defaults().to_vec()));
        }
        self.send(&LauncherUpdate::new(&path, attributes));
    }

    fn send(&self, update: &LauncherUpdate) {
        log::debug!(
            "Sending {} [{}]",
            update.app_uri,
            update.attributes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        if let Err(err) = self.bus.send(&self.object_path, update) {
            log::debug!("Taskbar update was not delivered: {}", err);
        }
    }

    fn notify(&mut self, event: Event) {
        self.listeners.retain(|listener| listener.send(event.clone()).is_ok());
    }
}

impl Drop for TaskbarProgress {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingBus {
        connected: bool,
        sent: Arc<Mutex<Vec<(String, LauncherUpdate)>>>,
    }

    impl SessionBus for RecordingBus {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&self, object_path: &str, update: &LauncherUpdate) -> zbus::Result<()> {
            self.sent.lock().unwrap().push((object_path.to_string(), update.clone()));
            Ok(())
        }
    }

    struct KdeSession;

    impl ProcessLookup for KdeSession {
        fn pid_of(&self, name: &str) -> Option<u32> {
            (name == "ksmserver").then_some(1234)
        }
    }

    fn build(dir: &Path, bus: &RecordingBus) -> TaskbarProgress {
        TaskbarProgress::builder(AppInfo::new("Demo", "/usr/bin/demo"))
            .applications_dir(dir)
            .os("linux")
            .processes(KdeSession)
            .bus(bus.clone())
            .build()
    }

    #[test]
    fn test_default_state_matches_reset() {
        let state = ProgressState::default();
        assert_eq!(state, ProgressState { progress_visible: true, progress: 0.0, counter_visible: false, counter: 0 });
    }

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.object_path, "/");
        assert_eq!(options.session_markers, vec!["unity".to_string(), "ksmserver".to_string()]);
        assert_eq!(options.lookup_timeout, Duration::from_secs(2));
        assert_eq!(options.os, std::env::consts::OS);
    }

    #[test]
    fn test_object_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let bus = RecordingBus { connected: true, ..Default::default() };
        let _taskbar = TaskbarProgress::builder(AppInfo::new("Demo", "/usr/bin/demo"))
            .applications_dir(dir.path())
            .os("linux")
            .processes(KdeSession)
            .bus(bus.clone())
            .object_path("/org/example/Demo")
            .build();
        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "/org/example/Demo");
    }

    #[test]
    fn test_state_tracks_setters() {
        let dir = tempfile::tempdir().unwrap();
        let bus = RecordingBus { connected: true, ..Default::default() };
        let mut taskbar = build(dir.path(), &bus);
        taskbar.set_progress(0.25);
        taskbar.set_counter(3);
        taskbar.set_counter_visible(true);
        taskbar.set_progress_visible(false);
        assert_eq!(
            taskbar.state(),
            ProgressState { progress_visible: false, progress: 0.25, counter_visible: true, counter: 3 }
        );

        taskbar.reset();
        assert_eq!(taskbar.state(), ProgressState::default());
    }

    #[test]
    fn test_reset_after_delete_is_sent_once() {
        let dir = tempfile::tempdir().unwrap();
        let bus = RecordingBus { connected: true, ..Default::default() };
        let mut taskbar = build(dir.path(), &bus);
        std::fs::remove_file(taskbar.desktop_filename().unwrap()).unwrap();

        taskbar.reset();
        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.attributes, Attribute::defaults().to_vec());
        assert_ne!(sent[0].1.app_uri, sent[1].1.app_uri);
    }

    #[test]
    fn test_close_stops_updates() {
        let dir = tempfile::tempdir().unwrap();
        let bus = RecordingBus { connected: true, ..Default::default() };
        let mut taskbar = build(dir.path(), &bus);
        let path = taskbar.desktop_filename().unwrap().to_path_buf();
        let mut events = taskbar.subscribe();

        taskbar.close();
        taskbar.close();
        assert!(!path.exists());
        assert!(matches!(taskbar.status(), Status::TornDown));

        taskbar.set_progress(0.75);
        assert_eq!(bus.sent.lock().unwrap().len(), 1);
        assert_eq!(events.try_recv().unwrap(), Event::ProgressChanged(0.75));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let bus = RecordingBus { connected: true, ..Default::default() };
        let mut taskbar = build(dir.path(), &bus);
        let dropped = taskbar.subscribe();
        let mut kept = taskbar.subscribe();
        drop(dropped);

        taskbar.set_counter(1);
        assert_eq!(taskbar.listeners.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), Event::CounterChanged(1));
    }
}
