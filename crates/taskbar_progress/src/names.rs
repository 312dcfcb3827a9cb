//! Names on the session bus that make up the launcher entry convention.

/// Interface watched by Unity and KDE Plasma for per-application progress overlays.
pub const LAUNCHER_ENTRY_INTERFACE: &str = "com.canonical.Unity.LauncherEntry";

/// Signal member carrying the `(s, a{sv})` update.
pub const UPDATE_MEMBER: &str = "Update";

/// Object path the update signal is emitted from, unless overridden in the options.
pub const DEFAULT_OBJECT_PATH: &str = "/";

/// Prefix of the application id argument; the descriptor file's absolute path follows it.
pub const APPLICATION_URI_SCHEME: &str = "application://";

/// Processes that indicate a running Unity or KDE Plasma session.
pub const SESSION_MARKERS: &[&str] = &["unity", "ksmserver"];

pub const KEY_PROGRESS_VISIBLE: &str = "progress-visible";
pub const KEY_PROGRESS: &str = "progress";
pub const KEY_COUNT_VISIBLE: &str = "count-visible";
pub const KEY_COUNT: &str = "count";
