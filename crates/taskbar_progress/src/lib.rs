//! Progress bars and counter badges on Unity and KDE Plasma taskbars.
//!
//! Both shells watch the session bus for `com.canonical.Unity.LauncherEntry.Update` signals. A
//! signal names its application through a `.desktop` file, so each [`TaskbarProgress`] writes a
//! throwaway one and removes it again when dropped.
//!
//! ```no_run
//! use taskbar_progress::{AppInfo, TaskbarProgress};
//!
//! let mut taskbar = TaskbarProgress::new(AppInfo::new("Demo", "/usr/bin/demo"));
//! taskbar.set_progress(0.5);
//! taskbar.set_counter_visible(true);
//! taskbar.set_counter(3);
//! ```

pub mod names;

mod error;
pub use error::*;

pub mod bus;
pub use bus::{Attribute, DbusSessionBus, LauncherUpdate, SessionBus};

mod desktop_file;
pub use desktop_file::*;

pub mod environment;
pub use environment::{ProcessLookup, SystemProcesses};

mod taskbar;
pub use taskbar::*;
