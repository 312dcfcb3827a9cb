use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Taskbar progress only works with KDE and Unity desktops on Linux!")]
    UnsupportedPlatform { os: String },
    #[error("Taskbar progress only works with KDE and Unity desktops on Linux!")]
    UnsupportedDesktopSession,
    #[error("Cannot connect to the D-Bus session bus. To start it, run: eval `dbus-launch --auto-syntax`")]
    BusUnreachable { reason: String },
    #[error("Failed to write desktop file {}", .path.display())]
    DescriptorIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether this error means the host can never show taskbar progress for this instance.
    pub fn is_eligibility_failure(&self) -> bool {
        matches!(self, Error::UnsupportedPlatform { .. } | Error::UnsupportedDesktopSession | Error::BusUnreachable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
