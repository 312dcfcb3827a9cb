//! The throwaway `.desktop` file that shells use to match an update to a launcher entry.
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// What the host application tells us about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Display name written to `Name=`.
    pub name: String,
    /// Executable written to `Exec=`.
    pub exec: PathBuf,
}

impl AppInfo {
    pub fn new(name: impl Into<String>, exec: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), exec: exec.into() }
    }

    /// Describe the running executable, naming it after its file stem.
    pub fn from_env() -> std::io::Result<Self> {
        let exec = std::env::current_exe()?;
        let name = exec.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(Self { name, exec })
    }

    pub fn desktop_entry(&self) -> String {
        format!(
            "[Desktop Entry]\nType=Application\nVersion=1.1\nName={}\nExec={}\n",
            escape_value(&self.name),
            escape_value(&self.exec.display().to_string())
        )
    }
}

/// Escape a string value so it stays on its own line, using the Desktop Entry escape sequences.
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The user's writable applications directory, following the XDG base directory layout.
pub fn default_applications_dir() -> Option<PathBuf> {
    let data_home = std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".local/share")))?;
    Some(data_home.join("applications"))
}

/// Owns at most one `<uuid>.desktop` file at a time and removes it when dropped.
#[derive(Debug)]
pub struct DesktopFile {
    applications_dir: PathBuf,
    app: AppInfo,
    path: Option<PathBuf>,
}

impl DesktopFile {
    pub fn new(applications_dir: impl Into<PathBuf>, app: AppInfo) -> Self {
        Self { applications_dir: applications_dir.into(), app, path: None }
    }

    /// Path of the tracked file, whether or not it still exists.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.path.as_deref().is_some_and(Path::exists)
    }

    /// Return the path of an existing descriptor, writing a fresh one first if there is none.
    ///
    /// A recreated descriptor always gets a new name.
    pub fn ensure(&mut self) -> Result<&Path> {
        let path = match self.path.take() {
            Some(path) if path.exists() => path,
            _ => self.write_new()?,
        };
        Ok(self.path.insert(path).as_path())
    }

    fn write_new(&self) -> Result<PathBuf> {
        let path = self.applications_dir.join(format!("{}.desktop", uuid::Uuid::new_v4()));
        let io_err = |source| Error::DescriptorIo { path: path.clone(), source };

        std::fs::create_dir_all(&self.applications_dir).map_err(io_err)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path).map_err(io_err)?;
        if let Err(err) = file.write_all(self.app.desktop_entry().as_bytes()).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(io_err(err));
        }

        log::info!("Created desktop file {}", path.display());
        Ok(path)
    }

    /// Delete the descriptor if it is still on disk. Safe to call any number of times.
    pub fn teardown(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => log::info!("Removed desktop file {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::error!("Failed to remove desktop file {}: {}", path.display(), err),
        }
    }
}

impl Drop for DesktopFile {
    fn drop(&mut self) {
        self.teardown();
    }
}
