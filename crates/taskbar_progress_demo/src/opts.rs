use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

/// Struct that gets generated from `RawOpt`.
#[derive(Debug, PartialEq)]
pub struct Opt {
    pub log_debug: bool,
    pub app_name: Option<String>,
    pub action: Action,
}

#[derive(Parser, Debug, PartialEq)]
#[command(author = "ElKowar", version, about, long_about = None)]
pub(super) struct RawOpt {
    /// Write out debug logs, including every update sent to the shell.
    #[arg(long = "debug", global = true)]
    log_debug: bool,

    /// Name written to the generated desktop file. Defaults to the executable name.
    #[arg(long = "name", global = true)]
    app_name: Option<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Action {
    /// Check whether this desktop can show taskbar progress.
    #[command(name = "check")]
    Check,

    /// Fill the progress bar from empty to full, then exit.
    #[command(name = "run", alias = "r")]
    Run {
        /// Number of steps between 0 and 100%.
        #[arg(short, long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
        steps: u32,

        /// Milliseconds between two steps.
        #[arg(short, long, default_value_t = 250)]
        interval_ms: u64,

        /// Show this number on the counter badge while running.
        #[arg(short, long)]
        counter: Option<i32>,

        /// Keep the progress bar hidden, only showing the counter.
        #[arg(long)]
        hide_progress: bool,
    },

    /// Send the given values once, keep the entry alive for a while, then exit.
    #[command(name = "set", alias = "s")]
    Set {
        /// Progress between 0.0 and 1.0.
        #[arg(short, long, value_parser = parse_progress)]
        progress: Option<f64>,

        /// Number shown on the counter badge.
        #[arg(short, long)]
        counter: Option<i32>,

        /// How long to keep the taskbar entry around, in milliseconds.
        #[arg(long, default_value_t = 5000)]
        hold_ms: u64,
    },

    /// Generate a shell completion script.
    #[command(name = "completions")]
    ShellCompletions {
        #[arg(value_enum)]
        shell: clap_complete::shells::Shell,
    },
}

impl Opt {
    pub fn from_env() -> Self {
        let raw: RawOpt = RawOpt::parse();
        raw.into()
    }
}

impl From<RawOpt> for Opt {
    fn from(other: RawOpt) -> Self {
        let RawOpt { log_debug, app_name, action } = other;
        Opt { log_debug, app_name, action }
    }
}

fn parse_progress(s: &str) -> Result<f64> {
    let progress: f64 = s.parse()?;
    if !(0.0..=1.0).contains(&progress) {
        bail!("progress must be between 0.0 and 1.0, but got {}", progress);
    }
    Ok(progress)
}
