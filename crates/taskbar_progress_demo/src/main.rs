use std::time::Duration;

use anyhow::{Context, Result};
use clap::CommandFactory as _;
use taskbar_progress::{AppInfo, Event, Status, TaskbarProgress};
use tokio::sync::mpsc::UnboundedReceiver;

mod opts;

fn main() {
    let opts = opts::Opt::from_env();

    let log_level_filter = if opts.log_debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init_timed();
    } else {
        pretty_env_logger::formatted_timed_builder()
            .filter(Some("taskbar_progress_demo"), log_level_filter)
            .filter(Some("taskbar_progress"), log_level_filter)
            .init();
    }

    if let opts::Action::ShellCompletions { shell } = opts.action {
        clap_complete::generate(shell, &mut opts::RawOpt::command(), "taskbar-progress-demo", &mut std::io::stdout());
        return;
    }

    if let Err(err) = run(opts) {
        log::error!("{:?}", err);
        std::process::exit(1);
    }
}

fn run(opts: opts::Opt) -> Result<()> {
    let mut app = AppInfo::from_env().context("Failed to determine the path of this executable")?;
    if let Some(name) = opts.app_name {
        app.name = name;
    }

    let (send, mut events) = tokio::sync::mpsc::unbounded_channel();
    let mut taskbar = TaskbarProgress::builder(app).listener(send).build();

    match opts.action {
        opts::Action::ShellCompletions { .. } => unreachable!(),
        opts::Action::Check => {
            log_events(&mut events);
            match taskbar.status() {
                Status::Ready => {
                    let desktop_file = taskbar.desktop_filename().map(|path| path.display().to_string()).unwrap_or_default();
                    println!("Taskbar progress is available (desktop file: {})", desktop_file);
                }
                Status::Ineligible(err) => anyhow::bail!("Taskbar progress is not available: {}", err),
                Status::TornDown => unreachable!(),
            }
        }
        opts::Action::Run { steps, interval_ms, counter, hide_progress } => {
            if hide_progress {
                taskbar.set_progress_visible(false);
            }
            if let Some(counter) = counter {
                taskbar.set_counter(counter);
                taskbar.set_counter_visible(true);
            }
            for step in 0..=steps {
                taskbar.set_progress(step as f64 / steps as f64);
                log_events(&mut events);
                std::thread::sleep(Duration::from_millis(interval_ms));
            }
        }
        opts::Action::Set { progress, counter, hold_ms } => {
            if let Some(progress) = progress {
                taskbar.set_progress(progress);
            }
            if let Some(counter) = counter {
                taskbar.set_counter(counter);
                taskbar.set_counter_visible(true);
            }
            log_events(&mut events);
            std::thread::sleep(Duration::from_millis(hold_ms));
        }
    }

    taskbar.close();
    Ok(())
}

fn log_events(events: &mut UnboundedReceiver<Event>) {
    while let Ok(event) = events.try_recv() {
        match event {
            Event::ErrorOccurred(msg) => log::warn!("{}", msg),
            other => log::debug!("{:?}", other),
        }
    }
}
