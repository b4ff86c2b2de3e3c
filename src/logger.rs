use std::env;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_RETENTION_DAYS: i64 = 3;

/// Installs the global subscriber: stdout plus an append-mode file named
/// after today's date under `log_dir`.
pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).context("could not create log directory")?;

    let today = Local::now().format("%Y-%m-%d").to_string();
    let path = log_dir.join(format!("{today}.log"));
    let new_file = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("could not open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "assessment_hub=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    if new_file {
        info!("new log file is created: {}", path.display());
    }
    Ok(())
}

/// Removes dated run logs older than the retention window. The validation
/// log is per-run and exempt; files that do not look like run logs are left
/// alone. Never fails the caller.
pub fn cleanup_old_logs(log_dir: &Path) {
    let cutoff = Local::now().date_naive() - Duration::days(LOG_RETENTION_DAYS);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "could not scan log directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".log") || name == "validation.log" {
            continue;
        }
        match NaiveDate::parse_from_str(name.trim_end_matches(".log"), "%Y-%m-%d") {
            Ok(date) if date <= cutoff => {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!(error = %e, file = %name, "could not remove old log file");
                } else {
                    info!("removed old log file: {name}");
                }
            }
            Ok(_) => {}
            Err(_) => warn!("unexpected log file name: {name}"),
        }
    }
}
