// SPDX-License-Identifier: MIT
//
// Koinon Print Bridge — daemon entry point.
//
// Initialises logging, loads configuration, enumerates printers, and runs
// the loopback HTTP server until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use koinon_bridge_core::config::{data_dir, BridgeConfig};
use koinon_bridge_core::error::Result;
use koinon_bridge_print::{BridgeServer, PrinterRegistry};
use koinon_bridge_spool::platform_spooler;

/// Rolled log files are named `koinon-bridge.log.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "koinon-bridge.log";

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = data_dir();
    let config = BridgeConfig::load(&data_dir);
    let log_dir = data_dir.join("logs");

    // The guard flushes buffered log lines on drop; it must outlive main's
    // body.
    let _guard = init_logging(&log_dir);
    prune_logs(&log_dir, config.log_retention_days);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        data_dir = %data_dir.display(),
        "koinon print bridge starting"
    );

    let spooler = platform_spooler();
    info!(platform = spooler.platform_name(), "spooler backend selected");

    let registry = Arc::new(PrinterRegistry::new(
        spooler,
        config.default_printer_name.clone(),
    ));
    info!(
        printers = registry.list().len(),
        zebra = registry.zpl_count(),
        "printers enumerated"
    );
    if registry.zpl_count() == 0 {
        warn!("no ZPL-capable printer found; label printing will fail until one appears");
    }

    let mut server = BridgeServer::new(config, registry);
    server.start().await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
    }

    server.stop().await?;
    info!("koinon print bridge stopped");
    Ok(())
}

/// Log to stderr and to a daily-rolled file under the data directory.
fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_writer),
                )
                .init();
            Some(guard)
        }
        Err(e) => {
            // A kiosk with a broken data directory still deserves stderr logs.
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            warn!(dir = %log_dir.display(), error = %e, "log directory unavailable, logging to stderr only");
            None
        }
    }
}

/// Delete rolled log files older than the retention window.
fn prune_logs(log_dir: &Path, retention_days: u32) {
    let cutoff = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let mut pruned = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > cutoff);
        if expired {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => pruned += 1,
                Err(e) => warn!(file = %entry.path().display(), error = %e, "failed to prune log file"),
            }
        }
    }
    if pruned > 0 {
        info!(pruned, retention_days, "pruned expired log files");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn prune_removes_only_expired_bridge_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old_log = dir.path().join("koinon-bridge.log.2020-01-01");
        let other_file = dir.path().join("config.json");
        File::create(&old_log).expect("create log");
        File::create(&other_file).expect("create other");

        // Backdate the log file past any retention window.
        let ancient = SystemTime::now() - Duration::from_secs(365 * 24 * 60 * 60);
        let times = std::fs::FileTimes::new().set_modified(ancient);
        File::options()
            .write(true)
            .open(&old_log)
            .expect("open log")
            .set_times(times)
            .expect("set mtime");

        prune_logs(dir.path(), 7);

        assert!(!old_log.exists(), "expired log should be removed");
        assert!(other_file.exists(), "unrelated files must be left alone");
    }

    #[test]
    fn prune_keeps_fresh_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fresh = dir.path().join("koinon-bridge.log.2026-08-30");
        File::create(&fresh).expect("create log");

        prune_logs(dir.path(), 7);

        assert!(fresh.exists());
    }

    #[test]
    fn prune_tolerates_a_missing_directory() {
        prune_logs(Path::new("/nonexistent/koinon-logs"), 7);
    }
}
