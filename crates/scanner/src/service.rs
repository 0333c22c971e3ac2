use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::TaxonomyConfig;
use crate::scan::Scanner;

/// Scans on a fixed interval until interrupted. A failed scan is logged and
/// the loop keeps going; the next interval gets a fresh session.
pub async fn run_service(scanner: &Scanner, config: &TaxonomyConfig, root: &Path) {
    let hours = config.scan_interval_hours.max(1);
    let interval = Duration::from_secs(hours * 3600);
    info!("Service mode: scanning {:?} every {} hours", root, hours);

    loop {
        match scanner.scan_directory(root, config.scan_limit).await {
            Ok(outcome) => info!(
                "Scan session {} finished: {} analyzed, {} classified, {} duplicates, {} errors",
                outcome.session_id,
                outcome.files_analyzed,
                outcome.files_classified,
                outcome.duplicates_found,
                outcome.errors
            ),
            Err(err) => warn!("Scan failed: {}", err),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_signal() => {
                info!("Shutdown signal received.");
                return;
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }
}
