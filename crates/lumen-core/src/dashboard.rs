//! External training-metrics viewer.

use crate::config::DashboardConfig;
use crate::error::CoreResult;
use std::path::Path;
use std::process::{Command, Stdio};

/// Spawn the viewer on `log_root` and return immediately; the child is
/// reaped on a background thread.
pub fn launch_metrics_dashboard(config: &DashboardConfig, log_root: &Path) -> CoreResult<u32> {
    let mut child = Command::new(&config.program)
        .args(&config.args)
        .arg(log_root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();
    tracing::info!(program = %config.program, pid, log_root = %log_root.display(), "launched metrics dashboard");

    std::thread::spawn(move || match child.wait() {
        Ok(status) => tracing::debug!(pid, %status, "metrics dashboard exited"),
        Err(e) => tracing::warn!(pid, error = %e, "failed to wait for metrics dashboard"),
    });
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_missing_program_is_an_error() {
        let config = DashboardConfig { program: "lumen-no-such-viewer".to_string(), args: vec![] };
        let err = launch_metrics_dashboard(&config, Path::new(".")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_returns_without_waiting() {
        let config = DashboardConfig { program: "sleep".to_string(), args: vec![] };
        let started = std::time::Instant::now();
        // `sleep 5` would block for five seconds if waited on.
        let pid = launch_metrics_dashboard(&config, Path::new("5")).unwrap();
        assert!(pid > 0);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
