// src/logging.rs
//
// Timestamped stderr logging with optional file mirroring. stdout carries
// the MCP protocol, so every diagnostic line goes to stderr; nothing here
// may ever print to stdout.

use std::path::Path;
use std::sync::Mutex;

/// Global log file handle. When `Some`, `tlog!` mirrors every line here.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// `HH:MM:SS.mmm` local-time stamp prefixed to every log line.
pub(crate) fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Timestamped logging macro. Writes `HH:MM:SS.mmm <message>` to stderr and,
/// when file logging is active, the same line to the log file.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!("{} {}", $crate::logging::timestamp(), format_args!($($arg)*));
        eprintln!("{}", msg);
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

/// Start mirroring logs into `log_dir`: one timestamped file per run, plus a
/// `nixtap.log` symlink pointing at the latest run (Unix only).
pub(crate) fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-nixtap.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    // Windows symlinks require elevated privileges, so the latest-run link
    // is Unix only.
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join("nixtap.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!("{} [logging] Failed to create nixtap.log symlink: {}", timestamp(), e);
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    tlog!("[logging] File logging started: {}", log_path.display());
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        // HH:MM:SS.mmm
        assert_eq!(ts.len(), 12);
        assert_eq!(&ts[2..3], ":");
        assert_eq!(&ts[5..6], ":");
        assert_eq!(&ts[8..9], ".");
    }

    #[test]
    fn test_init_creates_log_file_and_symlink() {
        let dir = tempfile::tempdir().unwrap();
        init_file_logging(dir.path()).unwrap();
        // Drop the global handle so it does not outlive the tempdir.
        if let Ok(mut guard) = LOG_FILE.lock() {
            *guard = None;
        }

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("-nixtap.log")));
        #[cfg(unix)]
        assert!(names.iter().any(|n| n == "nixtap.log"));
    }
}
