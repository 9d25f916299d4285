use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn session_start(&self, _host: &str, _port: u16) {}
    fn open_sent(&self, _path: &Path, _bytes: u64) {}
    fn save_applied(&self, _token: &str, _bytes: u64) {}
    fn close_received(&self, _token: &str) {}
    fn payload_error(&self, _token: &str, _msg: &str) {}
    fn session_end(&self) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Appends one JSON object per session event to a log file.
pub struct JsonlLogger {
    file: Mutex<File>,
}

impl JsonlLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn entry(&self, event: &str, target: Option<&str>, bytes: Option<u64>, error: Option<&str>) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event,
            target,
            bytes,
            error,
        };
        if let Ok(line) = serde_json::to_string(&entry) {
            if let Ok(mut f) = self.file.lock() {
                let _ = writeln!(f, "{}", line);
            }
        }
    }
}

impl Logger for JsonlLogger {
    fn session_start(&self, host: &str, port: u16) {
        let endpoint = format!("{}:{}", host, port);
        self.entry("session_start", Some(&endpoint), None, None);
    }
    fn open_sent(&self, path: &Path, bytes: u64) {
        let p = path.to_string_lossy();
        self.entry("open_sent", Some(p.as_ref()), Some(bytes), None);
    }
    fn save_applied(&self, token: &str, bytes: u64) {
        self.entry("save_applied", Some(token), Some(bytes), None);
    }
    fn close_received(&self, token: &str) {
        self.entry("close_received", Some(token), None, None);
    }
    fn payload_error(&self, token: &str, msg: &str) {
        self.entry("payload_error", Some(token), None, Some(msg));
    }
    fn session_end(&self) {
        self.entry("session_end", None, None, None);
    }
}
