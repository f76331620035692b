/// Security Access Audit Log
///
/// Tamper-evident record of every handshake step. Each entry carries the hash of
/// the previous entry, so edited, dropped or reordered lines are detectable.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Handshake events worth keeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum AccessEvent {
    /// Extended diagnostic session accepted by the ECM
    SessionOpened { request_id: u32, response_id: u32 },

    /// Session request failed
    SessionRejected { response: String },

    /// Tester present sent
    KeepAlive,

    /// Seed delivered by the ECM
    SeedReceived { seed: String, typical: bool },

    /// Seed request failed
    SeedRequestFailed { response: String },

    /// Key put on the bus
    KeySubmitted { key: String },

    /// ECM accepted the key
    Unlocked,

    /// ECM answered NRC 0x35
    KeyRejected,

    /// ECM answered NRC 0x36, penalty delay started
    LockoutEntered { delay_ms: u64 },

    /// Key submission answered with something unexpected
    UnexpectedResponse { response: String },

    /// Transport failed, session aborted
    TransportFailure { reason: String },

    /// Transport released
    SessionClosed { final_state: String },
}

/// A single entry in the audit log with tamper-resistant chaining
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Sequential entry number
    pub sequence: u64,

    /// Timestamp of the event
    pub timestamp: DateTime<Utc>,

    /// Tester that generated this entry
    pub tester_id: String,

    /// The event
    pub event: AccessEvent,

    /// Hash of the previous entry (empty for first entry)
    pub prev_hash: String,

    /// Hash of this entry
    pub entry_hash: String,
}

impl AuditLogEntry {
    fn new(sequence: u64, tester_id: String, event: AccessEvent, prev_hash: String) -> Self {
        let timestamp = Utc::now();
        let entry_hash = Self::compute_hash(sequence, &timestamp, &tester_id, &event, &prev_hash);

        Self {
            sequence,
            timestamp,
            tester_id,
            event,
            prev_hash,
            entry_hash,
        }
    }

    fn compute_hash(
        sequence: u64,
        timestamp: &DateTime<Utc>,
        tester_id: &str,
        event: &AccessEvent,
        prev_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_le_bytes());
        hasher.update(timestamp.to_rfc3339().as_bytes());
        hasher.update(tester_id.as_bytes());
        hasher.update(serde_json::to_string(event).unwrap_or_default().as_bytes());
        hasher.update(prev_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Verify this entry's hash is correct
    pub fn verify_hash(&self) -> bool {
        Self::compute_hash(
            self.sequence,
            &self.timestamp,
            &self.tester_id,
            &self.event,
            &self.prev_hash,
        ) == self.entry_hash
    }

    /// Verify chain link to previous entry
    pub fn verify_chain(&self, prev_entry: &AuditLogEntry) -> bool {
        self.prev_hash == prev_entry.entry_hash && self.sequence == prev_entry.sequence + 1
    }
}

#[derive(Debug)]
struct ChainState {
    sequence: u64,
    last_hash: String,
}

/// Audit logger appending JSONL entries to `<dir>/<tester>_<timestamp>.jsonl`
#[derive(Clone)]
pub struct AuditLogger {
    tester_id: String,
    log_path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
    chain: Arc<Mutex<ChainState>>,
}

impl AuditLogger {
    /// Create a new audit logger (default directory: ./security_logs/)
    pub fn new(tester_id: String, log_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let log_dir = log_dir.unwrap_or_else(|| PathBuf::from("security_logs"));
        std::fs::create_dir_all(&log_dir)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let log_path = log_dir.join(format!("{}_{}.jsonl", tester_id, timestamp));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            tester_id,
            log_path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            chain: Arc::new(Mutex::new(ChainState {
                sequence: 0,
                last_hash: String::new(),
            })),
        })
    }

    /// Append an event. Write failures are swallowed: auditing never aborts a handshake.
    pub fn log_event(&self, event: AccessEvent) {
        let Ok(mut chain) = self.chain.lock() else {
            return;
        };

        let entry = AuditLogEntry::new(
            chain.sequence,
            self.tester_id.clone(),
            event,
            chain.last_hash.clone(),
        );
        chain.sequence += 1;
        chain.last_hash = entry.entry_hash.clone();

        if let Ok(mut writer) = self.writer.lock()
            && let Ok(json) = serde_json::to_string(&entry)
        {
            let _ = writeln!(writer, "{}", json);
            let _ = writer.flush();
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Number of entries written so far
    pub fn sequence(&self) -> u64 {
        self.chain.lock().map(|chain| chain.sequence).unwrap_or(0)
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("tester_id", &self.tester_id)
            .field("log_path", &self.log_path)
            .finish()
    }
}

/// Result of log verification
#[derive(Debug)]
pub struct VerificationResult {
    pub total_entries: usize,
    pub verified: bool,
    pub issues: Vec<String>,
}

/// Verify integrity of an entire log file
pub fn verify_log_file(log_path: &Path) -> Result<VerificationResult, String> {
    use std::io::{BufRead, BufReader};

    let file = File::open(log_path).map_err(|e| format!("Failed to open log: {}", e))?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Line {} read error: {}", line_num + 1, e))?;
        let entry: AuditLogEntry = serde_json::from_str(&line)
            .map_err(|e| format!("Line {} parse error: {}", line_num + 1, e))?;
        entries.push(entry);
    }

    let mut issues = Vec::new();

    if let Some(first) = entries.first()
        && !first.prev_hash.is_empty()
    {
        issues.push(format!(
            "Entry 0: First entry should have empty prev_hash, got '{}'",
            first.prev_hash
        ));
    }

    for (i, entry) in entries.iter().enumerate() {
        if !entry.verify_hash() {
            issues.push(format!("Entry {}: Hash verification failed (tampered)", i));
        }
        if entry.sequence != i as u64 {
            issues.push(format!(
                "Entry {}: Expected sequence {}, got {}",
                i, i, entry.sequence
            ));
        }
    }

    for (i, pair) in entries.windows(2).enumerate() {
        if !pair[1].verify_chain(&pair[0]) {
            issues.push(format!(
                "Entry {}: Chain verification failed (missing or reordered entry)",
                i + 1
            ));
        }
    }

    Ok(VerificationResult {
        total_entries: entries.len(),
        verified: issues.is_empty(),
        issues,
    })
}
