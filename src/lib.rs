pub mod audit_log;
pub mod cli;
pub mod clock;
pub mod config;
pub mod ecm;
pub mod errors;
pub mod network;
pub mod seed_key;
pub mod session;
pub mod transport;
pub mod types;
pub mod uds;

pub use audit_log::{AccessEvent, AuditLogger, verify_log_file};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SessionConfig};
pub use ecm::VirtualEcm;
pub use errors::{ObservedResponse, ParseHexError, SecurityAccessError, TransportError};
pub use network::NetMessage;
pub use seed_key::{Key, Seed, SeedKeyPair, derive_key, scan_for_seeds};
pub use session::{SecurityAccessSession, SessionState, UnlockReport};
pub use transport::{BusTransport, DiagnosticTransport, LoopbackTransport, ScriptedTransport};
pub use types::{CanFrame, CanId};
