//! SecurityAccess session state machine.
//!
//! Drives the tester side of the Global-A handshake over a
//! [`DiagnosticTransport`]: extended session, keep-alive, seed request, key
//! submission and the NRC 0x36 penalty wait. Every exchange is one send followed
//! by one bounded wait; nothing retries on its own.

use crate::audit_log::{AccessEvent, AuditLogger};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::errors::{ObservedResponse, SecurityAccessError, TransportError};
use crate::seed_key::{Key, Seed, derive_key};
use crate::transport::DiagnosticTransport;
use crate::types::CanFrame;
use crate::uds::{
    DiagnosticSession, NegativeResponseCode, UdsRequest, UdsResponse, UdsService, strip_pci,
};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Tester-side view of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No diagnostic session (initial)
    Closed,
    /// ECM accepted DiagnosticSessionControl 0x03
    ExtendedSessionActive,
    /// Seed received, key not yet accepted
    SeedObtained,
    /// Key accepted (terminal)
    Unlocked,
    /// Penalty served after NRC 0x36; a fresh seed may be requested
    Locked,
    /// Transport failure (terminal)
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Unlocked | SessionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Closed => "CLOSED",
            SessionState::ExtendedSessionActive => "EXTENDED_SESSION_ACTIVE",
            SessionState::SeedObtained => "SEED_OBTAINED",
            SessionState::Unlocked => "UNLOCKED",
            SessionState::Locked => "LOCKED",
            SessionState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.as_str();
        match self {
            SessionState::Unlocked => write!(f, "{}", name.green().bold()),
            SessionState::Locked => write!(f, "{}", name.yellow().bold()),
            SessionState::Failed => write!(f, "{}", name.red().bold()),
            _ => write!(f, "{}", name.cyan()),
        }
    }
}

/// Summary of a completed handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockReport {
    pub seed: Seed,
    pub key: Key,
    /// Seed did not end in 0x06
    pub atypical_seed: bool,
    pub final_state: SessionState,
}

/// One SecurityAccess session. Owns the transport until [`close`](Self::close)
/// or drop.
pub struct SecurityAccessSession<T: DiagnosticTransport, C: Clock = SystemClock> {
    transport: Option<T>,
    clock: C,
    config: SessionConfig,
    state: SessionState,
    seed: Option<Seed>,
    last_tester_present: Option<Instant>,
    audit: Option<AuditLogger>,
}

impl<T: DiagnosticTransport> SecurityAccessSession<T, SystemClock> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: DiagnosticTransport, C: Clock> SecurityAccessSession<T, C> {
    pub fn with_clock(transport: T, config: SessionConfig, clock: C) -> Self {
        Self {
            transport: Some(transport),
            clock,
            config,
            state: SessionState::Closed,
            seed: None,
            last_tester_present: None,
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Seed currently awaiting a key
    pub fn seed(&self) -> Option<Seed> {
        self.seed
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transport, while still held
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// DiagnosticSessionControl (extended). `Closed -> ExtendedSessionActive`.
    pub fn open_extended_session(&mut self) -> Result<(), SecurityAccessError> {
        self.require("open_extended_session", &[SessionState::Closed])?;

        self.send_request(UdsRequest::StartSession(
            DiagnosticSession::ExtendedDiagnosticSession,
        ))?;
        let response = self.await_response()?;
        let classified = response.as_deref().map(UdsResponse::classify);

        match classified {
            Some(UdsResponse::SessionStarted(sub))
                if sub == DiagnosticSession::ExtendedDiagnosticSession as u8 =>
            {
                self.state = SessionState::ExtendedSessionActive;
                self.audit(AccessEvent::SessionOpened {
                    request_id: self.config.request_can_id().value(),
                    response_id: self.config.response_can_id().value(),
                });
                Ok(())
            }
            _ => {
                let observed = ObservedResponse::from_payload(response);
                self.audit(AccessEvent::SessionRejected {
                    response: observed.to_string(),
                });
                Err(SecurityAccessError::SessionEstablishFailed(observed))
            }
        }
    }

    /// TesterPresent keep-alive. Fire-and-forget; the ECM's reply is skipped by
    /// the next response wait.
    pub fn send_tester_present(&mut self) -> Result<(), SecurityAccessError> {
        if matches!(self.state, SessionState::Closed | SessionState::Failed) {
            return Err(SecurityAccessError::InvalidState {
                operation: "send_tester_present",
                state: self.state,
            });
        }

        self.send_request(UdsRequest::TesterPresent)?;
        self.last_tester_present = Some(self.clock.now());
        self.audit(AccessEvent::KeepAlive);
        Ok(())
    }

    /// Whether the keep-alive interval has run out since the last tester present
    pub fn tester_present_due(&self) -> bool {
        match self.last_tester_present {
            Some(sent_at) => {
                self.clock.now().saturating_duration_since(sent_at)
                    >= self.config.tester_present_interval()
            }
            None => true,
        }
    }

    /// SecurityAccess request seed. `ExtendedSessionActive | Locked -> SeedObtained`.
    ///
    /// Failure leaves the state untouched so the caller may ask again.
    pub fn request_seed(&mut self) -> Result<Seed, SecurityAccessError> {
        self.require(
            "request_seed",
            &[SessionState::ExtendedSessionActive, SessionState::Locked],
        )?;

        self.send_request(UdsRequest::RequestSeed)?;
        let response = self.await_response()?;
        let classified = response.as_deref().map(UdsResponse::classify);

        match classified {
            Some(UdsResponse::SeedDelivered(seed)) => {
                self.seed = Some(seed);
                self.state = SessionState::SeedObtained;
                self.audit(AccessEvent::SeedReceived {
                    seed: seed.to_string(),
                    typical: seed.is_global_a_typical(),
                });
                Ok(seed)
            }
            _ => {
                let observed = ObservedResponse::from_payload(response);
                self.audit(AccessEvent::SeedRequestFailed {
                    response: observed.to_string(),
                });
                Err(SecurityAccessError::SeedRequestFailed(observed))
            }
        }
    }

    /// SecurityAccess send key. Only valid from `SeedObtained`.
    ///
    /// On NRC 0x36 this blocks for the configured lockout delay before returning
    /// `LockedOut`, leaving the session in `Locked`.
    pub fn submit_key(&mut self, key: Key) -> Result<(), SecurityAccessError> {
        self.require("submit_key", &[SessionState::SeedObtained])?;

        self.send_request(UdsRequest::SendKey(key))?;
        self.audit(AccessEvent::KeySubmitted {
            key: key.to_string(),
        });
        let response = self.await_response()?;
        let classified = response.as_deref().map(UdsResponse::classify);

        match classified {
            Some(UdsResponse::KeyAccepted) => {
                self.seed = None;
                self.state = SessionState::Unlocked;
                self.audit(AccessEvent::Unlocked);
                Ok(())
            }
            Some(ref r)
                if r.is_negative(UdsService::SecurityAccess, NegativeResponseCode::InvalidKey) =>
            {
                self.seed = None;
                self.state = SessionState::ExtendedSessionActive;
                self.audit(AccessEvent::KeyRejected);
                Err(SecurityAccessError::InvalidKey)
            }
            Some(ref r)
                if r.is_negative(
                    UdsService::SecurityAccess,
                    NegativeResponseCode::ExceededNumberOfAttempts,
                ) =>
            {
                let delay = self.config.lockout_delay();
                self.seed = None;
                self.state = SessionState::Locked;
                self.audit(AccessEvent::LockoutEntered {
                    delay_ms: delay.as_millis() as u64,
                });
                self.clock.sleep(delay);
                Err(SecurityAccessError::LockedOut { delay })
            }
            _ => {
                let observed = ObservedResponse::from_payload(response);
                self.audit(AccessEvent::UnexpectedResponse {
                    response: observed.to_string(),
                });
                Err(SecurityAccessError::UnexpectedResponse(observed))
            }
        }
    }

    /// Open, keep alive, fetch the seed, derive the key and submit it.
    ///
    /// The transport is released before returning, whatever the outcome.
    pub fn unlock(&mut self) -> Result<UnlockReport, SecurityAccessError> {
        let result = self.run_handshake(None);
        self.close();
        result
    }

    /// Same flow as [`unlock`](Self::unlock) but submits a caller-supplied key
    pub fn unlock_with_key(&mut self, key: Key) -> Result<UnlockReport, SecurityAccessError> {
        let result = self.run_handshake(Some(key));
        self.close();
        result
    }

    /// Release the transport. Idempotent.
    pub fn close(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        transport.shutdown();

        if !self.state.is_terminal() {
            self.state = SessionState::Closed;
        }
        self.seed = None;
        self.audit(AccessEvent::SessionClosed {
            final_state: self.state.as_str().to_string(),
        });
    }

    fn run_handshake(&mut self, key: Option<Key>) -> Result<UnlockReport, SecurityAccessError> {
        self.open_extended_session()?;
        self.send_tester_present()?;
        let seed = self.request_seed()?;
        let key = key.unwrap_or_else(|| derive_key(seed));
        self.submit_key(key)?;

        Ok(UnlockReport {
            seed,
            key,
            atypical_seed: !seed.is_global_a_typical(),
            final_state: self.state,
        })
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SecurityAccessError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SecurityAccessError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn send_request(&mut self, request: UdsRequest) -> Result<(), SecurityAccessError> {
        let frame = CanFrame::new(
            self.config.request_can_id(),
            request.encode(),
            self.config.client_name.clone(),
        );

        let result = match self.transport.as_mut() {
            Some(transport) => transport.send(&frame),
            None => return Err(TransportError::Closed.into()),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Wait for the next ECM response payload (PCI stripped).
    ///
    /// Foreign identifiers and tester present replies (positive or negative)
    /// are skipped; `None` means the response timeout ran out.
    fn await_response(&mut self) -> Result<Option<Vec<u8>>, SecurityAccessError> {
        let deadline = self.clock.now() + self.config.response_timeout();
        let response_id = self.config.response_can_id();

        loop {
            let now = self.clock.now();
            if now >= deadline {
                return Ok(None);
            }

            let received = match self.transport.as_mut() {
                Some(transport) => transport.receive(deadline - now),
                None => return Err(TransportError::Closed.into()),
            };

            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(e)),
            };

            if frame.id != response_id {
                continue;
            }
            let sdu = strip_pci(&frame.data);
            if is_tester_present_reply(&UdsResponse::classify(sdu)) {
                continue;
            }
            return Ok(Some(sdu.to_vec()));
        }
    }

    fn fail(&mut self, error: TransportError) -> SecurityAccessError {
        self.state = SessionState::Failed;
        self.audit(AccessEvent::TransportFailure {
            reason: error.to_string(),
        });
        self.close();
        SecurityAccessError::Transport(error)
    }

    fn audit(&self, event: AccessEvent) {
        if let Some(logger) = &self.audit {
            logger.log_event(event);
        }
    }
}

/// Either answer to a keep-alive. Neither is awaited, so both are stale by the
/// time a later request waits.
fn is_tester_present_reply(response: &UdsResponse) -> bool {
    match response {
        UdsResponse::TesterPresentAck => true,
        UdsResponse::Negative { service, .. } => *service == UdsService::TesterPresent as u8,
        _ => false,
    }
}

impl<T: DiagnosticTransport, C: Clock> Drop for SecurityAccessSession<T, C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: DiagnosticTransport, C: Clock> fmt::Debug for SecurityAccessSession<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityAccessSession")
            .field("state", &self.state)
            .field("seed", &self.seed)
            .field("transport_held", &self.transport.is_some())
            .finish()
    }
}
