// Virtual Global-A ECM
// Server side of the SecurityAccess handshake, used by the simulator and loopback tests

use crate::seed_key::{GLOBAL_A_SEED_TRAILER, Key, Seed, derive_key};
use crate::uds::{
    DiagnosticSession, NEGATIVE_RESPONSE_SID, NegativeResponseCode, REQUEST_SEED, SEND_KEY,
    UdsService,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// P2 / P2* server timing echoed in the session response (50 ms, 5000 ms)
const SESSION_TIMING: [u8; 4] = [0x00, 0x32, 0x01, 0xF4];

pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;
pub const DEFAULT_ECM_LOCKOUT: Duration = Duration::from_secs(10);

/// Simulated engine control module
#[derive(Debug)]
pub struct VirtualEcm {
    current_session: DiagnosticSession,
    unlocked: bool,
    pending_seed: Option<Seed>,
    failed_attempts: u32,
    lockout_until: Option<Instant>,
    rng: StdRng,

    max_failed_attempts: u32,
    lockout_duration: Duration,
    fixed_seed: Option<Seed>,
}

impl VirtualEcm {
    /// Create an ECM whose seeds come from a deterministic RNG
    pub fn new(rng_seed: u64) -> Self {
        Self {
            current_session: DiagnosticSession::DefaultSession,
            unlocked: false,
            pending_seed: None,
            failed_attempts: 0,
            lockout_until: None,
            rng: StdRng::seed_from_u64(rng_seed),
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration: DEFAULT_ECM_LOCKOUT,
            fixed_seed: None,
        }
    }

    /// Always hand out the same seed
    pub fn with_fixed_seed(mut self, seed: Seed) -> Self {
        self.fixed_seed = Some(seed);
        self
    }

    pub fn with_lockout(mut self, max_failed_attempts: u32, lockout_duration: Duration) -> Self {
        self.max_failed_attempts = max_failed_attempts;
        self.lockout_duration = lockout_duration;
        self
    }

    pub fn current_session(&self) -> DiagnosticSession {
        self.current_session
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_locked_out(&self, now: Instant) -> bool {
        matches!(self.lockout_until, Some(until) if now < until)
    }

    /// Answer one request service data unit (PCI already removed).
    ///
    /// Returns the response service data unit; every request gets one.
    pub fn handle_request(&mut self, sdu: &[u8], now: Instant) -> Vec<u8> {
        let Some(&sid) = sdu.first() else {
            return negative(0x00, NegativeResponseCode::IncorrectMessageLength);
        };

        match UdsService::from_u8(sid) {
            Some(UdsService::DiagnosticSessionControl) => self.session_control(sdu),
            Some(UdsService::TesterPresent) => {
                vec![UdsService::TesterPresent.positive_response(), sdu.get(1).copied().unwrap_or(0)]
            }
            Some(UdsService::SecurityAccess) => self.security_access(sdu, now),
            None => negative(sid, NegativeResponseCode::ServiceNotSupported),
        }
    }

    fn session_control(&mut self, sdu: &[u8]) -> Vec<u8> {
        let sid = UdsService::DiagnosticSessionControl as u8;
        let Some(&sub) = sdu.get(1) else {
            return negative(sid, NegativeResponseCode::IncorrectMessageLength);
        };

        match DiagnosticSession::from_u8(sub) {
            Some(session @ DiagnosticSession::DefaultSession)
            | Some(session @ DiagnosticSession::ExtendedDiagnosticSession) => {
                self.current_session = session;
                // a session transition always relocks the ECM
                self.unlocked = false;
                self.pending_seed = None;

                let mut response = vec![UdsService::DiagnosticSessionControl.positive_response(), sub];
                response.extend_from_slice(&SESSION_TIMING);
                response
            }
            // no reprogramming support
            Some(DiagnosticSession::ProgrammingSession) | None => {
                negative(sid, NegativeResponseCode::SubFunctionNotSupported)
            }
        }
    }

    fn security_access(&mut self, sdu: &[u8], now: Instant) -> Vec<u8> {
        let sid = UdsService::SecurityAccess as u8;

        if self.current_session == DiagnosticSession::DefaultSession {
            return negative(sid, NegativeResponseCode::ServiceNotSupportedInActiveSession);
        }

        match sdu.get(1).copied() {
            Some(REQUEST_SEED) => self.request_seed(now),
            Some(SEND_KEY) => self.verify_key(&sdu[2..], now),
            Some(_) => negative(sid, NegativeResponseCode::SubFunctionNotSupported),
            None => negative(sid, NegativeResponseCode::IncorrectMessageLength),
        }
    }

    fn request_seed(&mut self, now: Instant) -> Vec<u8> {
        let sid = UdsService::SecurityAccess as u8;
        if self.is_locked_out(now) {
            return negative(sid, NegativeResponseCode::RequiredTimeDelayNotExpired);
        }

        let mut response = vec![UdsService::SecurityAccess.positive_response(), REQUEST_SEED];

        // Already unlocked: zero seed
        if self.unlocked {
            response.extend_from_slice(&[0x00; 5]);
            return response;
        }

        let seed = match self.fixed_seed {
            Some(seed) => seed,
            None => {
                let mut bytes = [0u8; 5];
                self.rng.fill(&mut bytes[..4]);
                bytes[4] = GLOBAL_A_SEED_TRAILER;
                Seed::from_be_bytes(bytes)
            }
        };

        self.pending_seed = Some(seed);
        response.extend_from_slice(&seed.to_be_bytes());
        response
    }

    fn verify_key(&mut self, key_bytes: &[u8], now: Instant) -> Vec<u8> {
        let sid = UdsService::SecurityAccess as u8;
        if self.is_locked_out(now) {
            return negative(sid, NegativeResponseCode::RequiredTimeDelayNotExpired);
        }

        let Some(seed) = self.pending_seed else {
            return negative(sid, NegativeResponseCode::RequestSequenceError);
        };

        // a malformed key is not an attempt; the seed stays pending
        let Ok(bytes) = <[u8; 5]>::try_from(key_bytes) else {
            return negative(sid, NegativeResponseCode::IncorrectMessageLength);
        };
        self.pending_seed = None;

        if Key::from_be_bytes(bytes) == derive_key(seed) {
            self.unlocked = true;
            self.failed_attempts = 0;
            self.lockout_until = None;
            return vec![UdsService::SecurityAccess.positive_response(), SEND_KEY];
        }

        self.failed_attempts += 1;
        if self.failed_attempts >= self.max_failed_attempts {
            self.failed_attempts = 0;
            self.lockout_until = Some(now + self.lockout_duration);
            negative(sid, NegativeResponseCode::ExceededNumberOfAttempts)
        } else {
            negative(sid, NegativeResponseCode::InvalidKey)
        }
    }
}

fn negative(sid: u8, code: NegativeResponseCode) -> Vec<u8> {
    vec![NEGATIVE_RESPONSE_SID, sid, code as u8]
}
