// UDS (Unified Diagnostic Services) - ISO 14229
// Wire encoding for the subset used by the Global-A security access handshake

use crate::seed_key::{Key, Seed};
use serde::{Deserialize, Serialize};

/// Added to a service ID to form its positive response ID
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// First byte of every negative response
pub const NEGATIVE_RESPONSE_SID: u8 = 0x7F;

/// SecurityAccess sub-function: request seed (level 1)
pub const REQUEST_SEED: u8 = 0x01;

/// SecurityAccess sub-function: send key (level 1)
pub const SEND_KEY: u8 = 0x02;

/// Sub-function carried by the Global-A tester present request
pub const TESTER_PRESENT_SUB_FUNCTION: u8 = 0x01;

/// UDS Service IDs (ISO 14229-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UdsService {
    DiagnosticSessionControl = 0x10,
    SecurityAccess = 0x27,
    TesterPresent = 0x3E,
}

impl UdsService {
    pub fn from_u8(sid: u8) -> Option<Self> {
        match sid {
            0x10 => Some(UdsService::DiagnosticSessionControl),
            0x27 => Some(UdsService::SecurityAccess),
            0x3E => Some(UdsService::TesterPresent),
            _ => None,
        }
    }

    pub fn positive_response(self) -> u8 {
        self as u8 + POSITIVE_RESPONSE_OFFSET
    }
}

/// Diagnostic session types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiagnosticSession {
    DefaultSession = 0x01,
    ProgrammingSession = 0x02,
    ExtendedDiagnosticSession = 0x03,
}

impl DiagnosticSession {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(DiagnosticSession::DefaultSession),
            0x02 => Some(DiagnosticSession::ProgrammingSession),
            0x03 => Some(DiagnosticSession::ExtendedDiagnosticSession),
            _ => None,
        }
    }
}

/// UDS negative response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NegativeResponseCode {
    GeneralReject = 0x10,
    ServiceNotSupported = 0x11,
    SubFunctionNotSupported = 0x12,
    IncorrectMessageLength = 0x13,
    ConditionsNotCorrect = 0x22,
    RequestSequenceError = 0x24,
    RequestOutOfRange = 0x31,
    SecurityAccessDenied = 0x33,
    InvalidKey = 0x35,
    ExceededNumberOfAttempts = 0x36,
    RequiredTimeDelayNotExpired = 0x37,
    ServiceNotSupportedInActiveSession = 0x7F,
}

impl NegativeResponseCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        use NegativeResponseCode::*;
        let nrc = match code {
            0x10 => GeneralReject,
            0x11 => ServiceNotSupported,
            0x12 => SubFunctionNotSupported,
            0x13 => IncorrectMessageLength,
            0x22 => ConditionsNotCorrect,
            0x24 => RequestSequenceError,
            0x31 => RequestOutOfRange,
            0x33 => SecurityAccessDenied,
            0x35 => InvalidKey,
            0x36 => ExceededNumberOfAttempts,
            0x37 => RequiredTimeDelayNotExpired,
            0x7F => ServiceNotSupportedInActiveSession,
            _ => return None,
        };
        Some(nrc)
    }
}

/// Requests the tester issues, encoded as single-frame ISO-TP payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdsRequest {
    StartSession(DiagnosticSession),
    TesterPresent,
    RequestSeed,
    SendKey(Key),
}

impl UdsRequest {
    /// Service data unit without the PCI length byte
    pub fn service_data(&self) -> Vec<u8> {
        match self {
            UdsRequest::StartSession(session) => {
                vec![UdsService::DiagnosticSessionControl as u8, *session as u8]
            }
            UdsRequest::TesterPresent => {
                vec![UdsService::TesterPresent as u8, TESTER_PRESENT_SUB_FUNCTION]
            }
            UdsRequest::RequestSeed => vec![UdsService::SecurityAccess as u8, REQUEST_SEED],
            UdsRequest::SendKey(key) => {
                let mut sdu = vec![UdsService::SecurityAccess as u8, SEND_KEY];
                sdu.extend_from_slice(&key.to_be_bytes());
                sdu
            }
        }
    }

    /// Frame payload: PCI length byte followed by the service data
    pub fn encode(&self) -> Vec<u8> {
        let sdu = self.service_data();
        let mut payload = Vec::with_capacity(sdu.len() + 1);
        payload.push(sdu.len() as u8);
        payload.extend_from_slice(&sdu);
        payload
    }
}

/// Classified ECM response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsResponse {
    SessionStarted(u8),
    SeedDelivered(Seed),
    KeyAccepted,
    TesterPresentAck,
    Negative { service: u8, code: u8 },
    Unrecognized,
}

impl UdsResponse {
    pub fn classify(sdu: &[u8]) -> Self {
        const SESSION_OK: u8 = UdsService::DiagnosticSessionControl as u8 + POSITIVE_RESPONSE_OFFSET;
        const SECURITY_OK: u8 = UdsService::SecurityAccess as u8 + POSITIVE_RESPONSE_OFFSET;
        const TESTER_OK: u8 = UdsService::TesterPresent as u8 + POSITIVE_RESPONSE_OFFSET;

        match sdu {
            [SESSION_OK, sub, ..] => UdsResponse::SessionStarted(*sub),
            [SECURITY_OK, REQUEST_SEED, a, b, c, d, e, ..] => {
                UdsResponse::SeedDelivered(Seed::from_be_bytes([*a, *b, *c, *d, *e]))
            }
            [SECURITY_OK, SEND_KEY, ..] => UdsResponse::KeyAccepted,
            [TESTER_OK, ..] => UdsResponse::TesterPresentAck,
            [NEGATIVE_RESPONSE_SID, service, code, ..] => UdsResponse::Negative {
                service: *service,
                code: *code,
            },
            _ => UdsResponse::Unrecognized,
        }
    }

    pub fn is_negative(&self, service: UdsService, code: NegativeResponseCode) -> bool {
        matches!(self, UdsResponse::Negative { service: s, code: c }
            if *s == service as u8 && *c == code as u8)
    }
}

/// Drop a leading ISO-TP single-frame PCI byte when one is present.
///
/// Response SIDs are all >= 0x50, so a first byte in 1..=7 that fits the frame
/// is unambiguous.
pub fn strip_pci(data: &[u8]) -> &[u8] {
    match data.first() {
        Some(&len) if (1..=7).contains(&len) && data.len() > len as usize => {
            &data[1..=len as usize]
        }
        _ => data,
    }
}

pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        assert_eq!(
            UdsRequest::StartSession(DiagnosticSession::ExtendedDiagnosticSession).encode(),
            vec![0x02, 0x10, 0x03]
        );
        assert_eq!(UdsRequest::TesterPresent.encode(), vec![0x02, 0x3E, 0x01]);
        assert_eq!(UdsRequest::RequestSeed.encode(), vec![0x02, 0x27, 0x01]);
        assert_eq!(
            UdsRequest::SendKey(Key::new(0x1D1E82E706)).encode(),
            vec![0x07, 0x27, 0x02, 0x1D, 0x1E, 0x82, 0xE7, 0x06]
        );
    }

    #[test]
    fn test_classify_positive_responses() {
        assert_eq!(
            UdsResponse::classify(&[0x50, 0x03, 0x00, 0x32, 0x01, 0xF4]),
            UdsResponse::SessionStarted(0x03)
        );
        assert_eq!(
            UdsResponse::classify(&[0x67, 0x01, 0xA3, 0xA3, 0x85, 0x9E, 0x06]),
            UdsResponse::SeedDelivered(Seed::new(0xA3A3859E06))
        );
        assert_eq!(UdsResponse::classify(&[0x67, 0x02]), UdsResponse::KeyAccepted);
        assert_eq!(UdsResponse::classify(&[0x7E, 0x01]), UdsResponse::TesterPresentAck);
    }

    #[test]
    fn test_classify_short_seed_is_unrecognized() {
        assert_eq!(
            UdsResponse::classify(&[0x67, 0x01, 0xA3, 0xA3]),
            UdsResponse::Unrecognized
        );
        assert_eq!(UdsResponse::classify(&[]), UdsResponse::Unrecognized);
    }

    #[test]
    fn test_classify_negative_responses() {
        let invalid = UdsResponse::classify(&[0x7F, 0x27, 0x35]);
        assert!(invalid.is_negative(UdsService::SecurityAccess, NegativeResponseCode::InvalidKey));

        let lockout = UdsResponse::classify(&[0x7F, 0x27, 0x36]);
        assert!(lockout.is_negative(
            UdsService::SecurityAccess,
            NegativeResponseCode::ExceededNumberOfAttempts
        ));
        assert!(!lockout.is_negative(UdsService::SecurityAccess, NegativeResponseCode::InvalidKey));
    }

    #[test]
    fn test_strip_pci() {
        assert_eq!(strip_pci(&[0x02, 0x50, 0x03]), &[0x50, 0x03]);
        assert_eq!(strip_pci(&[0x02, 0x50, 0x03, 0xAA, 0xAA]), &[0x50, 0x03]);
        assert_eq!(strip_pci(&[0x50, 0x03]), &[0x50, 0x03]);
        assert_eq!(strip_pci(&[0x7F, 0x27, 0x35]), &[0x7F, 0x27, 0x35]);
        // length byte larger than the frame is not a PCI
        assert_eq!(strip_pci(&[0x07, 0x27]), &[0x07, 0x27]);
    }

    #[test]
    fn test_nrc_lookup() {
        assert_eq!(
            NegativeResponseCode::from_u8(0x36),
            Some(NegativeResponseCode::ExceededNumberOfAttempts)
        );
        assert_eq!(NegativeResponseCode::from_u8(0x99), None);
        assert_eq!(UdsService::SecurityAccess.positive_response(), 0x67);
    }
}
