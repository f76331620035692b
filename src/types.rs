use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CAN Frame identifier (11-bit standard or 29-bit extended)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanId {
    Standard(u16), // 11-bit (0x000 - 0x7FF)
    Extended(u32), // 29-bit (0x00000000 - 0x1FFFFFFF)
}

impl CanId {
    pub fn value(&self) -> u32 {
        match self {
            CanId::Standard(id) => *id as u32,
            CanId::Extended(id) => *id,
        }
    }
}

/// Diagnostic addressing used by Global-A engine control modules
pub mod can_ids {
    use super::CanId;

    /// Physical request identifier (tester -> ECM)
    pub const ECM_REQUEST: CanId = CanId::Standard(0x7E0);
    /// Physical response identifier (ECM -> tester)
    pub const ECM_RESPONSE: CanId = CanId::Standard(0x7E8);
}

/// CAN Frame - standard CAN 2.0B format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanFrame {
    pub id: CanId,
    pub data: Vec<u8>, // 0-8 bytes
    pub timestamp: DateTime<Utc>,
    pub source: String, // node identifier
}

impl CanFrame {
    pub fn new(id: CanId, data: Vec<u8>, source: String) -> Self {
        Self {
            id,
            data,
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.data.len() <= 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_ids_are_standard() {
        assert_eq!(can_ids::ECM_REQUEST.value(), 0x7E0);
        assert_eq!(can_ids::ECM_RESPONSE.value(), 0x7E8);
        assert!(matches!(can_ids::ECM_REQUEST, CanId::Standard(_)));
    }

    #[test]
    fn test_frame_length_validation() {
        let ok = CanFrame::new(can_ids::ECM_REQUEST, vec![0x02, 0x10, 0x03], "T".to_string());
        assert!(ok.is_valid());

        let too_long = CanFrame::new(can_ids::ECM_REQUEST, vec![0u8; 9], "T".to_string());
        assert!(!too_long.is_valid());
    }
}
