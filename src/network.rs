use crate::types::CanFrame;
use serde::{Deserialize, Serialize};

/// Messages exchanged with the virtual CAN bus server, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetMessage {
    /// CAN frame broadcast to every connected node
    CanFrame(CanFrame),
    /// Client registration (must be the first message)
    Register { client_name: String },
    /// Acknowledgment
    Ack,
    /// Error message
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::can_ids;

    #[test]
    fn test_frame_message_json_line() {
        let frame = CanFrame::new(can_ids::ECM_REQUEST, vec![0x02, 0x27, 0x01], "TESTER".to_string());
        let json = serde_json::to_string(&NetMessage::CanFrame(frame)).unwrap();
        assert!(!json.contains('\n'));

        match serde_json::from_str::<NetMessage>(&json).unwrap() {
            NetMessage::CanFrame(decoded) => {
                assert_eq!(decoded.id, can_ids::ECM_REQUEST);
                assert_eq!(decoded.data, vec![0x02, 0x27, 0x01]);
                assert_eq!(decoded.source, "TESTER");
            }
            other => panic!("Expected CanFrame, got {:?}", other),
        }
    }
}
