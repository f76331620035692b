use super::{DiagnosticTransport, check_frame};
use crate::clock::Clock;
use crate::ecm::VirtualEcm;
use crate::errors::TransportError;
use crate::types::{CanFrame, CanId, can_ids};
use crate::uds::strip_pci;
use std::collections::VecDeque;
use std::time::Duration;

/// In-process transport wired straight to a [`VirtualEcm`].
///
/// Requests addressed to the ECM are answered immediately; the responses queue up
/// until received.
#[derive(Debug)]
pub struct LoopbackTransport<C: Clock> {
    ecm: VirtualEcm,
    clock: C,
    request_id: CanId,
    response_id: CanId,
    pending: VecDeque<CanFrame>,
    shut_down: bool,
}

impl<C: Clock> LoopbackTransport<C> {
    pub fn new(ecm: VirtualEcm, clock: C) -> Self {
        Self {
            ecm,
            clock,
            request_id: can_ids::ECM_REQUEST,
            response_id: can_ids::ECM_RESPONSE,
            pending: VecDeque::new(),
            shut_down: false,
        }
    }

    pub fn ecm(&self) -> &VirtualEcm {
        &self.ecm
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<C: Clock> DiagnosticTransport for LoopbackTransport<C> {
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        if self.shut_down {
            return Err(TransportError::Closed);
        }
        check_frame(frame)?;
        if frame.id != self.request_id {
            return Ok(());
        }

        let response = self.ecm.handle_request(strip_pci(&frame.data), self.clock.now());
        self.pending
            .push_back(CanFrame::new(self.response_id, response, "VIRTUAL_ECM".to_string()));
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        if self.shut_down {
            return Err(TransportError::Closed);
        }
        Ok(self.pending.pop_front())
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_request_answered_by_ecm() {
        let mut transport = LoopbackTransport::new(VirtualEcm::new(1), ManualClock::new());
        let request = CanFrame::new(can_ids::ECM_REQUEST, vec![0x02, 0x10, 0x03], "T".to_string());

        transport.send(&request).unwrap();
        let response = transport.receive(Duration::from_secs(1)).unwrap().unwrap();

        assert_eq!(response.id, can_ids::ECM_RESPONSE);
        assert_eq!(&response.data[..2], &[0x50, 0x03]);
        assert!(transport.receive(Duration::from_secs(1)).unwrap().is_none());
    }

    #[test]
    fn test_foreign_identifier_ignored() {
        let mut transport = LoopbackTransport::new(VirtualEcm::new(1), ManualClock::new());
        let other = CanFrame::new(CanId::Standard(0x7E1), vec![0x02, 0x10, 0x03], "T".to_string());

        transport.send(&other).unwrap();
        assert!(transport.receive(Duration::from_secs(1)).unwrap().is_none());
    }

    #[test]
    fn test_closed_after_shutdown() {
        let mut transport = LoopbackTransport::new(VirtualEcm::new(1), ManualClock::new());
        transport.shutdown();
        assert!(transport.is_shut_down());
        assert!(matches!(
            transport.receive(Duration::from_secs(1)),
            Err(TransportError::Closed)
        ));
    }
}
