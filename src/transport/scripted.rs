use super::{DiagnosticTransport, check_frame};
use crate::errors::TransportError;
use crate::types::{CanFrame, CanId, can_ids};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared record of every frame a transport was asked to send
pub type SentLog = Arc<Mutex<Vec<CanFrame>>>;

#[derive(Debug)]
enum ScriptStep {
    Frame(CanFrame),
    Silence,
    Fail(TransportError),
}

/// Simulated transport replaying a fixed sequence of bus events.
///
/// Each `receive` consumes one step; an exhausted script behaves like a silent
/// bus.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: VecDeque<ScriptStep>,
    send_failure: Option<TransportError>,
    sent: SentLog,
    shut_down: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            send_failure: None,
            sent: Arc::new(Mutex::new(Vec::new())),
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a response from the ECM response identifier
    pub fn respond(self, payload: &[u8]) -> Self {
        self.respond_from(can_ids::ECM_RESPONSE, payload)
    }

    /// Queue a frame from an arbitrary identifier
    pub fn respond_from(mut self, id: CanId, payload: &[u8]) -> Self {
        self.script.push_back(ScriptStep::Frame(CanFrame::new(
            id,
            payload.to_vec(),
            "SIM_ECM".to_string(),
        )));
        self
    }

    /// Queue one receive that times out
    pub fn silence(mut self) -> Self {
        self.script.push_back(ScriptStep::Silence);
        self
    }

    /// Queue a receive that fails at the transport layer
    pub fn fail_receive(mut self, error: TransportError) -> Self {
        self.script.push_back(ScriptStep::Fail(error));
        self
    }

    /// Make every send fail
    pub fn fail_sends(mut self, error: TransportError) -> Self {
        self.send_failure = Some(error);
        self
    }

    pub fn sent_log(&self) -> SentLog {
        Arc::clone(&self.sent)
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shut_down)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticTransport for ScriptedTransport {
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        check_frame(frame)?;
        if let Some(error) = &self.send_failure {
            return Err(error.clone());
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(frame.clone());
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        match self.script.pop_front() {
            Some(ScriptStep::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptStep::Silence) | None => Ok(None),
            Some(ScriptStep::Fail(error)) => Err(error),
        }
    }

    fn shutdown(&mut self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_replays_in_order() {
        let mut transport = ScriptedTransport::new()
            .respond(&[0x50, 0x03])
            .silence()
            .fail_receive(TransportError::Disconnected("unplugged".to_string()));

        let first = transport.receive(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(first.id, can_ids::ECM_RESPONSE);
        assert_eq!(first.data, vec![0x50, 0x03]);
        assert!(transport.receive(Duration::from_secs(1)).unwrap().is_none());
        assert!(transport.receive(Duration::from_secs(1)).is_err());
        // exhausted script is a silent bus
        assert!(transport.receive(Duration::from_secs(1)).unwrap().is_none());
    }

    #[test]
    fn test_sent_frames_are_recorded() {
        let mut transport = ScriptedTransport::new();
        let log = transport.sent_log();
        let frame = CanFrame::new(can_ids::ECM_REQUEST, vec![0x02, 0x3E, 0x01], "T".to_string());

        transport.send(&frame).unwrap();

        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data, vec![0x02, 0x3E, 0x01]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut transport = ScriptedTransport::new();
        let frame = CanFrame::new(can_ids::ECM_REQUEST, vec![0u8; 9], "T".to_string());
        assert_eq!(transport.send(&frame), Err(TransportError::FrameTooLong(9)));
    }

    #[test]
    fn test_shutdown_flag() {
        let mut transport = ScriptedTransport::new();
        let flag = transport.shutdown_flag();
        assert!(!flag.load(Ordering::SeqCst));
        transport.shutdown();
        assert!(flag.load(Ordering::SeqCst));
    }
}
