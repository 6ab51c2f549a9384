//! Test doubles shared by the unit tests.

use bustrack_protocol::ClientFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::traits::{Outbound, TransportError};

/// Records every frame it is given.
pub(crate) struct RecordingLink {
    open: AtomicBool,
    sent: Mutex<Vec<ClientFrame>>,
}

impl RecordingLink {
    pub(crate) fn open() -> Self {
        Self {
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn closed() -> Self {
        let link = Self::open();
        link.set_open(false);
        link
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<ClientFrame> {
        self.sent.lock().unwrap().clone()
    }
}

impl Outbound for RecordingLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }
}
