//! Channel between the device collaborator and the warning pipeline.
//!
//! The Bluetooth manager (or any other transport) holds a [`FrameSender`] and
//! pushes [`DeviceFrame`]s into a bounded queue. The pipeline side drains the
//! queue from [`DeviceLink::receiver`]. Pairing, reconnection and transport
//! framing stay on the device side.

use crate::device::types::DeviceFrame;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Default queue capacity between the device and the pipeline.
pub const DEFAULT_LINK_CAPACITY: usize = 10_000;

/// Errors surfaced to the device side of the link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Device link is already connected")]
    AlreadyConnected,

    #[error("Device link is not connected")]
    NotConnected,

    #[error("Device link queue is full")]
    QueueFull,
}

/// Bounded frame queue with connection state.
pub struct DeviceLink {
    sender: Sender<DeviceFrame>,
    receiver: Receiver<DeviceFrame>,
    connected: Arc<AtomicBool>,
}

impl DeviceLink {
    /// Create a new link with the given queue capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the device as connected so frames are accepted.
    pub fn connect(&self) -> Result<(), LinkError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(LinkError::AlreadyConnected);
        }
        Ok(())
    }

    /// Mark the device as disconnected. Queued frames remain readable.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handle for the device side.
    pub fn sender(&self) -> FrameSender {
        FrameSender {
            sender: self.sender.clone(),
            connected: self.connected.clone(),
        }
    }

    /// Get the receiver for device frames.
    pub fn receiver(&self) -> &Receiver<DeviceFrame> {
        &self.receiver
    }

    /// Try to receive a frame without blocking.
    pub fn try_recv(&self) -> Option<DeviceFrame> {
        self.receiver.try_recv().ok()
    }

    /// True once the device has disconnected and every queued frame is drained.
    pub fn is_exhausted(&self) -> bool {
        !self.is_connected() && self.receiver.is_empty()
    }
}

impl Default for DeviceLink {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_CAPACITY)
    }
}

/// Device-side handle for delivering frames.
#[derive(Clone)]
pub struct FrameSender {
    sender: Sender<DeviceFrame>,
    connected: Arc<AtomicBool>,
}

impl FrameSender {
    /// Deliver a frame without blocking.
    pub fn deliver(&self, frame: DeviceFrame) -> Result<(), LinkError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LinkError::NotConnected);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::QueueFull,
            TrySendError::Disconnected(_) => LinkError::NotConnected,
        })
    }

    /// Deliver a frame, waiting for queue space.
    pub fn deliver_blocking(&self, frame: DeviceFrame) -> Result<(), LinkError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LinkError::NotConnected);
        }
        self.sender
            .send(frame)
            .map_err(|_| LinkError::NotConnected)
    }

    /// Signal that the device went away.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::BiometricData;
    use chrono::Utc;

    fn frame() -> DeviceFrame {
        DeviceFrame::new("sess", BiometricData::new(70.0, 50.0, 20.0, Utc::now()))
    }

    #[test]
    fn test_deliver_requires_connection() {
        let link = DeviceLink::new(4);
        let sender = link.sender();

        assert_eq!(sender.deliver(frame()), Err(LinkError::NotConnected));

        link.connect().unwrap();
        assert!(sender.deliver(frame()).is_ok());
        assert!(link.try_recv().is_some());
    }

    #[test]
    fn test_connect_twice() {
        let link = DeviceLink::new(4);
        link.connect().unwrap();
        assert_eq!(link.connect(), Err(LinkError::AlreadyConnected));
    }

    #[test]
    fn test_queue_full() {
        let link = DeviceLink::new(1);
        link.connect().unwrap();
        let sender = link.sender();

        sender.deliver(frame()).unwrap();
        assert_eq!(sender.deliver(frame()), Err(LinkError::QueueFull));
    }

    #[test]
    fn test_exhausted_after_disconnect_and_drain() {
        let link = DeviceLink::new(4);
        link.connect().unwrap();
        let sender = link.sender();
        sender.deliver(frame()).unwrap();
        sender.disconnect();

        assert!(!link.is_exhausted());
        link.try_recv();
        assert!(link.is_exhausted());
    }
}
