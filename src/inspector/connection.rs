use crate::inspector::target::{FrontendChannel, InspectionTarget, TargetIdentifier};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Active debug session between the connected remote client and one target.
pub struct ConnectionBridge {
    target: Weak<dyn InspectionTarget>,
    target_identifier: TargetIdentifier,
    connection_identifier: String,
    /// Sender of the setup request, echoed back as a destination of outgoing messages.
    destination: String,
    channel: Arc<dyn FrontendChannel>,
    connected: AtomicBool,
}

impl ConnectionBridge {
    /// Create new (not yet connected) bridge.
    ///
    /// # Arguments
    ///
    /// * `target`: bound target
    /// * `target_identifier`: identifier of bound target
    /// * `connection_identifier`: connection identifier supplied by the client
    /// * `sender`: sender supplied by the client
    /// * `channel`: channel that target uses for outgoing messages
    pub fn new(
        target: Weak<dyn InspectionTarget>,
        target_identifier: TargetIdentifier,
        connection_identifier: String,
        sender: String,
        channel: Arc<dyn FrontendChannel>,
    ) -> Self {
        Self {
            target,
            target_identifier,
            connection_identifier,
            destination: sender,
            channel,
            connected: AtomicBool::new(false),
        }
    }

    pub fn target_identifier(&self) -> TargetIdentifier {
        self.target_identifier
    }

    pub fn connection_identifier(&self) -> &str {
        &self.connection_identifier
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect to the target. Return false if target is gone or refuses the connection,
    /// in this case bridge must be closed and discarded.
    pub fn setup(&self, is_automatic_inspection: bool, automatically_pause: bool) -> bool {
        let Some(target) = self.target.upgrade() else {
            return false;
        };
        if !target.connect(
            self.channel.clone(),
            is_automatic_inspection,
            automatically_pause,
        ) {
            debug!(
                target: "inspector",
                "target {} refuses connection {}", self.target_identifier, self.connection_identifier
            );
            return false;
        }
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    /// Forward raw message from the remote client to the target.
    pub fn send_message_to_target(&self, message: &str) {
        if !self.is_connected() {
            return;
        }
        if let Some(target) = self.target.upgrade() {
            target.dispatch_message_from_remote(message);
        }
    }

    /// Disconnect from the target. Idempotent.
    pub fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(target) = self.target.upgrade() {
            target.disconnect();
        }
    }

    /// Mark bridge closed without disconnecting, target itself is going away.
    pub fn target_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
