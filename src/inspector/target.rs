use std::sync::Arc;
use strum_macros::{Display, IntoStaticStr};

/// Stable non-zero identifier of an inspection target. Zero means "no identifier".
pub type TargetIdentifier = u32;

/// Kind of debuggable execution context.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, IntoStaticStr)]
pub enum TargetType {
    /// Script engine context.
    #[strum(serialize = "javascript")]
    JavaScript,
    /// Web page context.
    #[strum(serialize = "web")]
    Web,
}

/// Channel used by a connected target for messages addressed to the remote debugger.
pub trait FrontendChannel: Send + Sync {
    fn send_message_to_frontend(&self, message: &str);
}

/// Externally managed debuggable context.
///
/// Inspector keeps only weak references to targets, target owner must call
/// [`crate::RemoteInspector::target_updated`] whenever an observable attribute changes and
/// [`crate::RemoteInspector::unregister_target`] before target goes away.
pub trait InspectionTarget: Send + Sync {
    fn target_identifier(&self) -> TargetIdentifier;

    /// Display name, used as a listing title.
    fn name(&self) -> String;

    fn target_type(&self) -> TargetType;

    fn remote_debugging_allowed(&self) -> bool;

    /// Attach a remote debugger session. Return false if target refuses the connection
    /// (already inspected or inspection is forbidden).
    ///
    /// Called while the inspector state is locked: implementation must not send messages into
    /// the `channel` before returning.
    ///
    /// # Arguments
    ///
    /// * `channel`: channel for messages from target to the remote debugger
    /// * `is_automatic_inspection`: session opened by automatic inspection
    /// * `automatically_pause`: pause target execution right after connect
    fn connect(
        &self,
        channel: Arc<dyn FrontendChannel>,
        is_automatic_inspection: bool,
        automatically_pause: bool,
    ) -> bool;

    /// Detach remote debugger session. Called without the inspector state locked, the session
    /// is already removed at this point so messages sent into its channel are dropped.
    fn disconnect(&self);

    /// Deliver a raw protocol message from the remote debugger.
    fn dispatch_message_from_remote(&self, message: &str);
}
