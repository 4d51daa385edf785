//! Wire protocol: framing, plist codec and the fixed message vocabulary.
//!
//! Every frame carries a dictionary of shape `{"messageName": <name>, "msgData": <dictionary>}`.

pub mod codec;
pub mod decoder;
pub mod message;

pub use decoder::FrameDecoder;
pub use message::{envelope, MessageName, Request};

pub use plist::{Dictionary, Value};

/// Dictionary keys used by the protocol.
pub mod key {
    pub const MESSAGE_NAME: &str = "messageName";
    pub const MESSAGE_DATA: &str = "msgData";

    pub const TARGET_IDENTIFIER: &str = "WIRTargetIdentifierKey";
    pub const CONNECTION_IDENTIFIER: &str = "WIRConnectionIdentifierKey";
    pub const SENDER: &str = "WIRSenderKey";
    pub const SOCKET_DATA: &str = "WIRSocketDataKey";
    pub const LISTING: &str = "WIRListingKey";
    pub const TITLE: &str = "WIRTitleKey";
    pub const TYPE: &str = "WIRTypeKey";
    pub const RAW_DATA: &str = "WIRRawDataKey";
    pub const DESTINATION: &str = "WIRDestinationKey";
}

/// Value of [`key::TYPE`] for script targets.
pub const TYPE_JAVASCRIPT: &str = "WIRTypeJavaScript";
