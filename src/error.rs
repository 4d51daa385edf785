use crate::inspector::target::TargetType;
use crate::protocol::codec::escape_printable;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- protocol errors -------------------------------------------
    #[error(
        "invalid packet header 0x{} == {} == {length}",
        hex(.header),
        escape_printable(.header)
    )]
    OversizedFrame { length: u32, header: [u8; 4] },
    #[error("malformed plist payload: {0}")]
    MalformedPayload(plist::Error),
    #[error("malformed plist payload: top level value is not a dictionary")]
    NotADictionary,
    #[error("outgoing frame too large ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("plist serialization: {0}")]
    Encode(plist::Error),

    // --------------------------------- transport errors ------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    // --------------------------------- target errors ---------------------------------------------
    #[error("listing for {0} targets is not supported")]
    UnsupportedTarget(TargetType),

    // --------------------------------- configuration errors --------------------------------------
    #[error("configuration file parsing error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// True if error caused by malformed or oversized data received from (or built for) the peer.
    /// Protocol errors are local to a single frame and never tear the connection down.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::OversizedFrame { .. }
                | Error::MalformedPayload(_)
                | Error::NotADictionary
                | Error::FrameTooLarge(_)
                | Error::Encode(_)
        )
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "inspector", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "inspector", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
