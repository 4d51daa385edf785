//! Wire traffic tracing switch.

use std::sync::atomic::{AtomicBool, Ordering};

static WIRE_TRACE: AtomicBool = AtomicBool::new(false);

#[inline(always)]
pub fn is_wire_trace_enabled() -> bool {
    WIRE_TRACE.load(Ordering::SeqCst)
}

pub fn enable_wire_trace() {
    WIRE_TRACE.store(true, Ordering::SeqCst)
}

pub fn disable_wire_trace() {
    WIRE_TRACE.store(false, Ordering::SeqCst)
}

/// Column limit of a traced preview line.
pub const TRACE_COLUMNS: usize = 80;
/// Maximum number of lines in a traced preview.
pub const TRACE_LINES: usize = 30;

/// Log a printable preview of raw wire bytes if wire tracing is enabled.
#[macro_export]
macro_rules! wire_trace {
    ($what:expr, $bytes:expr) => {
        if $crate::log::is_wire_trace_enabled() {
            let bytes: &[u8] = $bytes;
            log::debug!(
                target: "wire",
                "{}[{}]:\n{}",
                $what,
                bytes.len(),
                $crate::protocol::codec::preview(
                    bytes,
                    $crate::log::TRACE_COLUMNS,
                    $crate::log::TRACE_LINES
                )
            )
        }
    };
}
