//! SDO protocol constants
//!
//! The command specifier occupies the top three bits of the first byte of
//! every SDO frame; the low five bits carry per-command modifiers. Multi-byte
//! integers (object index, declared size, expedited payloads) are
//! little-endian on the wire.

use core::time::Duration;

/// Initiate upload, host to node
pub const REQUEST_UPLOAD: u8 = 2 << 5;
/// Initiate upload response, node to host
pub const RESPONSE_UPLOAD: u8 = 2 << 5;
/// Initiate download, host to node
pub const REQUEST_DOWNLOAD: u8 = 1 << 5;
/// Initiate download response, node to host
pub const RESPONSE_DOWNLOAD: u8 = 3 << 5;

/// Upload segment request, host to node
pub const REQUEST_SEGMENT_UPLOAD: u8 = 3 << 5;
/// Upload segment response, node to host
pub const RESPONSE_SEGMENT_UPLOAD: u8 = 0;
/// Download segment, host to node
pub const REQUEST_SEGMENT_DOWNLOAD: u8 = 0;
/// Download segment response, node to host
pub const RESPONSE_SEGMENT_DOWNLOAD: u8 = 1 << 5;

/// Mask selecting the command specifier bits
pub const COMMAND_MASK: u8 = 0xE0;

/// Payload carried inline in the initiate frame
pub const EXPEDITED: u8 = 0x02;
/// The size field (or unused-byte count) of the initiate frame is valid
pub const SIZE_SPECIFIED: u8 = 0x01;
/// Segment toggle bit; alternates each segment, first segment sends 0
pub const TOGGLE_BIT: u8 = 0x10;
/// Set on the final segment of a transfer
pub const NO_MORE_DATA: u8 = 0x01;

/// Time waited for a response on the first attempt; doubles on each retry
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);
/// Number of transmissions attempted before giving up
pub const DEFAULT_RETRY_COUNT: u32 = 4;
