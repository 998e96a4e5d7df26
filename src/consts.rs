//! Wire-level constants for ISO 14230-2: service IDs, negative response
//! codes, and the handful of protocol timing numbers that aren't supplied
//! by the caller.

/// StartCommunication request.
pub const SID_START_COMMS: u8 = 0x81;
/// StartCommunication positive response.
pub const SID_START_COMMS_POSITIVE: u8 = 0xC1;
/// StopCommunication request.
pub const SID_STOP_COMMS: u8 = 0x82;
/// StopCommunication positive response.
pub const SID_STOP_COMMS_POSITIVE: u8 = 0xC2;
/// TesterPresent request.
pub const SID_TESTER_PRESENT: u8 = 0x3E;
/// Negative response service ID (third byte onward is NRC).
pub const SID_NEGATIVE_RESPONSE: u8 = 0x7F;

/// NRC: ECU is busy, repeat the request unmodified.
pub const NRC_BUSY_REPEAT_REQUEST: u8 = 0x21;
/// NRC: request was received correctly, response is still pending.
pub const NRC_RESPONSE_PENDING: u8 = 0x78;

/// Default bitrate used when the caller requests `0`.
pub const DEFAULT_BITRATE: u32 = 10_400;

/// Bus-idle guard observed before starting an init handshake.
pub const BUS_IDLE_GUARD_MS: u32 = 300;

/// Extra margin added to `p2max` when waiting for the FastInit
/// StartComms response and L1 does not frame for us.
pub const RXTOFFSET_MS: u32 = 10;

/// FastInit StartComms response timeout when L1 frames for us.
pub const FASTINIT_FRAMED_TIMEOUT_MS: u32 = 200;

/// Per-byte timeout while reading SlowInit mode (key) bytes.
pub const SLOWINIT_KEYBYTE_TIMEOUT_MS: u32 = 100;

/// Timeout waiting for the inverted-address byte during SlowInit.
pub const SLOWINIT_INVERTED_ADDR_TIMEOUT_MS: u32 = 350;

/// ECU's expected slow-init second key byte.
pub const SLOWINIT_KB2: u8 = 0x8F;

/// Margin added to `p2max` for a `request()` receive.
pub const REQUEST_RXTOFFSET_MS: u32 = 10;

/// Maximum `BusyRepeatRequest` retries before `request()` gives up.
pub const MAX_BUSY_REPEAT_RETRIES: u32 = 3;

/// Minimum timeout floor applied to state-machine reads when L1 is
/// "smart" (`DOESL2FRAME` or `DOESP4WAIT`).
pub const SMART_L1_MIN_TIMEOUT_MS: u32 = 100;

/// Inter-message timeout used in state S3 when L1 frames for us.
pub const FRAMED_INTERMESSAGE_TIMEOUT_MS: u32 = 150;

/// Largest legal payload (data-only, not counting header/checksum).
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Receive buffer capacity; must comfortably fit the largest legal frame
/// (4-byte long header + 255-byte payload + 1 checksum byte).
pub const RX_BUF_CAPACITY: usize = 260;
