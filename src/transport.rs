//! The L1 transport contract this layer consumes.
//!
//! L1 is responsible for the physical byte I/O and the bus-init primitives
//! (FastInit's 25/25ms wake pulse, SlowInit's 5-baud address byte). This
//! layer only ever calls through the [`L1`] trait; it never touches a
//! serial port directly.

use crate::error::Result;

bitflags::bitflags! {
    /// Capabilities an L1 implementation advertises about itself.
    ///
    /// These let "smart" interfaces (ones that already do framing, P4
    /// waits, checksums, or the slow-init handshake) shortcut work this
    /// layer would otherwise do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct L1Flags: u8 {
        /// L1 already reassembles whole frames per `recv` call.
        const DOESL2FRAME   = 0b0000_0001;
        /// L1 already enforces its own per-byte send pacing. This crate
        /// always asks L1 to honor `P4min` on `send` regardless of this
        /// flag; what it changes is the receive-timeout floor applied in
        /// [`crate::receiver`] and keep-alive, mirroring a "smart" L1's
        /// tighter turnaround.
        const DOESP4WAIT    = 0b0000_0010;
        /// L1 already computes and appends the checksum on send.
        const DOESL2CKSUM   = 0b0000_0100;
        /// L1 already strips the checksum byte from received frames.
        const STRIPSL2CKSUM = 0b0000_1000;
        /// L1 already performs the full 5-baud slow-init handshake.
        const DOESSLOWINIT  = 0b0001_0000;
    }
}

/// Which bus-init sequence to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusInit {
    /// 25ms low / 25ms high wake pulse followed by a StartComms message.
    Fast,
    /// Transmit `addr` at 5 baud (the ISO 14230 wake-up pattern). The two
    /// key bytes that follow are read back separately via `recv`.
    FiveBaud {
        /// Target ECU address.
        addr: u8,
    },
}

/// Byte-level transport beneath this layer.
///
/// Every method is blocking with an explicit timeout, matching the
/// synchronous, single-threaded-per-connection model this crate assumes
/// (see the concurrency notes in the crate-level docs).
pub trait L1 {
    /// Read up to `buf.len()` bytes, blocking up to `timeout_ms`.
    /// Returns the number of bytes read (0 on timeout is NOT used here —
    /// a timeout is reported as `Err(Error::Timeout)`).
    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;

    /// Write `buf` in full, waiting `interbyte_delay_ms` between bytes
    /// (0 if the caller/L1 doesn't need an enforced gap).
    fn send(&mut self, buf: &[u8], interbyte_delay_ms: u32) -> Result<()>;

    /// Configure the serial link for 8-N-1 at `bps`.
    fn set_speed(&mut self, bps: u32) -> Result<()>;

    /// Discard any unread input.
    fn input_flush(&mut self) -> Result<()>;

    /// Run a bus-init sequence.
    fn init_bus(&mut self, init: BusInit) -> Result<()>;

    /// This L1 implementation's advertised capabilities.
    fn flags(&self) -> L1Flags;
}
