//! The framed payload type handed to application callbacks.

bitflags::bitflags! {
    /// Flags describing how a [`Message`] was framed/addressed/verified.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatFlags: u8 {
        /// Addressed as a functional (logical-service) address rather than
        /// a specific physical ECU.
        const FUNCADDR = 0b0000_0001;
        /// Produced by the reassembly state machine (always set on
        /// anything that reaches the application).
        const FRAMED   = 0b0000_0010;
        /// The checksum was verified (set whenever L1 didn't already
        /// strip it, regardless of whether it matched).
        const CKSUMMED = 0b0000_0100;
        /// The checksum was verified and did NOT match. The message is
        /// still delivered; the checksum byte has already been stripped.
        const BADCS    = 0b0000_1000;
    }
}

/// A single framed application-layer payload.
#[derive(Debug, Clone)]
pub struct Message {
    /// Payload bytes, header and checksum already stripped.
    pub data: Vec<u8>,
    /// Source address (0 if the frame carried no addresses).
    pub src: u8,
    /// Destination address (0 if the frame carried no addresses).
    pub dst: u8,
    /// How this message was framed/addressed/checksummed.
    pub format_flags: FormatFlags,
    /// Timestamp (from the caller's [`crate::clock::Clock`]) of when the
    /// last byte of this message was received.
    pub rx_time_ms: u64,
}

impl Message {
    /// Build a message bound for `dst`/`src` ahead of encoding, with no
    /// format flags set (those are filled in on receive, not on send).
    pub fn new(data: Vec<u8>, src: u8, dst: u8) -> Self {
        Self {
            data,
            src,
            dst,
            format_flags: FormatFlags::empty(),
            rx_time_ms: 0,
        }
    }

    /// Length of the payload, mirroring the original's `datalen`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
