//! A single descriptor publishing this protocol's identity, capability
//! flags, and a function table of its session operations to whatever
//! registry the L3 layer uses to pick and drive a driver.

use crate::error::Result;
use crate::message::Message;
use crate::session::{Session, StartCommsOptions};
use crate::transport::L1;
use crate::Clock;

bitflags::bitflags! {
    /// Capabilities this protocol driver advertises about itself,
    /// independent of what the negotiated L1 link can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Receiver always hands back whole, framed messages.
        const FRAMED    = 0b0000_0001;
        /// Driver supports `timeout`-driven keep-alive.
        const KEEPALIVE = 0b0000_0010;
        /// Driver computes/verifies its own checksum when L1 doesn't.
        const DOESCKSUM = 0b0000_0100;
    }
}

/// Identifies which wire protocol a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolId {
    /// ISO 14230-2 (KWP2000).
    Iso14230,
}

/// Object-safe facade over the five session operations, implemented by
/// [`Session`] so a registry can invoke them without naming `Session`'s
/// transport/clock type parameters — the Rust-native stand-in for the
/// original's function pointers operating on a generic connection handle.
pub trait SessionOps {
    /// See [`Session::startcomms`].
    fn startcomms(&mut self, opts: StartCommsOptions, bitrate: u32) -> Result<()>;
    /// See [`Session::send`].
    fn send(&mut self, msg: &Message) -> Result<()>;
    /// See [`Session::request`].
    fn request(&mut self, msg: &Message) -> Result<Message>;
    /// See [`Session::stopcomms`].
    fn stopcomms(&mut self) -> Result<()>;
    /// See [`Session::timeout`].
    fn timeout(&mut self);
}

impl<'a, T: L1, C: Clock> SessionOps for Session<'a, T, C> {
    fn startcomms(&mut self, opts: StartCommsOptions, bitrate: u32) -> Result<()> {
        Session::startcomms(self, opts, bitrate)
    }

    fn send(&mut self, msg: &Message) -> Result<()> {
        Session::send(self, msg)
    }

    fn request(&mut self, msg: &Message) -> Result<Message> {
        Session::request(self, msg)
    }

    fn stopcomms(&mut self) -> Result<()> {
        Session::stopcomms(self)
    }

    fn timeout(&mut self) {
        Session::timeout(self)
    }
}

/// Plain function-pointer table dispatching through [`SessionOps`],
/// mirroring the original's `static const struct diag_l2_proto` of raw
/// function pointers operating on a generic connection handle rather than
/// closures bound to one particular connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOpsTable {
    /// See [`SessionOps::startcomms`].
    pub startcomms: fn(&mut dyn SessionOps, StartCommsOptions, u32) -> Result<()>,
    /// See [`SessionOps::send`].
    pub send: fn(&mut dyn SessionOps, &Message) -> Result<()>,
    /// See [`SessionOps::request`].
    pub request: fn(&mut dyn SessionOps, &Message) -> Result<Message>,
    /// See [`SessionOps::stopcomms`].
    pub stopcomms: fn(&mut dyn SessionOps) -> Result<()>,
    /// See [`SessionOps::timeout`].
    pub timeout: fn(&mut dyn SessionOps),
}

impl SessionOpsTable {
    fn new() -> Self {
        Self {
            startcomms: |ops, opts, bitrate| ops.startcomms(opts, bitrate),
            send: |ops, msg| ops.send(msg),
            request: |ops, msg| ops.request(msg),
            stopcomms: |ops| ops.stopcomms(),
            timeout: |ops| ops.timeout(),
        }
    }
}

/// What a registry needs to pick, describe, and drive this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolDescriptor {
    /// Which protocol this is.
    pub protocol_id: ProtocolId,
    /// What it can do.
    pub capabilities: Capabilities,
    /// How to drive it, without naming `Session<T, C>`'s type parameters.
    pub ops: SessionOpsTable,
}

/// Publish this protocol's descriptor.
pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor {
        protocol_id: ProtocolId::Iso14230,
        capabilities: Capabilities::FRAMED | Capabilities::KEEPALIVE | Capabilities::DOESCKSUM,
        ops: SessionOpsTable::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnState, InitType, Timings};
    use crate::error::Error;
    use crate::transport::{BusInit, L1Flags};

    struct NullClock;
    impl Clock for NullClock {
        fn now_ms(&self) -> u64 {
            0
        }
        fn sleep_ms(&self, _ms: u32) {}
    }

    struct NullL1;
    impl L1 for NullL1 {
        fn recv(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
            Err(Error::Timeout)
        }
        fn send(&mut self, _buf: &[u8], _interbyte_delay_ms: u32) -> Result<()> {
            Ok(())
        }
        fn set_speed(&mut self, _bps: u32) -> Result<()> {
            Ok(())
        }
        fn input_flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn init_bus(&mut self, _init: BusInit) -> Result<()> {
            Ok(())
        }
        fn flags(&self) -> L1Flags {
            L1Flags::empty()
        }
    }

    #[test]
    fn descriptor_advertises_expected_capabilities() {
        let d = descriptor();
        assert_eq!(d.protocol_id, ProtocolId::Iso14230);
        assert!(d.capabilities.contains(Capabilities::FRAMED));
        assert!(d.capabilities.contains(Capabilities::KEEPALIVE));
        assert!(d.capabilities.contains(Capabilities::DOESCKSUM));
    }

    #[test]
    fn ops_table_dispatches_through_the_session_ops_trait() {
        let mut l1 = NullL1;
        let clock = NullClock;
        let timings = Timings { p1max: 20, p2min: 25, p2max: 250, p3min: 55, p4max: 20, p4min: 5 };
        let mut session = Session::new(&mut l1, &clock, 0xF1, 0x33, InitType::MonitorMode, timings);

        let ops = descriptor().ops;
        (ops.startcomms)(&mut session, StartCommsOptions::default(), 0).unwrap();

        assert_eq!(session.connection().state, ConnState::Established);
    }
}
