//! Frame encoding plus the inter-request timing the wire protocol
//! requires of every transmit.

use log::trace;

use crate::clock::Clock;
use crate::connection::{ConnState, Connection};
use crate::error::Result;
use crate::header;
use crate::message::Message;
use crate::transport::{L1, L1Flags};

/// Encodes and transmits messages for one connection, borrowing the L1
/// transport and a clock for the duration of a single [`send`](Sender::send) call.
pub struct Sender<'a, T: L1, C: Clock> {
    l1: &'a mut T,
    clock: &'a C,
}

impl<'a, T: L1, C: Clock> Sender<'a, T, C> {
    /// Borrow an L1 transport and clock to drive a send with.
    pub fn new(l1: &'a mut T, clock: &'a C) -> Self {
        Self { l1, clock }
    }

    /// Encode `msg` per the connection's negotiated header shape and
    /// write it to the bus.
    ///
    /// Waits out `P3min` first, but only once the connection is fully
    /// `Established` — the init handshakes have their own timing and must
    /// never be delayed by this.
    pub fn send(&mut self, conn: &Connection, msg: &Message) -> Result<()> {
        let l1_flags = self.l1.flags();
        let frame = header::encode(
            msg,
            conn.mode_flags,
            conn.src_addr,
            conn.dst_addr,
            l1_flags.contains(L1Flags::DOESL2CKSUM),
        )?;

        if conn.state == ConnState::Established {
            if !conn.log_scope.is_quiet() {
                trace!("send: waiting P3min={}ms before transmit", conn.p3min);
            }
            self.clock.sleep_ms(conn.p3min);
        }

        if !conn.log_scope.is_quiet() {
            trace!("send: {} byte frame, interbyte={}ms", frame.len(), conn.p4min);
        }
        self.l1.send(&frame, conn.p4min)
    }
}
