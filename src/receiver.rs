//! Three-state timed reassembly: turn a stream of bytes with only
//! inter-byte gap timing to go on, into a list of framed [`Message`]s.

use log::{debug, trace};

use crate::connection::Connection;
use crate::consts::{FRAMED_INTERMESSAGE_TIMEOUT_MS, SMART_L1_MIN_TIMEOUT_MS};
use crate::error::{Error, Result};
use crate::header::{self, verify_checksum};
use crate::message::{FormatFlags, Message};
use crate::transport::{L1, L1Flags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// S1: idle, awaiting the first byte of a new receive call.
    Idle,
    /// S2: inter-byte — we're in the middle of one message.
    InterByte,
    /// S3: inter-message — we just finished one message, maybe more follow.
    InterMessage,
}

/// Drives the reassembly state machine for one `Connection`, borrowing
/// the L1 transport for the duration of a single [`reassemble`](Receiver::reassemble) call.
pub struct Receiver<'a, T: L1> {
    l1: &'a mut T,
}

impl<'a, T: L1> Receiver<'a, T> {
    /// Borrow an L1 transport to drive reassembly with.
    pub fn new(l1: &'a mut T) -> Self {
        Self { l1 }
    }

    /// Read and reassemble whatever messages arrive within the timing
    /// budget, returning them in arrival order.
    ///
    /// Blocks for up to the sum of the state timeouts; returns
    /// [`Error::Timeout`] only if nothing at all arrived.
    pub fn reassemble(&mut self, conn: &mut Connection, timeout_ms: u32, now_ms: u64) -> Result<Vec<Message>> {
        let l1_flags = self.l1.flags();
        let l1_doesl2frame = l1_flags.contains(L1Flags::DOESL2FRAME);

        let mut timeout_ms = timeout_ms;
        if l1_flags.intersects(L1Flags::DOESL2FRAME | L1Flags::DOESP4WAIT)
            && timeout_ms < SMART_L1_MIN_TIMEOUT_MS
        {
            timeout_ms = SMART_L1_MIN_TIMEOUT_MS;
        }

        let mut raw_chunks: Vec<Vec<u8>> = Vec::new();
        let mut state = State::Idle;

        loop {
            let tout = match state {
                State::Idle => timeout_ms,
                State::InterByte => {
                    let t = conn.p2min.saturating_sub(2);
                    t.max(conn.p1max)
                }
                State::InterMessage => {
                    if l1_doesl2frame {
                        FRAMED_INTERMESSAGE_TIMEOUT_MS
                    } else {
                        conn.p2max
                    }
                }
            };

            if !conn.log_scope.is_quiet() {
                trace!("reassemble: state={state:?} tout={tout} rxoffset={}", conn.rxoffset);
            }

            let read_result = if state == State::InterByte && l1_doesl2frame {
                Err(Error::Timeout)
            } else {
                let cap = conn.rxbuf.len();
                self.l1.recv(&mut conn.rxbuf[conn.rxoffset..cap], tout)
            };

            match read_result {
                Err(Error::Timeout) => match state {
                    State::Idle => {
                        if conn.rxoffset == 0 {
                            return Err(Error::Timeout);
                        }
                        state = State::InterByte;
                        continue;
                    }
                    State::InterByte => {
                        let chunk = conn.rxbuf[..conn.rxoffset].to_vec();
                        conn.rxoffset = 0;
                        raw_chunks.push(chunk);
                        state = State::InterMessage;
                        continue;
                    }
                    State::InterMessage => {
                        break;
                    }
                },
                Err(e) => return Err(e),
                Ok(n) => {
                    conn.rxoffset += n;

                    while conn.rxoffset > 0 && conn.rxbuf[0] == 0x00 {
                        conn.rxoffset -= 1;
                        conn.rxbuf.copy_within(1..conn.rxoffset + 1, 0);
                    }

                    if matches!(state, State::Idle | State::InterMessage) {
                        state = State::InterByte;
                    }
                }
            }
        }

        if !conn.log_scope.is_quiet() {
            debug!("reassemble: collected {} raw chunk(s)", raw_chunks.len());
        }

        let mut out = Vec::new();
        for chunk in raw_chunks {
            self.finalize_chunk(&chunk, conn, l1_flags, now_ms, &mut out)?;
        }
        Ok(out)
    }

    /// Decode the frame(s) packed into one raw arrival-gap chunk.
    ///
    /// Splitting into more than one message only happens when L1 doesn't
    /// already frame for us (`!DOESL2FRAME`) and the decoded frame is
    /// strictly shorter than what's buffered — a framing L1 that hands us
    /// an occasional overrun is trusted as a single message, not resliced.
    fn finalize_chunk(
        &self,
        mut buf: &[u8],
        conn: &mut Connection,
        l1_flags: L1Flags,
        now_ms: u64,
        out: &mut Vec<Message>,
    ) -> Result<()> {
        let l1_doesl2frame = l1_flags.contains(L1Flags::DOESL2FRAME);

        loop {
            let h = header::decode(buf, conn.first_frame)?;
            let framelen = h.hdrlen + h.datalen + 1;
            let framelen = framelen.min(buf.len());
            let frame = &buf[..framelen];

            let mut format_flags = FormatFlags::FRAMED;
            if h.functional {
                format_flags |= FormatFlags::FUNCADDR;
            }

            let payload = if l1_flags.contains(L1Flags::STRIPSL2CKSUM) {
                // L1 already stripped (and implicitly verified) the
                // checksum; nothing left to check or remove here.
                &frame[h.hdrlen..]
            } else {
                format_flags |= FormatFlags::CKSUMMED;
                if !verify_checksum(frame) {
                    format_flags |= FormatFlags::BADCS;
                    if !conn.log_scope.is_quiet() {
                        debug!("reassemble: bad checksum on frame from {:#04x}", h.src);
                    }
                }
                &frame[h.hdrlen..frame.len() - 1]
            };

            out.push(Message {
                data: payload.to_vec(),
                src: h.src,
                dst: h.dst,
                format_flags,
                rx_time_ms: now_ms,
            });

            conn.first_frame = false;

            if l1_doesl2frame || framelen >= buf.len() {
                return Ok(());
            }
            buf = &buf[framelen..];
        }
    }
}
