//! # iso14230
//!
//! A Layer-2 driver for ISO 14230-2 ("Keyword Protocol 2000"), the K-line
//! data-link protocol used for vehicle on-board-diagnostics communication.
//!
//! This crate owns framing, checksums, header-variant negotiation,
//! session init/teardown, request/response retry handling, and
//! keep-alive. It does not own the serial port: callers supply an `L1`
//! transport (byte I/O plus the bus-init primitives) and a `Clock`.
//!
//! ## Crate layout
//!
//! - [`header`] — the four ISO 14230 header shapes, encode/decode, and
//!   the additive checksum.
//! - [`receiver`] — the three-state timed reassembly driver.
//! - [`sender`] — frame encoding plus the inter-request timing the wire
//!   protocol requires.
//! - [`session`] — `startcomms`/`request`/`stopcomms`/`timeout`, tying
//!   the above together into a usable connection lifecycle.
//! - [`connection`] — the per-session state `session` drives.
//! - [`transport`] and [`clock`] — the traits callers implement.
//! - [`registration`] — a descriptor publishing this protocol's identity
//!   and capabilities to a higher-level registry.
//!
//! ## Usage
//!
//! ```rust
//! use iso14230::clock::Clock;
//! use iso14230::connection::{InitType, Timings};
//! use iso14230::error::{Error, Result};
//! use iso14230::session::{Session, StartCommsOptions};
//! use iso14230::transport::{BusInit, L1, L1Flags};
//!
//! struct FakeClock;
//! impl Clock for FakeClock {
//!     fn now_ms(&self) -> u64 { 0 }
//!     fn sleep_ms(&self, _ms: u32) {}
//! }
//!
//! struct FakeL1 { rx: Vec<u8> }
//! impl L1 for FakeL1 {
//!     fn recv(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
//!         if self.rx.is_empty() { return Err(Error::Timeout); }
//!         let n = self.rx.len().min(buf.len());
//!         buf[..n].copy_from_slice(&self.rx[..n]);
//!         self.rx.drain(..n);
//!         Ok(n)
//!     }
//!     fn send(&mut self, _buf: &[u8], _interbyte_delay_ms: u32) -> Result<()> { Ok(()) }
//!     fn set_speed(&mut self, _bps: u32) -> Result<()> { Ok(()) }
//!     fn input_flush(&mut self) -> Result<()> { Ok(()) }
//!     fn init_bus(&mut self, _init: BusInit) -> Result<()> { Ok(()) }
//!     fn flags(&self) -> L1Flags { L1Flags::empty() }
//! }
//!
//! let mut l1 = FakeL1 { rx: vec![0x83, 0xF1, 0x10, 0xC1, 0xEF, 0x8F, 0xC3] };
//! let clock = FakeClock;
//! let timings = Timings { p1max: 20, p2min: 25, p2max: 250, p3min: 55, p4max: 20, p4min: 5 };
//! let mut session = Session::new(&mut l1, &clock, 0xF1, 0x33, InitType::FastInit, timings);
//! session.startcomms(StartCommsOptions::default(), 0).unwrap();
//! assert_eq!(session.connection().kb1, 0xEF);
//! ```

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]

pub mod clock;
pub mod connection;
pub mod consts;
pub mod error;
pub mod header;
pub mod message;
pub mod receiver;
pub mod registration;
pub mod sender;
pub mod session;
pub mod transport;

pub use clock::Clock;
pub use connection::{ConnState, Connection, InitType, Timings};
pub use error::{Error, Result};
pub use message::Message;
pub use session::{Session, StartCommsOptions};
pub use transport::{BusInit, L1};
