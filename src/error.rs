//! Crate-wide error taxonomy.
//!
//! Every variant here corresponds to one of the `DIAG_ERR_*` codes
//! returned by the original freediag L2 driver this crate reimplements.

use crate::message::Message;

/// Errors produced by the header codec, receiver, sender, and session FSM.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A frame looked valid so far but fewer bytes have arrived than the
    /// header claims are coming. The caller may retry once more data is
    /// available.
    #[error("incomplete frame: need more bytes than are currently buffered")]
    IncompleteData,

    /// A header byte combination that can't be a valid ISO 14230 frame
    /// (CARB's `01` address-bits pattern, a zero-length frame, or an
    /// addressless frame presented before the first frame was decoded).
    #[error("malformed frame header")]
    BadData,

    /// The payload can't be encoded with the ECU's negotiated header
    /// capabilities (e.g. payload ≥ 64 bytes but the ECU doesn't support a
    /// length byte).
    #[error("payload length {0} cannot be represented with the negotiated header form")]
    BadLen(usize),

    /// No data (or no complete message) arrived within the allotted time.
    #[error("timed out waiting for a response")]
    Timeout,

    /// The ECU's key bytes didn't match what ISO 14230 slow init requires
    /// (`kb2 != 0x8F`), or the inverted-address handshake byte didn't match.
    #[error("unexpected key bytes during slow init")]
    WrongKeyBytes,

    /// The ECU returned a negative response (`0x7F`) that wasn't one of the
    /// locally-recovered codes (`BusyRepeatRequest`/`ResponsePending`). The
    /// raw response is attached so the caller can inspect the NRC.
    #[error("ECU returned negative response (NRC 0x{:02x})", .response.data.get(2).copied().unwrap_or(0))]
    EcuSaidNo {
        /// The negative response message, including SID, request-SID echo,
        /// and NRC.
        response: Message,
    },

    /// The requested init type (FastInit/SlowInit/Monitor) isn't one this
    /// driver supports.
    #[error("unsupported init type")]
    InitNotSupported,

    /// The L1 transport reported an error; its message is preserved.
    #[error("L1 transport error: {0}")]
    L1(String),

    /// A condition that doesn't fit the above, analogous to the original's
    /// `DIAG_ERR_GENERAL`.
    #[error("{0}")]
    General(String),
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
