//! The four ISO 14230-2 header shapes: decode, encode, and the additive
//! checksum shared by both directions.

use crate::connection::ModeFlags;
use crate::error::{Error, Result};
use crate::message::Message;

/// Result of a successful header decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedHeader {
    /// Header length in bytes (1, 2, 3, or 4).
    pub hdrlen: usize,
    /// Payload length, not counting header or checksum.
    pub datalen: usize,
    /// Source address (0 if the frame carried no addresses).
    pub src: u8,
    /// Destination address (0 if the frame carried no addresses).
    pub dst: u8,
    /// Whether the second address bit marks this as a functional
    /// (rather than physical) address.
    pub functional: bool,
}

/// Decode the header of `data`, without requiring the checksum byte to
/// have arrived yet.
///
/// `first_frame` rejects addressless headers, since the StartComms
/// exchange that begins every session is defined to carry addresses.
///
/// Returns [`Error::IncompleteData`] if more bytes are needed before a
/// decision can be made, or [`Error::BadData`] if the bytes present can
/// never be a valid ISO 14230 frame.
pub fn decode(data: &[u8], first_frame: bool) -> Result<DecodedHeader> {
    if data.is_empty() {
        return Err(Error::IncompleteData);
    }

    let a2a1 = data[0] & 0xC0;
    let dl = (data[0] & 0x3F) as usize;

    let (hdrlen, datalen, src, dst, functional) = match a2a1 {
        0x80 | 0xC0 => {
            let functional = a2a1 == 0xC0;
            if dl > 0 {
                if data.len() < 3 {
                    return Err(Error::IncompleteData);
                }
                (3, dl, data[2], data[1], functional)
            } else {
                if data.len() < 4 {
                    return Err(Error::IncompleteData);
                }
                (4, data[3] as usize, data[2], data[1], functional)
            }
        }
        0x00 => {
            if first_frame {
                return Err(Error::BadData);
            }
            if dl > 0 {
                (1, dl, 0, 0, false)
            } else {
                if data.len() < 2 {
                    return Err(Error::IncompleteData);
                }
                (2, data[1] as usize, 0, 0, false)
            }
        }
        // 0x40: CARB (ISO 9141) mode, explicitly out of scope.
        _ => return Err(Error::BadData),
    };

    if datalen == 0 {
        return Err(Error::BadData);
    }

    if data.len() < hdrlen + datalen + 1 {
        return Err(Error::IncompleteData);
    }

    Ok(DecodedHeader {
        hdrlen,
        datalen,
        src,
        dst,
        functional,
    })
}

/// Encode `msg` into a complete on-wire frame (header + payload +
/// checksum, unless L1 already checksums for us).
///
/// Addresses are taken from `msg.src`/`msg.dst` when non-zero, else from
/// the connection's negotiated `conn_src`/`conn_dst`.
pub fn encode(
    msg: &Message,
    mode_flags: ModeFlags,
    conn_src: u8,
    conn_dst: u8,
    l1_does_checksum: bool,
) -> Result<Vec<u8>> {
    let len = msg.data.len();
    if len == 0 {
        return Err(Error::BadLen(len));
    }

    let mut buf = Vec::with_capacity(4 + len + 1);

    let use_long = mode_flags.contains(ModeFlags::LONGHDR) || !mode_flags.contains(ModeFlags::SHORTHDR);
    if use_long {
        let fmt_byte = if mode_flags.contains(ModeFlags::FUNCADDR) {
            0xC0
        } else {
            0x80
        };
        buf.push(fmt_byte);
        let dst = if msg.dst != 0 { msg.dst } else { conn_dst };
        let src = if msg.src != 0 { msg.src } else { conn_src };
        buf.push(dst);
        buf.push(src);
    } else {
        buf.push(0x00);
    }

    let fmtlen_ok = mode_flags.contains(ModeFlags::FMTLEN) || !mode_flags.contains(ModeFlags::LENBYTE);
    if fmtlen_ok {
        if len < 64 {
            buf[0] |= len as u8;
        } else if mode_flags.contains(ModeFlags::LENBYTE) {
            buf.push(len as u8);
        } else {
            return Err(Error::BadLen(len));
        }
    } else if mode_flags.contains(ModeFlags::LENBYTE) {
        buf.push(len as u8);
    }

    buf.extend_from_slice(&msg.data);

    if !l1_does_checksum {
        let csum = checksum(&buf);
        buf.push(csum);
    }

    Ok(buf)
}

/// 8-bit additive checksum: the sum of all bytes, modulo 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Verify the trailing checksum byte of `data` against the rest of the
/// buffer. Returns `true` if it matches.
pub fn verify_checksum(data: &[u8]) -> bool {
    match data.len() {
        0 => false,
        n => checksum(&data[..n - 1]) == data[n - 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ModeFlags;

    #[test]
    fn decode_addressed_short_form() {
        let data = [0x83, 0x33, 0xF1, b'a', b'b', b'c', 0x00];
        let h = decode(&data, false).unwrap();
        assert_eq!(h.hdrlen, 3);
        assert_eq!(h.datalen, 3);
        assert_eq!(h.dst, 0x33);
        assert_eq!(h.src, 0xF1);
        assert!(!h.functional);
    }

    #[test]
    fn decode_functional_addressed() {
        let data = [0xC3, 0x33, 0xF1, b'a', b'b', b'c', 0x00];
        let h = decode(&data, false).unwrap();
        assert!(h.functional);
    }

    #[test]
    fn decode_addressed_lenbyte_form() {
        let data = [0x80, 0x33, 0xF1, 0x02, b'a', b'b', 0x00];
        let h = decode(&data, false).unwrap();
        assert_eq!(h.hdrlen, 4);
        assert_eq!(h.datalen, 2);
    }

    #[test]
    fn decode_addressless_short_form() {
        let data = [0x03, b'a', b'b', b'c', 0x00];
        let h = decode(&data, false).unwrap();
        assert_eq!(h.hdrlen, 1);
        assert_eq!(h.datalen, 3);
        assert_eq!(h.src, 0);
        assert_eq!(h.dst, 0);
    }

    #[test]
    fn decode_addressless_lenbyte_form() {
        let data = [0x00, 0x02, b'a', b'b', 0x00];
        let h = decode(&data, false).unwrap();
        assert_eq!(h.hdrlen, 2);
        assert_eq!(h.datalen, 2);
    }

    #[test]
    fn decode_carb_rejected() {
        let data = [0x41, 0x00, 0x00, 0x00];
        assert!(matches!(decode(&data, false), Err(Error::BadData)));
    }

    #[test]
    fn decode_rejects_addressless_first_frame() {
        let data = [0x03, b'a', b'b', b'c', 0x00];
        assert!(matches!(decode(&data, true), Err(Error::BadData)));
    }

    #[test]
    fn decode_rejects_zero_datalen() {
        let data = [0x80, 0x33, 0xF1];
        assert!(matches!(decode(&data, false), Err(Error::BadData)));
    }

    #[test]
    fn decode_incomplete_header() {
        let data = [0x80, 0x33];
        assert!(matches!(decode(&data, false), Err(Error::IncompleteData)));
    }

    #[test]
    fn decode_incomplete_payload() {
        let data = [0x83, 0x33, 0xF1, b'a'];
        assert!(matches!(decode(&data, false), Err(Error::IncompleteData)));
    }

    #[test]
    fn encode_long_payload_uses_lenbyte() {
        let mode_flags = ModeFlags::LONGHDR | ModeFlags::LENBYTE | ModeFlags::FMTLEN;
        let payload = vec![0xAAu8; 80];
        let msg = Message::new(payload.clone(), 0xF1, 0x33);
        let out = encode(&msg, mode_flags, 0xF1, 0x33, false).unwrap();
        assert_eq!(&out[0..4], &[0x80, 0x33, 0xF1, 80]);
        assert_eq!(&out[4..84], &payload[..]);
        assert_eq!(out.len(), 85);
        assert_eq!(*out.last().unwrap(), checksum(&out[..84]));
    }

    #[test]
    fn encode_short_payload_packs_length_in_format_byte() {
        let mode_flags = ModeFlags::LONGHDR | ModeFlags::FMTLEN;
        let msg = Message::new(vec![1, 2, 3], 0xF1, 0x33);
        let out = encode(&msg, mode_flags, 0xF1, 0x33, false).unwrap();
        assert_eq!(out[0], 0x80 | 3);
        assert_eq!(out.len(), 3 + 3 + 1);
    }

    #[test]
    fn encode_shorthdr_only_emits_single_byte_header() {
        let mode_flags = ModeFlags::SHORTHDR | ModeFlags::FMTLEN;
        let msg = Message::new(vec![1, 2, 3], 0xF1, 0x33);
        let out = encode(&msg, mode_flags, 0xF1, 0x33, false).unwrap();
        assert_eq!(out[0], 3);
        assert_eq!(out.len(), 1 + 3 + 1);
    }

    #[test]
    fn encode_rejects_long_payload_without_lenbyte_support() {
        let mode_flags = ModeFlags::LONGHDR;
        let payload = vec![0u8; 64];
        let msg = Message::new(payload, 0xF1, 0x33);
        assert!(matches!(
            encode(&msg, mode_flags, 0xF1, 0x33, false),
            Err(Error::BadLen(64))
        ));
    }

    #[test]
    fn roundtrip_recovers_fields() {
        for len in [1usize, 5, 63, 64, 80, 255] {
            let mode_flags = ModeFlags::LONGHDR | ModeFlags::LENBYTE | ModeFlags::FMTLEN;
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let msg = Message::new(payload.clone(), 0xF1, 0x33);
            let encoded = encode(&msg, mode_flags, 0xF1, 0x33, false).unwrap();
            let h = decode(&encoded, false).unwrap();
            assert_eq!(h.datalen, len);
            assert_eq!(h.src, 0xF1);
            assert_eq!(h.dst, 0x33);
            let body = &encoded[h.hdrlen..h.hdrlen + h.datalen];
            assert_eq!(body, &payload[..]);
            assert!(verify_checksum(&encoded));
        }
    }

    #[test]
    fn checksum_flip_breaks_verification() {
        let mode_flags = ModeFlags::LONGHDR | ModeFlags::FMTLEN;
        let msg = Message::new(vec![1, 2, 3], 0xF1, 0x33);
        let mut encoded = encode(&msg, mode_flags, 0xF1, 0x33, false).unwrap();
        let last = encoded.len() - 2;
        encoded[last] ^= 0x01;
        assert!(!verify_checksum(&encoded));
    }
}
