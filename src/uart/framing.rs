// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! Byte-stuffed, CRC-protected UART frame codec.
//!
//! A frame on the wire is `STX ∥ escaped(header ∥ payload ∥ crc) ∥ ETX` where
//! the header is 5 bytes (version, request type, chip id, big-endian payload
//! length) and the checksum is CRC-16/ARC over `header ∥ payload`, appended
//! big-endian. Escaping prefixes any in-body `STX`/`ETX`/`ESC` with `ESC`.

use crate::error::{self, Frame as FrameError};

use packed_struct::prelude::*;
use packed_struct_codegen::PackedStruct;

use std::convert::TryInto;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ESC: u8 = 0x1B;

pub const HEADER_LENGTH: usize = 5;
pub const CHECKSUM_LENGTH: usize = 2;

/// Request type for chain-style chip operations (job submission, status,
/// temperature)
pub const TYPE_CHAIN: u8 = 0x00;

/// Request type for control operations (PLL register file)
pub const TYPE_CONTROL: u8 = 0xA2;

/// On-wire frame header
#[derive(PackedStruct, Debug, PartialEq)]
#[packed_struct(endian = "msb")]
pub struct FrameHeader {
    /// Protocol version, always 0
    pub version: u8,
    /// Request type (`TYPE_CHAIN` or `TYPE_CONTROL`)
    pub req_type: u8,
    /// Address of the chip on the shared bus
    pub chip_id: u8,
    /// Payload length, exclusive of header and checksum
    pub length: u16,
}

/// Semantic content of one fully parsed, CRC-verified frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub chip_id: u8,
    pub data: Vec<u8>,
}

/// CRC-16/ARC (polynomial 0x8005 reflected, zero init, zero xorout)
pub fn crc16_arc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Prefix every in-body occurrence of a control byte with `ESC`
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());
    for byte in data {
        match *byte {
            STX | ETX | ESC => escaped.push(ESC),
            _ => (),
        }
        escaped.push(*byte);
    }
    escaped
}

/// Build the full on-wire representation of one frame
pub fn pack(chip_id: u8, req_type: u8, data: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        version: 0,
        req_type,
        chip_id,
        length: data.len() as u16,
    };

    let mut body = Vec::with_capacity(HEADER_LENGTH + data.len() + CHECKSUM_LENGTH);
    body.extend_from_slice(&header.pack());
    body.extend_from_slice(data);
    let checksum = crc16_arc(&body);
    body.extend_from_slice(&checksum.to_be_bytes());

    let mut wire = Vec::with_capacity(body.len() + 2);
    wire.push(STX);
    wire.extend_from_slice(&escape(&body));
    wire.push(ETX);
    wire
}

/// Parse the de-escaped bytes found between `STX` and `ETX`.
///
/// The checksum is verified first, then the header is unpacked and the length
/// field checked against the remaining payload.
pub fn unserialize(body: &[u8]) -> error::Result<Frame> {
    if body.len() < HEADER_LENGTH + CHECKSUM_LENGTH {
        Err(FrameError::Invalid)?
    }
    let (payload, checksum) = body.split_at(body.len() - CHECKSUM_LENGTH);
    let expected = crc16_arc(payload).to_be_bytes();
    if checksum != expected {
        Err(FrameError::Checksum)?
    }

    let header = FrameHeader::unpack(
        payload[..HEADER_LENGTH]
            .try_into()
            .expect("BUG: header slice size"),
    )
    .map_err(|_| FrameError::Invalid)?;
    let data = &payload[HEADER_LENGTH..];
    if data.len() != header.length as usize {
        Err(FrameError::Invalid)?
    }

    Ok(Frame {
        chip_id: header.chip_id,
        data: data.to_vec(),
    })
}

/// Strip escaping from a raw frame body (inverse of [`escape`]). The byte
/// following an `ESC` is always taken literally.
pub fn unescape(data: &[u8]) -> Vec<u8> {
    let mut plain = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(byte) = bytes.next() {
        if *byte == ESC {
            if let Some(literal) = bytes.next() {
                plain.push(*literal);
            }
        } else {
            plain.push(*byte);
        }
    }
    plain
}

/// Parse one complete wire image (`STX ... ETX`), mainly a test convenience;
/// the serial channel feeds bytes through the same state machine incrementally.
pub fn parse_wire(wire: &[u8]) -> error::Result<Frame> {
    let start = wire
        .iter()
        .position(|byte| *byte == STX)
        .ok_or(FrameError::Invalid)?;
    let mut body = Vec::new();
    let mut bytes = wire[start + 1..].iter();
    while let Some(byte) = bytes.next() {
        match *byte {
            STX => body.clear(),
            ETX => return unserialize(&body),
            ESC => {
                if let Some(literal) = bytes.next() {
                    body.push(*literal);
                }
            }
            other => body.push(other),
        }
    }
    Err(FrameError::Invalid)?
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    /// Reference value for the classic "123456789" check string
    #[test]
    fn test_crc16_arc_check_value() {
        assert_eq!(crc16_arc(b"123456789"), 0xBB3D);
        assert_eq!(crc16_arc(b""), 0x0000);
    }

    #[test]
    fn test_escape_round_trip() {
        let data = [0x02u8, 0x03, 0x1B, 0x00, 0xFF, 0x02, 0x42];
        let escaped = escape(&data);
        // every control byte costs one extra ESC
        assert_eq!(escaped.len(), data.len() + 4);
        assert_eq!(unescape(&escaped), data);
    }

    #[test]
    fn test_escape_leaves_no_bare_delimiters() {
        let data: Vec<u8> = (0u8..=255).collect();
        let escaped = escape(&data);
        let mut bytes = escaped.iter();
        while let Some(byte) = bytes.next() {
            match *byte {
                ESC => {
                    // the escaped byte itself may be anything
                    assert!(bytes.next().is_some());
                }
                STX | ETX => panic!("bare delimiter {:#04x} survived escaping", byte),
                _ => (),
            }
        }
    }

    /// A control request to chip 3 whose header and payload both contain
    /// bytes that need escaping.
    #[test]
    fn test_pack_control_request() {
        let wire = pack(3, TYPE_CONTROL, &[0x02, 0x1B, 0xFF]);

        assert_eq!(wire[0], STX);
        assert_eq!(*wire.last().expect("empty wire"), ETX);
        // header: version 0, type 0xA2, chip 3 (escaped? no - 0x03 is ETX!),
        // length 0x0003 - both 0x03 bytes must arrive escaped
        assert_eq!(&wire[1..3], &[0x00, 0xA2]);
        assert_eq!(&wire[3..5], &[ESC, 0x03]);

        let body = unescape(&wire[1..wire.len() - 1]);
        assert_eq!(&body[..HEADER_LENGTH], &[0x00, 0xA2, 0x03, 0x00, 0x03]);
        assert_eq!(&body[HEADER_LENGTH..HEADER_LENGTH + 3], &[0x02, 0x1B, 0xFF]);

        let frame = parse_wire(&wire).expect("parsing failed");
        assert_eq!(frame.chip_id, 3);
        assert_eq!(frame.data, vec![0x02, 0x1B, 0xFF]);
    }

    #[test]
    fn test_round_trip_various_payloads() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![STX, ETX, ESC],
            (0u8..=255).collect(),
            vec![0x8C; 201],
        ];
        for (chip_id, payload) in payloads.into_iter().enumerate() {
            let chip_id = chip_id as u8 + 1;
            let frame =
                parse_wire(&pack(chip_id, TYPE_CHAIN, &payload)).expect("parsing failed");
            assert_eq!(frame.chip_id, chip_id);
            assert_eq!(frame.data, payload);
        }
    }

    #[test]
    fn test_single_bit_flips_are_detected() {
        let payload = [0xDEu8, 0xAD, 0xBE, 0xEF];
        let header = FrameHeader {
            version: 0,
            req_type: TYPE_CHAIN,
            chip_id: 1,
            length: payload.len() as u16,
        };
        let mut body = Vec::new();
        body.extend_from_slice(&header.pack());
        body.extend_from_slice(&payload);
        body.extend_from_slice(&crc16_arc(&body).to_be_bytes());

        assert!(unserialize(&body).is_ok());
        for byte in 0..body.len() {
            for bit in 0..8 {
                let mut corrupted = body.clone();
                corrupted[byte] ^= 1 << bit;
                let err = unserialize(&corrupted)
                    .expect_err("corrupted frame parsed")
                    .kind();
                match err {
                    ErrorKind::Frame(FrameError::Checksum)
                    | ErrorKind::Frame(FrameError::Invalid) => (),
                    other => panic!("unexpected error kind {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_length_mismatch() {
        // valid checksum over a body whose header lies about the length
        let header = FrameHeader {
            version: 0,
            req_type: TYPE_CHAIN,
            chip_id: 1,
            length: 10,
        };
        let mut body = Vec::new();
        body.extend_from_slice(&header.pack());
        body.extend_from_slice(&[1, 2, 3]);
        body.extend_from_slice(&crc16_arc(&body).to_be_bytes());

        let err = unserialize(&body).expect_err("parsed").kind();
        assert_eq!(err, ErrorKind::Frame(FrameError::Invalid));
    }

    #[test]
    fn test_short_frame() {
        let err = unserialize(&[0x00, 0xA2]).expect_err("parsed").kind();
        assert_eq!(err, ErrorKind::Frame(FrameError::Invalid));
    }
}
