//! FRAG1 / FRAGN fragmentation header encoding and decoding.
//!
//! Both headers are big-endian. The first 16 bits pack a 5-bit dispatch code
//! with the 11-bit total datagram size:
//!
//! ```text
//! FRAG1:  | dispatch:5 | size:11 | tag:16 |                 (4 bytes)
//! FRAGN:  | dispatch:5 | size:11 | tag:16 | offset:8 |      (5 bytes)
//! ```
//!
//! The FRAGN offset counts 8-byte units from the start of the datagram.

use alloc::vec::Vec;

use crate::error::FrameError;

pub const FRAG_1_DISPATCH: u8 = 0b1_1000;
pub const FRAG_N_DISPATCH: u8 = 0b1_1100;

pub const FRAG_1_HEADER_LEN: usize = 4;
pub const FRAG_N_HEADER_LEN: usize = 5;

/// Largest datagram the 11-bit size field can describe.
pub const MAX_DATAGRAM_SIZE: usize = 0x07ff;

/// Granularity of the FRAGN offset field in bytes.
pub const FRAG_OFFSET_UNIT: usize = 8;

const SIZE_MASK: u16 = 0x07ff;

/// Whether `byte` (the first byte of a frame) carries a fragmentation dispatch.
pub fn is_frag_dispatch(byte: u8) -> bool {
    let dispatch = byte >> 3;
    dispatch == FRAG_1_DISPATCH || dispatch == FRAG_N_DISPATCH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragHeader {
    /// First fragment of a datagram.
    First { size: u16, tag: u16 },
    /// Any later fragment; `offset` is in bytes.
    Subsequent { size: u16, tag: u16, offset: u16 },
}

impl FragHeader {
    pub fn first(size: usize, tag: u16) -> Result<Self, FrameError> {
        check_size(size)?;
        Ok(FragHeader::First {
            size: size as u16,
            tag,
        })
    }

    pub fn subsequent(size: usize, tag: u16, offset: usize) -> Result<Self, FrameError> {
        check_size(size)?;
        if offset % FRAG_OFFSET_UNIT != 0 || offset / FRAG_OFFSET_UNIT > u8::MAX as usize {
            return Err(FrameError::MisalignedOffset(offset));
        }
        Ok(FragHeader::Subsequent {
            size: size as u16,
            tag,
            offset: offset as u16,
        })
    }

    pub fn size(&self) -> u16 {
        match self {
            FragHeader::First { size, .. } | FragHeader::Subsequent { size, .. } => *size,
        }
    }

    pub fn tag(&self) -> u16 {
        match self {
            FragHeader::First { tag, .. } | FragHeader::Subsequent { tag, .. } => *tag,
        }
    }

    /// Byte offset of the carried payload inside the datagram.
    pub fn offset(&self) -> u16 {
        match self {
            FragHeader::First { .. } => 0,
            FragHeader::Subsequent { offset, .. } => *offset,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            FragHeader::First { .. } => FRAG_1_HEADER_LEN,
            FragHeader::Subsequent { .. } => FRAG_N_HEADER_LEN,
        }
    }

    /// Decode a header from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAG_1_HEADER_LEN {
            return Err(FrameError::TooShort {
                min: FRAG_1_HEADER_LEN,
                actual: data.len(),
            });
        }
        let word = u16::from_be_bytes([data[0], data[1]]);
        let dispatch = (word >> 11) as u8;
        let size = word & SIZE_MASK;
        let tag = u16::from_be_bytes([data[2], data[3]]);

        match dispatch {
            FRAG_1_DISPATCH => Ok(FragHeader::First { size, tag }),
            FRAG_N_DISPATCH => {
                if data.len() < FRAG_N_HEADER_LEN {
                    return Err(FrameError::TooShort {
                        min: FRAG_N_HEADER_LEN,
                        actual: data.len(),
                    });
                }
                let offset = (data[4] as u16) << 3;
                Ok(FragHeader::Subsequent { size, tag, offset })
            }
            other => Err(FrameError::UnknownDispatch(other)),
        }
    }

    /// Append the encoded header to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let (dispatch, size, tag) = match self {
            FragHeader::First { size, tag } => (FRAG_1_DISPATCH, *size, *tag),
            FragHeader::Subsequent { size, tag, .. } => (FRAG_N_DISPATCH, *size, *tag),
        };
        let word = ((dispatch as u16) << 11) | (size & SIZE_MASK);
        out.extend_from_slice(&word.to_be_bytes());
        out.extend_from_slice(&tag.to_be_bytes());
        if let FragHeader::Subsequent { offset, .. } = self {
            out.push((offset >> 3) as u8);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_len());
        self.encode_into(&mut out);
        out
    }
}

fn check_size(size: usize) -> Result<(), FrameError> {
    if size > MAX_DATAGRAM_SIZE {
        return Err(FrameError::DatagramTooLarge(size));
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn subsequent_header_survives_decode(
            size in 0..=MAX_DATAGRAM_SIZE,
            tag in any::<u16>(),
            units in 0..=255usize,
        ) {
            let header = FragHeader::subsequent(size, tag, units * FRAG_OFFSET_UNIT).unwrap();
            let decoded = FragHeader::decode(&header.encode()).unwrap();
            prop_assert_eq!(decoded.size() as usize, size);
            prop_assert_eq!(decoded.tag(), tag);
            prop_assert_eq!(decoded.offset() as usize, units * FRAG_OFFSET_UNIT);
        }
    }
}
