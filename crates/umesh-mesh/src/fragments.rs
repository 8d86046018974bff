//! Datagram fragmentation and reassembly.
//!
//! Datagrams larger than the link MTU travel as one FRAG1 fragment followed
//! by FRAGN fragments (see [`umesh_core::frag`]). The receiver keeps one
//! reassembly entry per `(sender, tag, size)` and appends fragments strictly
//! in order: a fragment behind the current length is a duplicate and is
//! dropped, one ahead of it means a fragment was lost and the whole entry is
//! discarded. Entries that stop making progress age out after
//! [`REASSEMBLE_TTL`] ticks.
//!
//! A datagram that fits the MTU travels bare unless its first byte would be
//! read as a dispatch code (a beacon or a fragment header); such datagrams
//! are sent behind a FRAG1 header declaring their full size.
//!
//! Aging ticks are driven by the owner (see [`MeshStack`](crate::stack::MeshStack)),
//! which runs a timer every [`REASSEMBLE_TICK_INTERVAL_MS`].

use std::collections::BTreeMap;
use std::fmt;

use umesh_core::frag::{
    FRAG_1_HEADER_LEN, FRAG_N_HEADER_LEN, FRAG_OFFSET_UNIT, FragHeader, MAX_DATAGRAM_SIZE,
    is_frag_dispatch,
};
use umesh_core::{FrameError, MacAddress, Sid};

use crate::error::ReassemblyError;
use crate::message::{Message, MessageInfo};
use crate::stack::MESH_BEACON_DISPATCH;

/// Aging ticks an entry survives without progress.
pub const REASSEMBLE_TTL: u8 = 5;

pub const REASSEMBLE_TICK_INTERVAL_MS: u64 = 1000;

/// Who a fragment came from: its short ID when known, otherwise its link
/// address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FragSender {
    Sid(Sid),
    Mac(MacAddress),
}

impl FragSender {
    pub fn of(info: &MessageInfo) -> Self {
        match info.mac {
            Some(mac) if !info.src.is_unique() => FragSender::Mac(mac),
            _ => FragSender::Sid(info.src),
        }
    }
}

impl fmt::Display for FragSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragSender::Sid(sid) => write!(f, "{sid}"),
            FragSender::Mac(mac) => write!(f, "{mac}"),
        }
    }
}

/// Whether a frame starting with `byte` is framing rather than a bare datagram.
pub fn is_reserved_dispatch(byte: u8) -> bool {
    byte == MESH_BEACON_DISPATCH || is_frag_dispatch(byte)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReassemblyKey {
    pub sender: FragSender,
    pub tag: u16,
    pub size: u16,
}

#[derive(Debug)]
struct ReassemblyEntry {
    buffer: Vec<u8>,
    /// Metadata of the first fragment, carried onto the complete datagram.
    info: MessageInfo,
    ttl: u8,
}

/// In-progress reassemblies.
#[derive(Debug, Default)]
pub struct Fragments {
    entries: BTreeMap<ReassemblyKey, ReassemblyEntry>,
}

impl Fragments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &ReassemblyKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Bytes collected so far for `key`.
    pub fn progress(&self, key: &ReassemblyKey) -> Option<usize> {
        self.entries.get(key).map(|e| e.buffer.len())
    }

    /// Feed one fragment. The sender is `message.info.src`, or
    /// `message.info.mac` when the short ID is not unique.
    ///
    /// Returns the complete datagram once its last fragment arrives,
    /// `Ok(None)` while reassembly is still in progress, and an error when
    /// the fragment was dropped.
    pub fn reassemble(&mut self, message: Message) -> Result<Option<Message>, ReassemblyError> {
        let header = FragHeader::decode(&message.payload).map_err(|e| match e {
            FrameError::UnknownDispatch(d) => ReassemblyError::Unrecognized(d),
            other => ReassemblyError::Frame(other),
        })?;
        let key = ReassemblyKey {
            sender: FragSender::of(&message.info),
            tag: header.tag(),
            size: header.size(),
        };

        match header {
            FragHeader::First { .. } => self.first(key, message),
            FragHeader::Subsequent { offset, .. } => self.subsequent(key, offset as usize, message),
        }
    }

    fn first(
        &mut self,
        key: ReassemblyKey,
        message: Message,
    ) -> Result<Option<Message>, ReassemblyError> {
        if self.entries.contains_key(&key) {
            tracing::debug!(sender = %key.sender, tag = key.tag, "frags: duplicate first fragment");
            return Err(ReassemblyError::Duplicate);
        }

        // A new size under a known (sender, tag) means the sender restarted.
        let stale: Vec<ReassemblyKey> = self
            .entries
            .keys()
            .filter(|k| k.sender == key.sender && k.tag == key.tag)
            .copied()
            .collect();
        for k in stale {
            self.entries.remove(&k);
            tracing::warn!(
                sender = %k.sender,
                tag = k.tag,
                size = k.size,
                "frags: discarding stale reassembly"
            );
        }

        let Message { mut payload, info } = message;
        payload.drain(..FRAG_1_HEADER_LEN);
        let size = key.size as usize;
        if payload.len() >= size {
            payload.truncate(size);
            return Ok(Some(Message::new(payload, info)));
        }

        tracing::debug!(sender = %key.sender, tag = key.tag, size, "frags: reassembly started");
        self.entries.insert(
            key,
            ReassemblyEntry {
                buffer: payload,
                info,
                ttl: REASSEMBLE_TTL,
            },
        );
        Ok(None)
    }

    fn subsequent(
        &mut self,
        key: ReassemblyKey,
        offset: usize,
        message: Message,
    ) -> Result<Option<Message>, ReassemblyError> {
        let Some(entry) = self.entries.get_mut(&key) else {
            tracing::debug!(sender = %key.sender, tag = key.tag, "frags: no reassembly for fragment");
            return Err(ReassemblyError::Unmatched);
        };

        let have = entry.buffer.len();
        if offset < have {
            tracing::debug!(sender = %key.sender, tag = key.tag, offset, "frags: duplicate fragment");
            return Err(ReassemblyError::Duplicate);
        }
        if offset > have {
            self.entries.remove(&key);
            tracing::debug!(
                sender = %key.sender,
                tag = key.tag,
                expected = have,
                offset,
                "frags: gap, reassembly discarded"
            );
            return Err(ReassemblyError::Gap {
                expected: have,
                offset,
            });
        }

        entry
            .buffer
            .extend_from_slice(&message.payload[FRAG_N_HEADER_LEN..]);
        entry.ttl = REASSEMBLE_TTL;

        let size = key.size as usize;
        if entry.buffer.len() < size {
            return Ok(None);
        }

        let Some(done) = self.entries.remove(&key) else {
            return Ok(None);
        };
        let mut payload = done.buffer;
        payload.truncate(size);
        tracing::debug!(sender = %key.sender, tag = key.tag, size, "frags: reassembly complete");
        Ok(Some(Message::new(payload, done.info)))
    }

    /// Age every entry by one tick, or drop them all when `force` is set.
    /// Returns the number of entries removed.
    pub fn cleanup(&mut self, force: bool) -> usize {
        let before = self.entries.len();
        if force {
            self.entries.clear();
        } else {
            self.entries.retain(|key, entry| {
                entry.ttl = entry.ttl.saturating_sub(1);
                if entry.ttl == 0 {
                    tracing::debug!(sender = %key.sender, tag = key.tag, "frags: reassembly timed out");
                }
                entry.ttl > 0
            });
        }
        before - self.entries.len()
    }
}

/// Split `payload` into link frames of at most `mtu` bytes.
///
/// A payload that already fits is returned as a single bare frame, unless it
/// is empty or starts with a reserved dispatch byte: then it is wrapped in a
/// FRAG1 header covering the whole datagram. Every fragment but the last
/// carries a multiple of 8 payload bytes so the FRAGN offsets stay
/// representable.
pub fn fragment(payload: &[u8], mtu: usize, tag: u16) -> Result<Vec<Vec<u8>>, FrameError> {
    let framed = payload.first().is_none_or(|&b| is_reserved_dispatch(b));
    if !framed && payload.len() <= mtu {
        return Ok(vec![payload.to_vec()]);
    }
    if payload.len() > MAX_DATAGRAM_SIZE {
        return Err(FrameError::DatagramTooLarge(payload.len()));
    }
    if payload.len() + FRAG_1_HEADER_LEN <= mtu {
        let mut frame = FragHeader::first(payload.len(), tag)?.encode();
        frame.extend_from_slice(payload);
        return Ok(vec![frame]);
    }
    let min_mtu = FRAG_N_HEADER_LEN + FRAG_OFFSET_UNIT;
    if mtu < min_mtu {
        return Err(FrameError::TooShort {
            min: min_mtu,
            actual: mtu,
        });
    }

    let size = payload.len();
    let first_len = (mtu - FRAG_1_HEADER_LEN) / FRAG_OFFSET_UNIT * FRAG_OFFSET_UNIT;
    let next_len = (mtu - FRAG_N_HEADER_LEN) / FRAG_OFFSET_UNIT * FRAG_OFFSET_UNIT;

    let mut frames = Vec::with_capacity(1 + (size - first_len).div_ceil(next_len));
    let mut frame = FragHeader::first(size, tag)?.encode();
    frame.extend_from_slice(&payload[..first_len]);
    frames.push(frame);

    let mut offset = first_len;
    while offset < size {
        let end = (offset + next_len).min(size);
        let mut frame = FragHeader::subsequent(size, tag, offset)?.encode();
        frame.extend_from_slice(&payload[offset..end]);
        frames.push(frame);
        offset = end;
    }
    Ok(frames)
}
