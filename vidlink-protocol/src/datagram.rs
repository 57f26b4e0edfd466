/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The datagram carrying one fragment of an encoded video frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Serialized size of the [`FrameDatagram`] header in bytes.
pub const HEADER_SIZE: usize = 4 + 1 + 2 + 2 + 2 + 2 + 8;

/// MTU assumed when none is configured; typical Ethernet.
pub const DEFAULT_MTU: usize = 1500;

/// Largest payload a single datagram may carry under the given MTU.
pub fn max_payload(mtu: usize) -> usize {
    mtu.saturating_sub(HEADER_SIZE)
}

/// Whether a frame can be decoded without reference to earlier frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Placeholder before the encoder has decided; never valid on the wire.
    Unknown,
    /// Key (IDR) frame, decodable standalone.
    Key,
    /// Frame depending on its predecessors.
    NonKey,
}

impl FrameType {
    fn to_wire(self) -> u8 {
        match self {
            FrameType::Unknown => 0,
            FrameType::Key => 1,
            FrameType::NonKey => 2,
        }
    }

    fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            1 => Ok(FrameType::Key),
            2 => Ok(FrameType::NonKey),
            other => Err(ProtocolError::InvalidFrameType(other)),
        }
    }
}

/// Identifies one fragment globally. The derived lexicographic order is the
/// transmission order of the session, which is what the retransmission
/// manager's reverse walk relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentKey {
    pub frame_id: u32,
    pub frag_id: u16,
}

/// One MTU-sized fragment of an encoded frame, as sent on the data channel.
///
/// `num_rtx` and `last_send_ts` are sender-side bookkeeping and are never
/// serialized; equality compares the wire image only.
#[derive(Debug, Clone)]
pub struct FrameDatagram {
    pub frame_id: u32,
    pub frame_type: FrameType,
    pub frag_id: u16,
    pub frag_count: u16,
    pub width: u16,
    pub height: u16,
    /// Microseconds since the sender's epoch, stamped at the first
    /// transmission attempt; 0 while unsent.
    pub send_ts: u64,
    pub payload: Bytes,
    /// How many times this fragment has been retransmitted.
    pub num_rtx: u32,
    /// When this fragment was last handed to the socket.
    pub last_send_ts: u64,
}

impl PartialEq for FrameDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.frame_id == other.frame_id
            && self.frame_type == other.frame_type
            && self.frag_id == other.frag_id
            && self.frag_count == other.frag_count
            && self.width == other.width
            && self.height == other.height
            && self.send_ts == other.send_ts
            && self.payload == other.payload
    }
}

impl Eq for FrameDatagram {}

impl FrameDatagram {
    pub fn new(
        frame_id: u32,
        frame_type: FrameType,
        frag_id: u16,
        frag_count: u16,
        width: u16,
        height: u16,
        payload: Bytes,
    ) -> Self {
        Self {
            frame_id,
            frame_type,
            frag_id,
            frag_count,
            width,
            height,
            send_ts: 0,
            payload,
            num_rtx: 0,
            last_send_ts: 0,
        }
    }

    pub fn key(&self) -> FragmentKey {
        FragmentKey {
            frame_id: self.frame_id,
            frag_id: self.frag_id,
        }
    }

    /// Total on-wire size. Exceeding the configured MTU is a bug in the
    /// packetizer, not a runtime condition.
    pub fn serialized_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        buf.put_u32_le(self.frame_id);
        buf.put_u8(self.frame_type.to_wire());
        buf.put_u16_le(self.frag_id);
        buf.put_u16_le(self.frag_count);
        buf.put_u16_le(self.width);
        buf.put_u16_le(self.height);
        buf.put_u64_le(self.send_ts);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parse one datagram; the payload is whatever follows the header.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                need: HEADER_SIZE,
                have: raw.len(),
            });
        }

        let mut buf = raw;
        let frame_id = buf.get_u32_le();
        let frame_type = FrameType::from_wire(buf.get_u8())?;
        let frag_id = buf.get_u16_le();
        let frag_count = buf.get_u16_le();
        let width = buf.get_u16_le();
        let height = buf.get_u16_le();
        let send_ts = buf.get_u64_le();

        if frag_count == 0 || frag_id >= frag_count {
            return Err(ProtocolError::InvalidFragment { frag_id, frag_count });
        }

        Ok(Self {
            frame_id,
            frame_type,
            frag_id,
            frag_count,
            width,
            height,
            send_ts,
            payload: Bytes::copy_from_slice(buf),
            num_rtx: 0,
            last_send_ts: 0,
        })
    }
}
