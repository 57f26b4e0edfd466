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

//! Control messages and the data-channel demux.
//!
//! All control records start with a one-byte type tag (tag 0 is reserved and
//! never transmitted). The data channel carries frame datagrams and ACKs
//! mixed; [`Record::parse`] resolves the ambiguity.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::datagram::FrameDatagram;
use crate::error::{ProtocolError, Result};

const TAG_ACK: u8 = 1;
const TAG_CONFIG: u8 = 2;
const TAG_SIGNAL: u8 = 3;

const ACK_SIZE: usize = 1 + 4 + 2 + 8;
const CONFIG_SIZE: usize = 1 + 2 + 2 + 2 + 4;
const SIGNAL_SIZE: usize = 1 + 4;

/// Acknowledges one received fragment, echoing its send timestamp so the
/// sender can sample the RTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub frame_id: u32,
    pub frag_id: u16,
    pub send_ts: u64,
}

impl Ack {
    pub fn of(datagram: &FrameDatagram) -> Self {
        Self {
            frame_id: datagram.frame_id,
            frag_id: datagram.frag_id,
            send_ts: datagram.send_ts,
        }
    }
}

/// Session parameters the receiver dictates; sent once on the data channel
/// before any frame flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub width: u16,
    pub height: u16,
    pub frame_rate: u16,
    /// Target bitrate in kbps; 0 leaves the encoder default in place.
    pub target_bitrate: u32,
}

/// Bitrate update, receiver to sender, on the feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    /// Target bitrate in kbps; 0 leaves the encoder default in place.
    pub target_bitrate: u32,
}

/// Any control message, discriminated by its leading type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Ack(Ack),
    Config(Config),
    Signal(Signal),
}

impl Message {
    pub fn serialize(&self) -> Bytes {
        match self {
            Message::Ack(ack) => {
                let mut buf = BytesMut::with_capacity(ACK_SIZE);
                buf.put_u8(TAG_ACK);
                buf.put_u32_le(ack.frame_id);
                buf.put_u16_le(ack.frag_id);
                buf.put_u64_le(ack.send_ts);
                buf.freeze()
            }
            Message::Config(config) => {
                let mut buf = BytesMut::with_capacity(CONFIG_SIZE);
                buf.put_u8(TAG_CONFIG);
                buf.put_u16_le(config.width);
                buf.put_u16_le(config.height);
                buf.put_u16_le(config.frame_rate);
                buf.put_u32_le(config.target_bitrate);
                buf.freeze()
            }
            Message::Signal(signal) => {
                let mut buf = BytesMut::with_capacity(SIGNAL_SIZE);
                buf.put_u8(TAG_SIGNAL);
                buf.put_u32_le(signal.target_bitrate);
                buf.freeze()
            }
        }
    }

    /// Parse one control message. Length must match the tag's record exactly;
    /// a datagram boundary delimits each record, so trailing bytes mean the
    /// record is not what its tag claims.
    pub fn parse(raw: &[u8]) -> Result<Message> {
        let Some(&tag) = raw.first() else {
            return Err(ProtocolError::Truncated { need: 1, have: 0 });
        };

        match tag {
            TAG_ACK => {
                expect_len("ACK", ACK_SIZE, raw)?;
                let mut buf = &raw[1..];
                Ok(Message::Ack(Ack {
                    frame_id: buf.get_u32_le(),
                    frag_id: buf.get_u16_le(),
                    send_ts: buf.get_u64_le(),
                }))
            }
            TAG_CONFIG => {
                expect_len("CONFIG", CONFIG_SIZE, raw)?;
                let mut buf = &raw[1..];
                Ok(Message::Config(Config {
                    width: buf.get_u16_le(),
                    height: buf.get_u16_le(),
                    frame_rate: buf.get_u16_le(),
                    target_bitrate: buf.get_u32_le(),
                }))
            }
            TAG_SIGNAL => {
                expect_len("SIGNAL", SIGNAL_SIZE, raw)?;
                let mut buf = &raw[1..];
                Ok(Message::Signal(Signal {
                    target_bitrate: buf.get_u32_le(),
                }))
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

fn expect_len(kind: &'static str, need: usize, raw: &[u8]) -> Result<()> {
    if raw.len() != need {
        return Err(ProtocolError::BadLength {
            kind,
            need,
            have: raw.len(),
        });
    }
    Ok(())
}

/// One record received on the data channel, where frame datagrams and
/// control messages coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Frame(FrameDatagram),
    Control(Message),
}

impl Record {
    /// Demux a data-channel record. A leading byte of 1..=3 is tried as a
    /// control message first; only an exact-length control parse claims the
    /// record, so a frame datagram whose frame-id byte collides with a tag
    /// still parses as a frame (its header alone is longer than any control
    /// message).
    pub fn parse(raw: &[u8]) -> Result<Record> {
        if matches!(raw.first(), Some(TAG_ACK..=TAG_SIGNAL)) {
            if let Ok(message) = Message::parse(raw) {
                return Ok(Record::Control(message));
            }
        }
        FrameDatagram::parse(raw).map(Record::Frame)
    }
}
