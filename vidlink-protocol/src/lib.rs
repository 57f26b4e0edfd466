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

//! Wire protocol for vidlink.
//!
//! Everything that crosses the UDP sockets is defined here: the
//! [`FrameDatagram`] carrying one fragment of an encoded video frame, the
//! control messages ([`Ack`], [`Config`], [`Signal`]) sharing a one-byte type
//! tag, and the [`Packetizer`] that slices encoded frames into MTU-sized
//! fragments. All integers are little-endian with exact widths.
//!
//! [`FrameDatagram`]: datagram::FrameDatagram
//! [`Ack`]: message::Ack
//! [`Config`]: message::Config
//! [`Signal`]: message::Signal
//! [`Packetizer`]: fragment::Packetizer

pub mod clock;
pub mod datagram;
pub mod error;
pub mod fragment;
pub mod message;

pub use datagram::{max_payload, FragmentKey, FrameDatagram, FrameType, DEFAULT_MTU, HEADER_SIZE};
pub use error::ProtocolError;
pub use fragment::Packetizer;
pub use message::{Ack, Config, Message, Record, Signal};
