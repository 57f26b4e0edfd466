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

use thiserror::Error;

/// Result type for wire-protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Ways a received datagram can be malformed. Serialization is total and
/// never fails; parsing returns one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("truncated record: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("invalid frame type {0} on the wire")]
    InvalidFrameType(u8),

    #[error("invalid fragment layout: frag_id {frag_id}, frag_count {frag_count}")]
    InvalidFragment { frag_id: u16, frag_count: u16 },

    #[error("unknown control message tag {0}")]
    UnknownTag(u8),

    #[error("{kind} message has length {have}, expected {need}")]
    BadLength {
        kind: &'static str,
        need: usize,
        have: usize,
    },
}
