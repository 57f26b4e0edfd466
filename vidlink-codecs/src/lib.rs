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

//! Video codec seams and the receive-side frame pipeline.
//!
//! The protocol never depends on a concrete codec: the sender drives any
//! [`VideoEncode`] and the receiver's worker drives any [`VideoDecode`]. The
//! shipped implementations wrap libvpx VP9; swapping in a hardware H.264 or
//! HEVC backend is a new implementation of the same two traits.
//!
//! [`VideoEncode`]: encoder::VideoEncode
//! [`VideoDecode`]: decoder::VideoDecode

pub mod assembler;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod sink;
pub mod worker;

pub use assembler::{AssembledFrame, FrameAssembler};
pub use decoder::{DecodedFrame, VideoDecode, VpxDecoder};
pub use encoder::{EncodedFrame, VideoEncode, VpxEncoder, VpxEncoderBuilder};
pub use error::CodecError;
pub use sink::{NullSink, VideoSink};
pub use worker::DecodeWorker;
