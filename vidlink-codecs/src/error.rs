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

/// Result type for codec and frame-pipeline operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid resolution {width}x{height}: dimensions must be even and non-zero")]
    InvalidResolution { width: u32, height: u32 },

    /// A libvpx call failed; the backend error code is preserved.
    #[error("vpx call failed with code {0}")]
    Vpx(i32),

    #[error("vpx returned a null pointer")]
    VpxNull,

    /// A fragment disagreed with what earlier fragments declared about its
    /// frame. The stream is indeterminate from here on.
    #[error("fragment disagrees with frame {frame_id}: {detail}")]
    InconsistentFragment { frame_id: u32, detail: String },
}
