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

//! The presentation seam.

use tracing::trace;

use crate::decoder::DecodedFrame;
use crate::error::Result;

/// Where decoded frames go when display is enabled. A real window surface
/// (SDL, winit, ...) implements this; the worker never knows the difference.
pub trait VideoSink: Send {
    fn show_frame(&mut self, frame: &DecodedFrame) -> Result<()>;
}

/// Sink that accepts every frame and renders nothing.
#[derive(Debug, Default)]
pub struct NullSink {
    frames_shown: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoSink for NullSink {
    fn show_frame(&mut self, frame: &DecodedFrame) -> Result<()> {
        self.frames_shown += 1;
        trace!(
            "showing frame {}x{} ({} shown so far)",
            frame.width,
            frame.height,
            self.frames_shown
        );
        Ok(())
    }
}
