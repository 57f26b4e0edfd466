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

//! VP9 decoder using libvpx.

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr;

use vpx_sys::*;

use crate::encoder::vpx;
use crate::error::Result;

/// A fully decoded frame: concatenated I420 planes, ready for a sink.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Capability seam for the video decoder; the worker only talks to this.
pub trait VideoDecode: Send {
    /// Decode one reassembled frame bitstream.
    ///
    /// May return zero frames (the decoder is still buffering) or several
    /// (it flushed).
    fn decode(&mut self, bitstream: &[u8]) -> Result<Vec<DecodedFrame>>;
}

/// A VP9 decoder wrapping libvpx.
pub struct VpxDecoder {
    ctx: vpx_codec_ctx_t,
}

// SAFETY: the context is only ever driven from the worker thread.
unsafe impl Send for VpxDecoder {}

impl VpxDecoder {
    pub fn new() -> Result<Self> {
        let mut ctx = unsafe { MaybeUninit::zeroed().assume_init() };
        vpx!(vpx_codec_dec_init_ver(
            &mut ctx,
            vpx_codec_vp9_dx(),
            ptr::null(),
            0,
            VPX_DECODER_ABI_VERSION as i32,
        ));
        Ok(Self { ctx })
    }
}

impl VideoDecode for VpxDecoder {
    fn decode(&mut self, bitstream: &[u8]) -> Result<Vec<DecodedFrame>> {
        vpx!(vpx_codec_decode(
            &mut self.ctx,
            bitstream.as_ptr(),
            bitstream.len() as u32,
            ptr::null_mut(),
            0,
        ));

        let mut frames = Vec::new();
        let mut iter = ptr::null_mut::<c_void>();
        loop {
            let img = unsafe {
                vpx_codec_get_frame(&mut self.ctx, &mut iter as *mut _ as *mut *const c_void)
            };
            if img.is_null() {
                break;
            }

            let frame = unsafe {
                let width = (*img).d_w as usize;
                let height = (*img).d_h as usize;
                let uv_width = width / 2;
                let uv_height = height / 2;

                let mut data = Vec::with_capacity(width * height + 2 * uv_width * uv_height);
                copy_plane((*img).planes[0], (*img).stride[0], width, height, &mut data);
                copy_plane(
                    (*img).planes[1],
                    (*img).stride[1],
                    uv_width,
                    uv_height,
                    &mut data,
                );
                copy_plane(
                    (*img).planes[2],
                    (*img).stride[2],
                    uv_width,
                    uv_height,
                    &mut data,
                );

                DecodedFrame {
                    width: width as u32,
                    height: height as u32,
                    data,
                }
            };
            frames.push(frame);
        }
        Ok(frames)
    }
}

impl Drop for VpxDecoder {
    fn drop(&mut self) {
        unsafe {
            vpx_codec_destroy(&mut self.ctx);
        }
    }
}

/// Copy one image plane into `buffer`, accounting for stride.
unsafe fn copy_plane(plane: *const u8, stride: i32, width: usize, height: usize, buffer: &mut Vec<u8>) {
    let mut row = plane;
    for _ in 0..height {
        buffer.extend_from_slice(std::slice::from_raw_parts(row, width));
        row = row.offset(stride as isize);
    }
}
