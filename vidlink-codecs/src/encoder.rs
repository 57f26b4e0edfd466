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

//! VP9 encoder using libvpx, tuned for low-latency streaming.
//!
//! The GOP is infinite: after the first frame, key frames appear only when
//! the caller forces one (the sender does so to recover from a stalled
//! transport). Rate control is CBR with roughly five frames of buffering,
//! and the target bitrate can be changed live between frames.

use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_ulong};

use bytes::Bytes;
use vpx_sys::*;

use crate::error::{CodecError, Result};

macro_rules! vpx {
    ($f:expr) => {{
        let res = unsafe { $f };
        let res_int = unsafe { std::mem::transmute::<vpx_sys::vpx_codec_err_t, i32>(res) };
        if res_int != 0 {
            return Err($crate::error::CodecError::Vpx(res_int));
        }
        res
    }};
}

macro_rules! vpx_ptr {
    ($f:expr) => {{
        let res = unsafe { $f };
        if res.is_null() {
            return Err($crate::error::CodecError::VpxNull);
        }
        res
    }};
}

pub(crate) use vpx;

/// One compressed frame produced by an encoder.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    /// Whether this frame is decodable standalone (IDR / key frame).
    pub key: bool,
}

/// Capability seam for the video encoder.
///
/// The sender only ever talks to this trait, so a codec substitution cannot
/// change the protocol.
pub trait VideoEncode: Send {
    /// Encode one raw I420 frame (`width * height * 3 / 2` bytes).
    ///
    /// Returns zero or more compressed frames; with an infinite GOP the
    /// steady state is one in, one out. When `force_keyframe` is set, the
    /// next returned frame is guaranteed to be a key frame.
    fn encode(&mut self, yuv: &[u8], force_keyframe: bool) -> Result<Vec<EncodedFrame>>;

    /// Live-reconfigure the CBR target. Idempotent; 0 leaves the current
    /// rate unchanged.
    fn set_bitrate_kbps(&mut self, bitrate_kbps: u32) -> Result<()>;
}

/// Builder for a [`VpxEncoder`].
pub struct VpxEncoderBuilder {
    /// Minimum quantizer (lower = higher quality, 0-63).
    pub min_quantizer: u32,
    /// Maximum quantizer (higher = more compression, 0-63).
    pub max_quantizer: u32,
    /// Initial target bitrate in kbps.
    pub bitrate_kbps: u32,
    /// Frames per second; also sizes the rate-control buffer.
    pub fps: u32,
    /// Resolution as (width, height). Both must be even and non-zero.
    pub resolution: (u32, u32),
    /// CPU usage / speed trade-off (higher = faster, lower quality).
    pub cpu_used: u32,
    /// VP9 encoding profile (0 = 8-bit 4:2:0).
    pub profile: u32,
}

impl VpxEncoderBuilder {
    pub fn new(fps: u32) -> Self {
        Self {
            bitrate_kbps: 500,
            max_quantizer: 60,
            min_quantizer: 10,
            resolution: (640, 480),
            fps,
            cpu_used: 6,
            profile: 0,
        }
    }

    pub fn set_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    pub fn set_bitrate_kbps(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    /// Build the encoder. Fails on an invalid resolution or a libvpx error.
    pub fn build(&self) -> Result<VpxEncoder> {
        let (width, height) = self.resolution;
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(CodecError::InvalidResolution { width, height });
        }

        let cfg_ptr = vpx_ptr!(vpx_codec_vp9_cx());
        let mut cfg = unsafe { MaybeUninit::zeroed().assume_init() };
        vpx!(vpx_codec_enc_config_default(cfg_ptr, &mut cfg, 0));

        cfg.g_w = width;
        cfg.g_h = height;
        cfg.g_timebase.num = 1;
        cfg.g_timebase.den = self.fps as c_int;
        cfg.rc_target_bitrate = self.bitrate_kbps;
        cfg.rc_min_quantizer = self.min_quantizer;
        cfg.rc_max_quantizer = self.max_quantizer;
        cfg.g_threads = 2;
        cfg.g_lag_in_frames = 0;
        cfg.g_error_resilient = VPX_ERROR_RESILIENT_DEFAULT;
        cfg.g_pass = vpx_enc_pass::VPX_RC_ONE_PASS;
        cfg.g_profile = self.profile;
        // CBR with ~5 frames of buffering; initial delay fills the buffer
        cfg.rc_end_usage = vpx_rc_mode::VPX_CBR;
        let buffer_ms = 5_000 / self.fps;
        cfg.rc_buf_sz = buffer_ms as _;
        cfg.rc_buf_initial_sz = buffer_ms as _;
        cfg.rc_buf_optimal_sz = buffer_ms as _;
        // infinite GOP: key frames only on request
        cfg.kf_mode = vpx_kf_mode::VPX_KF_DISABLED;

        let mut ctx = unsafe { MaybeUninit::zeroed().assume_init() };
        vpx!(vpx_codec_enc_init_ver(
            &mut ctx,
            cfg_ptr,
            &cfg,
            0,
            VPX_ENCODER_ABI_VERSION as i32
        ));

        unsafe {
            vpx_codec_control_(
                &mut ctx,
                vp8e_enc_control_id::VP8E_SET_CPUUSED as c_int,
                self.cpu_used as c_int,
            );
            vpx_codec_control_(&mut ctx, vp8e_enc_control_id::VP9E_SET_ROW_MT as c_int, 1);
            vpx_codec_control_(
                &mut ctx,
                vp8e_enc_control_id::VP9E_SET_TILE_COLUMNS as c_int,
                2,
            );
        }

        Ok(VpxEncoder {
            ctx,
            cfg,
            width,
            height,
            pts: 0,
        })
    }
}

/// A VP9 video encoder wrapping libvpx. Create via [`VpxEncoderBuilder`].
pub struct VpxEncoder {
    ctx: vpx_codec_ctx_t,
    cfg: vpx_codec_enc_cfg_t,
    width: u32,
    height: u32,
    pts: i64,
}

// SAFETY: the context is only ever driven from one thread at a time.
unsafe impl Send for VpxEncoder {}

impl VideoEncode for VpxEncoder {
    fn encode(&mut self, yuv: &[u8], force_keyframe: bool) -> Result<Vec<EncodedFrame>> {
        let mut image = unsafe { MaybeUninit::zeroed().assume_init() };
        vpx_ptr!(vpx_img_wrap(
            &mut image,
            vpx_img_fmt::VPX_IMG_FMT_I420,
            self.width as _,
            self.height as _,
            1,
            yuv.as_ptr() as _,
        ));

        let mut flags: vpx_enc_frame_flags_t = 0;
        if force_keyframe {
            flags |= VPX_EFLAG_FORCE_KF as vpx_enc_frame_flags_t;
        }

        vpx!(vpx_codec_encode(
            &mut self.ctx,
            &image,
            self.pts,
            1, // duration
            flags,
            VPX_DL_REALTIME as c_ulong,
        ));
        self.pts += 1;

        let mut frames = Vec::new();
        let mut iter: vpx_codec_iter_t = std::ptr::null();
        loop {
            let pkt = unsafe { vpx_codec_get_cx_data(&mut self.ctx, &mut iter) };
            if pkt.is_null() {
                break;
            }
            unsafe {
                if (*pkt).kind == vpx_codec_cx_pkt_kind::VPX_CODEC_CX_FRAME_PKT {
                    let f = &(*pkt).data.frame;
                    let data = std::slice::from_raw_parts(f.buf as *const u8, f.sz as usize);
                    frames.push(EncodedFrame {
                        data: Bytes::copy_from_slice(data),
                        key: (f.flags & VPX_FRAME_IS_KEY) != 0,
                    });
                }
            }
        }
        Ok(frames)
    }

    fn set_bitrate_kbps(&mut self, bitrate_kbps: u32) -> Result<()> {
        if bitrate_kbps == 0 || bitrate_kbps == self.cfg.rc_target_bitrate {
            return Ok(());
        }
        self.cfg.rc_target_bitrate = bitrate_kbps;
        vpx!(vpx_codec_enc_config_set(&mut self.ctx, &self.cfg));
        Ok(())
    }
}

impl Drop for VpxEncoder {
    fn drop(&mut self) {
        unsafe {
            vpx_codec_destroy(&mut self.ctx);
        }
    }
}
