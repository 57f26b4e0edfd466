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

//! Reassembles frames from fragments and decides what to hand the decoder.
//!
//! Frames leave in strictly increasing id order. When the next expected
//! frame cannot be completed, a complete key frame further ahead lets the
//! assembler jump forward and prune everything behind it; it never moves
//! backward.

use std::collections::BTreeMap;

use tracing::warn;

use vidlink_protocol::datagram::{FrameDatagram, FrameType};

use crate::error::{CodecError, Result};

/// One frame being reassembled, with a slot per fragment.
#[derive(Debug)]
struct PendingFrame {
    id: u32,
    frame_type: FrameType,
    width: u16,
    height: u16,
    frags: Vec<Option<FrameDatagram>>,
    /// Slots still empty; the frame is complete at zero.
    null_frags: u32,
    frame_size: usize,
}

impl PendingFrame {
    fn new(first: &FrameDatagram) -> Self {
        Self {
            id: first.frame_id,
            frame_type: first.frame_type,
            width: first.width,
            height: first.height,
            frags: vec![None; first.frag_count as usize],
            null_frags: first.frag_count as u32,
            frame_size: 0,
        }
    }

    fn complete(&self) -> bool {
        self.null_frags == 0
    }

    fn insert(&mut self, datagram: FrameDatagram) -> Result<()> {
        if datagram.frame_type != self.frame_type || datagram.frag_count as usize != self.frags.len()
        {
            return Err(CodecError::InconsistentFragment {
                frame_id: self.id,
                detail: format!(
                    "got type {:?} with {} fragments, frame has type {:?} with {}",
                    datagram.frame_type,
                    datagram.frag_count,
                    self.frame_type,
                    self.frags.len()
                ),
            });
        }

        // duplicates are silently ignored
        let slot = &mut self.frags[datagram.frag_id as usize];
        if slot.is_none() {
            self.frame_size += datagram.payload.len();
            self.null_frags -= 1;
            *slot = Some(datagram);
        }
        Ok(())
    }
}

/// A complete frame, payloads concatenated in fragment order, ready for the
/// decode worker.
#[derive(Debug)]
pub struct AssembledFrame {
    pub id: u32,
    pub frame_type: FrameType,
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

/// The receiver's reassembly buffer.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    frame_buf: BTreeMap<u32, PendingFrame>,
    next_frame: u32,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of the next frame to be delivered.
    pub fn next_frame(&self) -> u32 {
        self.next_frame
    }

    /// Insert one received fragment. Fragments of frames that were already
    /// delivered or pruned are dropped without error; a fragment that
    /// contradicts its frame's established type or fragment count is fatal.
    pub fn add_datagram(&mut self, datagram: FrameDatagram) -> Result<()> {
        if datagram.frame_id < self.next_frame {
            return Ok(());
        }

        self.frame_buf
            .entry(datagram.frame_id)
            .or_insert_with(|| PendingFrame::new(&datagram))
            .insert(datagram)
    }

    /// True when a frame is ready to be taken. When `next_frame` itself is
    /// not complete, scans from the newest buffered frame downward for a
    /// complete key frame to jump to, pruning everything older.
    pub fn next_frame_complete(&mut self) -> bool {
        if self
            .frame_buf
            .get(&self.next_frame)
            .is_some_and(PendingFrame::complete)
        {
            return true;
        }

        // only ids >= next_frame are ever buffered, so a hit is a jump ahead
        let recovery = self
            .frame_buf
            .iter()
            .rev()
            .find(|(_, frame)| frame.frame_type == FrameType::Key && frame.complete())
            .map(|(&id, _)| id);

        if let Some(id) = recovery {
            warn!(
                "recovery: skipped {} frames ahead to key frame {}",
                id - self.next_frame,
                id
            );
            self.advance_to(id);
            return true;
        }
        false
    }

    /// Take the completed frame at `next_frame`, concatenating its payloads
    /// in fragment order, then advance and prune. Returns `None` if the
    /// frame is not complete.
    pub fn take_next_frame(&mut self) -> Option<AssembledFrame> {
        if !self
            .frame_buf
            .get(&self.next_frame)
            .is_some_and(PendingFrame::complete)
        {
            return None;
        }

        let frame = self.frame_buf.remove(&self.next_frame)?;
        let mut data = Vec::with_capacity(frame.frame_size);
        for fragment in frame.frags.iter().flatten() {
            data.extend_from_slice(&fragment.payload);
        }

        self.advance_to(self.next_frame + 1);

        Some(AssembledFrame {
            id: frame.id,
            frame_type: frame.frame_type,
            width: frame.width,
            height: frame.height,
            data,
        })
    }

    fn advance_to(&mut self, frontier: u32) {
        self.next_frame = frontier;
        self.frame_buf = self.frame_buf.split_off(&frontier);
    }
}
