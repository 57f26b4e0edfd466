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

//! Slices encoded frames into datagram-sized fragments.

use bytes::Bytes;

use crate::datagram::{FrameDatagram, FrameType};

/// Fragments encoded frames and owns the monotonically increasing frame-id
/// counter; a frame id is never reused.
pub struct Packetizer {
    max_payload: usize,
    width: u16,
    height: u16,
    next_frame_id: u32,
}

impl Packetizer {
    /// `max_payload` is `MTU - HEADER_SIZE` and must be positive; the CLI
    /// validates the MTU before anything is constructed.
    pub fn new(max_payload: usize, width: u16, height: u16) -> Self {
        debug_assert!(max_payload > 0);
        Self {
            max_payload,
            width,
            height,
            next_frame_id: 0,
        }
    }

    /// The id the next packetized frame will carry.
    pub fn next_frame_id(&self) -> u32 {
        self.next_frame_id
    }

    /// Slice one encoded frame into `ceil(len / max_payload)` fragments, all
    /// of `max_payload` bytes except a shorter final one. Slicing is
    /// zero-copy; every fragment shares the frame's buffer.
    pub fn packetize(&mut self, frame_type: FrameType, bitstream: Bytes) -> Vec<FrameDatagram> {
        debug_assert!(!bitstream.is_empty());

        let frag_count = bitstream.len().div_ceil(self.max_payload);
        debug_assert!(frag_count <= u16::MAX as usize);

        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;

        let mut fragments = Vec::with_capacity(frag_count);
        for frag_id in 0..frag_count {
            let start = frag_id * self.max_payload;
            let end = usize::min(start + self.max_payload, bitstream.len());
            fragments.push(FrameDatagram::new(
                frame_id,
                frame_type,
                frag_id as u16,
                frag_count as u16,
                self.width,
                self.height,
                bitstream.slice(start..end),
            ));
        }
        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagram::{max_payload, HEADER_SIZE};

    #[test]
    fn small_frame_is_one_fragment() {
        let mut packetizer = Packetizer::new(1000, 640, 480);
        let fragments = packetizer.packetize(FrameType::Key, Bytes::from(vec![7u8; 999]));
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].frag_id, 0);
        assert_eq!(fragments[0].frag_count, 1);
        assert_eq!(fragments[0].payload.len(), 999);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let mut packetizer = Packetizer::new(1000, 640, 480);
        let fragments = packetizer.packetize(FrameType::NonKey, Bytes::from(vec![0u8; 3000]));
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.payload.len() == 1000));
    }

    #[test]
    fn tiny_mtu_splits_as_specified() {
        // MTU 50 with a 21-byte header leaves 29 bytes of payload; 100 bytes
        // of bitstream split as 29 + 29 + 29 + 13.
        let payload = max_payload(50);
        assert_eq!(payload, 29);
        let mut packetizer = Packetizer::new(payload, 64, 64);
        let fragments = packetizer.packetize(FrameType::Key, Bytes::from(vec![1u8; 100]));
        let sizes: Vec<usize> = fragments.iter().map(|f| f.payload.len()).collect();
        assert_eq!(sizes, [29, 29, 29, 13]);
        assert!(fragments.last().unwrap().serialized_size() <= 13 + HEADER_SIZE);
    }

    #[test]
    fn frame_ids_increase_and_are_never_reused() {
        let mut packetizer = Packetizer::new(10, 64, 64);
        let a = packetizer.packetize(FrameType::Key, Bytes::from_static(b"x"));
        let b = packetizer.packetize(FrameType::NonKey, Bytes::from_static(b"y"));
        assert_eq!(a[0].frame_id, 0);
        assert_eq!(b[0].frame_id, 1);
        assert_eq!(packetizer.next_frame_id(), 2);
    }

    #[test]
    fn fragments_start_unsent() {
        let mut packetizer = Packetizer::new(10, 64, 64);
        let fragments = packetizer.packetize(FrameType::Key, Bytes::from(vec![0u8; 25]));
        assert!(fragments
            .iter()
            .all(|f| f.send_ts == 0 && f.num_rtx == 0 && f.last_send_ts == 0));
    }
}
