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

//! The decode/display worker thread.
//!
//! The network thread pushes complete frames into a shared deque; the worker
//! drains the whole deque under the lock, releases it, and only then decodes
//! so the network thread is never blocked on the codec. The worker owns the
//! decoder and the sink outright; nothing else touches them.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use vidlink_protocol::clock::timestamp_us;

use crate::assembler::AssembledFrame;
use crate::decoder::VideoDecode;
use crate::sink::VideoSink;

struct QueueState {
    frames: VecDeque<AssembledFrame>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

/// Handle to the worker thread. Dropping it lets the worker drain what is
/// queued, then joins it.
pub struct DecodeWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Spawn the worker. `sink` is present only when display is enabled;
    /// `output` receives one CSV row per decoded frame.
    pub fn spawn(
        decoder: Box<dyn VideoDecode>,
        sink: Option<Box<dyn VideoSink>>,
        output: Option<File>,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || worker_main(worker_shared, decoder, sink, output));
        info!("spawned the decode worker thread");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Hand one complete frame to the worker. Ownership moves; the caller
    /// keeps no alias.
    pub fn push(&self, frame: AssembledFrame) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.frames.push_back(frame);
        }
        self.shared.cond.notify_one();
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
        }
        self.shared.cond.notify_one();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("decode worker panicked");
            }
        }
    }
}

fn worker_main(
    shared: Arc<Shared>,
    mut decoder: Box<dyn VideoDecode>,
    mut sink: Option<Box<dyn VideoSink>>,
    mut output: Option<File>,
) {
    let mut local: VecDeque<AssembledFrame> = VecDeque::new();

    let mut num_decoded = 0u32;
    let mut total_decode_ms = 0.0f64;
    let mut max_decode_ms = 0.0f64;
    let mut last_stats = Instant::now();

    loop {
        {
            let mut state = shared.state.lock().unwrap();
            while state.frames.is_empty() && !state.closed {
                state = shared.cond.wait(state).unwrap();
            }
            if state.frames.is_empty() && state.closed {
                return;
            }
            // grab the whole batch and release the lock before decoding
            local.extend(state.frames.drain(..));
        }

        while let Some(frame) = local.pop_front() {
            let decode_start = Instant::now();
            let pixel_frames = match decoder.decode(&frame.data) {
                Ok(frames) => frames,
                Err(e) => {
                    // the stream is undecodable from here on
                    error!("fatal decoder error on frame {}: {e}", frame.id);
                    std::process::exit(1);
                }
            };
            let decode_ms = decode_start.elapsed().as_secs_f64() * 1000.0;

            if let Some(out) = output.as_mut() {
                let row = format!(
                    "{},{},{},{:.3}\n",
                    frame.id,
                    frame.data.len(),
                    timestamp_us(),
                    decode_ms
                );
                if let Err(e) = out.write_all(row.as_bytes()) {
                    error!("failed to write a stats row: {e}");
                }
            }

            if let Some(sink) = sink.as_mut() {
                for pixel_frame in &pixel_frames {
                    if let Err(e) = sink.show_frame(pixel_frame) {
                        error!("display error on frame {}: {e}", frame.id);
                    }
                }
            }

            num_decoded += 1;
            total_decode_ms += decode_ms;
            max_decode_ms = max_decode_ms.max(decode_ms);

            if last_stats.elapsed() >= Duration::from_secs(1) {
                if num_decoded > 0 {
                    info!(
                        "avg/max decoding time (ms) of {} frames: {:.2}/{:.2}",
                        num_decoded,
                        total_decode_ms / num_decoded as f64,
                        max_decode_ms
                    );
                }
                num_decoded = 0;
                total_decode_ms = 0.0;
                max_decode_ms = 0.0;
                last_stats = Instant::now();
            }
        }
    }
}
