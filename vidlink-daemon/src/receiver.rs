//! The receiver: a blocking datagram loop plus the decode worker.
//!
//! Each received datagram is ACKed immediately, inserted into the reassembly
//! buffer, and any frames that became consumable are moved to the worker.
//! The network thread never touches the decoder; complete frames are handed
//! over by move.

use std::fs::File;
use std::io;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use vidlink_codecs::assembler::FrameAssembler;
use vidlink_codecs::decoder::VpxDecoder;
use vidlink_codecs::sink::NullSink;
use vidlink_codecs::worker::DecodeWorker;
use vidlink_protocol::datagram::FrameDatagram;
use vidlink_protocol::message::{Ack, Config, Message, Signal};

use crate::cli_args::{LazyLevel, ReceiverOpt};

pub fn run(opt: ReceiverOpt) -> Result<()> {
    let lazy = LazyLevel::try_from(opt.lazy)?;
    let feedback_port = opt
        .port
        .checked_add(1)
        .context("data port must leave room for the feedback port")?;

    let data_sock = UdpSocket::bind("0.0.0.0:0").context("failed to bind the data socket")?;
    data_sock
        .connect((opt.host.as_str(), opt.port))
        .with_context(|| format!("failed to connect to {}:{}", opt.host, opt.port))?;
    info!(
        "video session connected: {} -> {}:{}",
        data_sock.local_addr()?,
        opt.host,
        opt.port
    );

    let feedback_sock = UdpSocket::bind("0.0.0.0:0").context("failed to bind the feedback socket")?;
    feedback_sock
        .connect((opt.host.as_str(), feedback_port))
        .with_context(|| format!("failed to connect to {}:{feedback_port}", opt.host))?;
    info!(
        "signal session connected: {} -> {}:{feedback_port}",
        feedback_sock.local_addr()?,
        opt.host
    );

    // introduce ourselves on both channels
    let config = Config {
        width: opt.width,
        height: opt.height,
        frame_rate: opt.fps,
        target_bitrate: opt.cbr,
    };
    data_sock
        .send(&Message::Config(config).serialize())
        .context("failed to send the initial config")?;
    info!("initial config sent");
    feedback_sock
        .send(
            &Message::Signal(Signal {
                target_bitrate: opt.cbr,
            })
            .serialize(),
        )
        .context("failed to send the initial signal")?;
    info!("initial signal sent");

    // the timeout keeps the stream-time check alive on an idle wire
    data_sock
        .set_read_timeout(Some(Duration::from_secs(1)))
        .context("failed to set the socket timeout")?;

    let output = match &opt.output {
        Some(path) => Some(
            File::create(path)
                .with_context(|| format!("unable to create output file: {}", path.display()))?,
        ),
        None => None,
    };

    // at lazy level 2 no worker is spawned and no decoder is built; the
    // protocol state machine below still runs in full
    let worker = match lazy {
        LazyLevel::DecodeDisplay => Some(DecodeWorker::spawn(
            Box::new(VpxDecoder::new().context("failed to create the decoder")?),
            Some(Box::new(NullSink::new())),
            output,
        )),
        LazyLevel::DecodeOnly => Some(DecodeWorker::spawn(
            Box::new(VpxDecoder::new().context("failed to create the decoder")?),
            None,
            output,
        )),
        LazyLevel::Neither => None,
    };

    let mut assembler = FrameAssembler::new();
    let start_time = Instant::now();
    let stream_time = Duration::from_secs(opt.streamtime);
    let mut window_start = Instant::now();
    let mut window_frames = 0u32;
    let mut window_bytes = 0usize;
    let mut buf = vec![0u8; 65536];

    loop {
        if start_time.elapsed() >= stream_time {
            info!("time's up!");
            break;
        }

        let len = match data_sock.recv(&mut buf) {
            Ok(len) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                // the sender is not up yet; keep trying
                warn!("data channel unreachable, retrying");
                continue;
            }
            Err(e) => return Err(e).context("data socket receive failed"),
        };

        // a malformed datagram leaves the stream indeterminate
        let datagram = FrameDatagram::parse(&buf[..len])
            .context("failed to parse a datagram")?;

        // acknowledge everything, even fragments of abandoned frames; the
        // sender still needs to retire them
        let ack = Ack::of(&datagram);
        data_sock
            .send(&Message::Ack(ack).serialize())
            .context("failed to send an ACK")?;
        debug!(
            "acked datagram: frame_id={} frag_id={}",
            datagram.frame_id, datagram.frag_id
        );

        assembler.add_datagram(datagram)?;

        while assembler.next_frame_complete() {
            let Some(frame) = assembler.take_next_frame() else {
                break;
            };
            window_frames += 1;
            window_bytes += frame.data.len();
            if let Some(worker) = &worker {
                worker.push(frame);
            }
        }

        if window_start.elapsed() >= Duration::from_secs(1) {
            let elapsed_ms = window_start.elapsed().as_secs_f64() * 1000.0;
            info!("decodable frames in the last ~1s: {window_frames}");
            info!(
                "  - bitrate (kbps): {:.2}",
                window_bytes as f64 * 8.0 / elapsed_ms
            );
            window_frames = 0;
            window_bytes = 0;
            window_start = Instant::now();
        }
    }

    // dropping the worker drains whatever is queued, then joins it
    Ok(())
}
