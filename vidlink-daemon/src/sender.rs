//! The sender: one event-loop task driving the whole transmit side.
//!
//! Four event sources are multiplexed: the frame-rate tick, data-socket
//! writability (armed only while something is queued), data-socket
//! readability (ACK ingress), the 1 Hz stats tick, and feedback-socket
//! readability (bitrate signals). All state is confined to the loop task, so
//! nothing is locked.

use std::fs::File;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use vidlink_codecs::encoder::{VideoEncode, VpxEncoderBuilder};
use vidlink_protocol::clock::timestamp_us;
use vidlink_protocol::datagram::{max_payload, FrameType, HEADER_SIZE};
use vidlink_protocol::fragment::Packetizer;
use vidlink_protocol::message::{Message, Record};

use crate::cli_args::SenderOpt;
use crate::retransmit::RetransmitManager;
use crate::session;
use crate::source::YuvFileSource;
use crate::stats::EncodeStats;

pub async fn run(opt: SenderOpt) -> Result<()> {
    let max_payload = max_payload(opt.mtu);
    if max_payload == 0 {
        bail!(
            "MTU {} leaves no room for payload ({HEADER_SIZE} bytes of header)",
            opt.mtu
        );
    }
    let feedback_port = opt
        .port
        .checked_add(1)
        .context("data port must leave room for the feedback port")?;

    let data_sock = UdpSocket::bind(("0.0.0.0", opt.port))
        .await
        .context("failed to bind the data socket")?;
    info!("binding address (data channel): {}", data_sock.local_addr()?);
    let feedback_sock = UdpSocket::bind(("0.0.0.0", feedback_port))
        .await
        .context("failed to bind the feedback socket")?;
    info!(
        "binding address (feedback channel): {}",
        feedback_sock.local_addr()?
    );

    // the receiver speaks first on both channels
    let (peer_data, config) = session::wait_for_config(&data_sock).await?;
    info!("client address (data channel): {peer_data}");
    data_sock.connect(peer_data).await?;

    let (peer_feedback, _init_signal) = session::wait_for_signal(&feedback_sock).await?;
    info!("client address (feedback channel): {peer_feedback}");
    feedback_sock.connect(peer_feedback).await?;

    info!(
        "received config: width={} height={} fps={} bitrate={} kbps",
        config.width, config.height, config.frame_rate, config.target_bitrate
    );
    if config.width == 0 || config.height == 0 || config.frame_rate == 0 {
        bail!("received a config with zero width, height or frame rate");
    }

    let source = YuvFileSource::open(&opt.yuv_path, config.width, config.height)
        .with_context(|| format!("unable to open input file: {}", opt.yuv_path.display()))?;

    let mut builder = VpxEncoderBuilder::new(config.frame_rate as u32)
        .set_resolution(config.width as u32, config.height as u32);
    // bitrate 0 keeps the builder default
    if config.target_bitrate > 0 {
        builder = builder.set_bitrate_kbps(config.target_bitrate);
    }
    let encoder: Box<dyn VideoEncode> =
        Box::new(builder.build().context("failed to create the encoder")?);

    let output = match &opt.output {
        Some(path) => Some(File::create(path).with_context(|| {
            format!("unable to create output file: {}", path.display())
        })?),
        None => None,
    };

    let frame_buf = vec![0u8; source.frame_size()];
    let mut sender = Sender {
        encoder,
        packetizer: Packetizer::new(max_payload, config.width, config.height),
        manager: RetransmitManager::new(),
        stats: EncodeStats::default(),
        source,
        frame_buf,
        output,
        target_bitrate_kbps: config.target_bitrate,
    };

    let frame_interval = Duration::from_nanos(1_000_000_000 / config.frame_rate as u64);
    let mut next_frame_deadline = Instant::now() + frame_interval;
    let mut stats_interval = time::interval(Duration::from_secs(1));
    stats_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    info!("streaming at {} fps", config.frame_rate);
    loop {
        tokio::select! {
            _ = time::sleep_until(next_frame_deadline) => {
                // count missed expirations the way a timerfd read would
                let now = Instant::now();
                let mut expirations = 1u32;
                next_frame_deadline += frame_interval;
                while next_frame_deadline <= now {
                    expirations += 1;
                    next_frame_deadline += frame_interval;
                }
                if expirations > 1 {
                    warn!("skipping {} raw frames", expirations - 1);
                }
                sender.on_frame_tick(expirations)?;
            }
            ready = data_sock.writable(), if sender.manager.has_queued() => {
                ready?;
                sender.flush_send_buf(&data_sock)?;
            }
            ready = data_sock.readable() => {
                ready?;
                sender.drain_acks(&data_sock);
            }
            _ = stats_interval.tick() => {
                sender.stats.log_window(sender.manager.rtt());
            }
            ready = feedback_sock.readable() => {
                ready?;
                sender.drain_signals(&feedback_sock)?;
            }
        }
    }
}

struct Sender {
    encoder: Box<dyn VideoEncode>,
    packetizer: Packetizer,
    manager: RetransmitManager,
    stats: EncodeStats,
    source: YuvFileSource,
    frame_buf: Vec<u8>,
    output: Option<File>,
    target_bitrate_kbps: u32,
}

impl Sender {
    /// Advance the source by `expirations` raw frames (a late wakeup skips
    /// the ones it missed), then encode and packetize the last one.
    fn on_frame_tick(&mut self, expirations: u32) -> Result<()> {
        for _ in 0..expirations {
            self.source
                .read_frame(&mut self.frame_buf)
                .context("failed to read a raw frame")?;
        }

        // a stalled transport turns this frame into a fresh GOP
        let force_keyframe = self.manager.check_give_up(timestamp_us());

        let encode_start = std::time::Instant::now();
        let encoded = self
            .encoder
            .encode(&self.frame_buf, force_keyframe)
            .context("encoder failure")?;
        let encode_ms = encode_start.elapsed().as_secs_f64() * 1000.0;
        self.stats.record(encode_ms);

        for frame in encoded {
            let frame_id = self.packetizer.next_frame_id();
            let frame_type = if frame.key {
                FrameType::Key
            } else {
                FrameType::NonKey
            };
            if frame.key {
                debug!("encoded a key frame: frame_id={frame_id}");
            }

            let frame_size = frame.data.len();
            if frame_size == 0 {
                continue;
            }

            if let Some(out) = self.output.as_mut() {
                let ewma_ms = self.manager.rtt().ewma_rtt_us().unwrap_or(0.0) / 1000.0;
                let row = format!(
                    "{frame_id},{},{frame_size},{encode_ms:.3},{ewma_ms:.3}\n",
                    self.target_bitrate_kbps
                );
                out.write_all(row.as_bytes())
                    .context("failed to write a stats row")?;
            }

            let fragments = self.packetizer.packetize(frame_type, frame.data);
            self.manager.enqueue(fragments);
        }
        Ok(())
    }

    /// Drain the send buffer from the front until the socket pushes back.
    fn flush_send_buf(&mut self, sock: &UdpSocket) -> Result<()> {
        loop {
            let wire = match self.manager.send_buf().front_mut() {
                Some(datagram) => {
                    // stamped at the instant of the transmission attempt
                    datagram.send_ts = timestamp_us();
                    datagram.serialize()
                }
                None => break,
            };

            match sock.try_send(&wire) {
                Ok(_) => {
                    if let Some(datagram) = self.manager.send_buf().pop_front() {
                        debug!(
                            "sent datagram: frame_id={} frag_id={} frag_cnt={} rtx={}",
                            datagram.frame_id,
                            datagram.frag_id,
                            datagram.frag_count,
                            datagram.num_rtx
                        );
                        // retransmissions keep their tracking on the
                        // original unacked entry
                        if datagram.num_rtx == 0 {
                            self.manager.add_unacked(datagram)?;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // it wasn't sent; un-stamp it and try again later
                    if let Some(datagram) = self.manager.send_buf().front_mut() {
                        datagram.send_ts = 0;
                    }
                    break;
                }
                Err(e) => return Err(e).context("failed to send on the data socket"),
            }
        }
        Ok(())
    }

    /// Drain the data socket; every record must parse as an ACK, everything
    /// else is ignored.
    fn drain_acks(&mut self, sock: &UdpSocket) {
        let mut buf = [0u8; 2048];
        loop {
            let len = match sock.try_recv(&mut buf) {
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("data socket receive error: {e}");
                    break;
                }
            };

            if let Ok(Record::Control(Message::Ack(ack))) = Record::parse(&buf[..len]) {
                debug!("received ACK: frame_id={} frag_id={}", ack.frame_id, ack.frag_id);
                self.manager.handle_ack(&ack, timestamp_us());
            }
        }
    }

    /// Drain the feedback socket; every SIGNAL reconfigures the encoder.
    fn drain_signals(&mut self, sock: &UdpSocket) -> Result<()> {
        let mut buf = [0u8; 2048];
        loop {
            let len = match sock.try_recv(&mut buf) {
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("feedback socket receive error: {e}");
                    break;
                }
            };

            match Message::parse(&buf[..len]) {
                Ok(Message::Signal(signal)) => {
                    info!("received signal: bitrate={} kbps", signal.target_bitrate);
                    self.target_bitrate_kbps = signal.target_bitrate;
                    self.encoder
                        .set_bitrate_kbps(signal.target_bitrate)
                        .context("failed to reconfigure the encoder")?;
                }
                _ => warn!("unknown message type received on the feedback channel"),
            }
        }
        Ok(())
    }
}
