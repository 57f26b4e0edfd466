use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use vidlink_protocol::datagram::DEFAULT_MTU;

/// Parse command-line arguments, exiting with code 1 on a usage error.
/// `--help` and `--version` are graceful terminations and exit 0.
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(opt) => opt,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    }
}

/// Stream a raw YUV420 file to a single receiver over UDP.
///
/// The sender binds the data channel on `port` and the feedback channel on
/// `port + 1`, then waits for the receiver's CONFIG and SIGNAL before
/// streaming.
#[derive(Parser, Debug, Clone)]
#[clap(name = "sender")]
pub struct SenderOpt {
    /// MTU used to size UDP payloads.
    #[clap(long = "mtu", default_value_t = DEFAULT_MTU)]
    pub mtu: usize,

    /// File to output per-frame performance results to.
    #[clap(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Enable more logging for debugging.
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// UDP port of the data channel; the feedback channel uses port + 1.
    pub port: u16,

    /// Path to the raw YUV420 input file.
    pub yuv_path: PathBuf,
}

/// Receive, decode and display a video stream from a sender.
#[derive(Parser, Debug, Clone)]
#[clap(name = "receiver")]
pub struct ReceiverOpt {
    /// Frame rate to request from the sender.
    #[clap(long = "fps", default_value_t = 30)]
    pub fps: u16,

    /// Constant bitrate (kbps) to request from the sender.
    #[clap(long = "cbr", default_value_t = 0)]
    pub cbr: u32,

    /// 0: decode and display frames; 1: decode but not display;
    /// 2: neither decode nor display.
    #[clap(long = "lazy", default_value_t = 0)]
    pub lazy: u8,

    /// File to output per-frame performance results to.
    #[clap(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Enable more logging for debugging.
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Total streaming time in seconds.
    #[clap(long = "streamtime", default_value_t = 60)]
    pub streamtime: u64,

    /// Sender host.
    pub host: String,

    /// Sender data port; the feedback channel uses port + 1.
    pub port: u16,

    /// Video width to request.
    pub width: u16,

    /// Video height to request.
    pub height: u16,
}

/// How much of the receive pipeline actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyLevel {
    /// Decode every frame and display it.
    DecodeDisplay,
    /// Decode every frame, display nothing.
    DecodeOnly,
    /// Neither decode nor display; the protocol state machine still runs.
    Neither,
}

#[derive(Error, Debug)]
#[error("invalid lazy level {0} (expected 0, 1 or 2)")]
pub struct ParseLazyLevelError(u8);

impl TryFrom<u8> for LazyLevel {
    type Error = ParseLazyLevelError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(LazyLevel::DecodeDisplay),
            1 => Ok(LazyLevel::DecodeOnly),
            2 => Ok(LazyLevel::Neither),
            other => Err(ParseLazyLevelError(other)),
        }
    }
}
