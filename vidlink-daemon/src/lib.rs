//! Sender and receiver daemons for vidlink.
//!
//! The sender ingests a raw YUV420 file at a fixed frame rate, encodes it and
//! streams MTU-sized fragments over UDP, retransmitting selectively on ACK
//! feedback and forcing a key frame when the transport stalls. The receiver
//! reassembles frames, ACKs every datagram and feeds complete frames to a
//! decode worker.

use tracing::level_filters::LevelFilter;

pub mod cli_args;
pub mod receiver;
pub mod retransmit;
pub mod rtt;
pub mod sender;
pub mod session;
pub mod source;
pub mod stats;

/// Install the global log subscriber. `-v` lowers the default level to DEBUG;
/// `RUST_LOG` still overrides everything.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(default_level.into())
                    .from_env_lossy(),
            )
            .finish(),
    )
    .unwrap();
}
