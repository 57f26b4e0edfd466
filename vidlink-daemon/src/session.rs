//! Session handshake, sender side.
//!
//! The sender binds both channels and blocks until the receiver has
//! introduced itself on each: one CONFIG on the data channel, one SIGNAL on
//! the feedback channel. Anything else is discarded. The captured peer
//! addresses are what the sockets get connected to.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::UdpSocket;
use tracing::warn;

use vidlink_protocol::message::{Config, Message, Signal};

/// Block until a CONFIG arrives on the data socket, returning it with the
/// peer's address.
pub async fn wait_for_config(sock: &UdpSocket) -> Result<(SocketAddr, Config)> {
    let mut buf = [0u8; 2048];
    loop {
        let (len, peer) = sock.recv_from(&mut buf).await?;
        match Message::parse(&buf[..len]) {
            Ok(Message::Config(config)) => return Ok((peer, config)),
            _ => warn!("unknown message type received on the data port"),
        }
    }
}

/// Block until a SIGNAL arrives on the feedback socket, returning it with
/// the peer's address.
pub async fn wait_for_signal(sock: &UdpSocket) -> Result<(SocketAddr, Signal)> {
    let mut buf = [0u8; 2048];
    loop {
        let (len, peer) = sock.recv_from(&mut buf).await?;
        match Message::parse(&buf[..len]) {
            Ok(Message::Signal(signal)) => return Ok((peer, signal)),
            _ => warn!("unknown message type received on the feedback port"),
        }
    }
}
