//! Encrypted UDP channels.
//!
//! The client side owns one socket per channel ([`DirectChannel`]).
//! The host side shares one listening socket across peers:
//! [`HostEndpoint`] pumps inbound datagrams into per-peer queues and
//! hands each completed handshake out as a [`HostChannel`].

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{Channel, ChannelCapabilities};
use crate::core::{
    CryptoError, TransportError, DATA_FRAME_HEADER_SIZE, FRAME_TYPE_DATA, FRAME_TYPE_HANDSHAKE_1,
    FRAME_TYPE_HANDSHAKE_2, FRAME_TYPE_HANDSHAKE_3, HANDSHAKE_BACKOFF, HANDSHAKE_MAX_RETRIES,
    HANDSHAKE_TIMEOUT, PUNCH_MARKER,
};
use crate::crypto::{InitiatorHandshake, ResponderHandshake, SecureLink, StaticKeypair};

const RECV_BUFFER_SIZE: usize = 65535;

/// Handshake retry policy. Defaults to the protocol constants.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeConfig {
    /// Wait for the first response this long.
    pub timeout: std::time::Duration,
    /// Attempts before giving up.
    pub retries: u32,
    /// Timeout multiplier applied per retry.
    pub backoff: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: HANDSHAKE_TIMEOUT,
            retries: HANDSHAKE_MAX_RETRIES,
            backoff: HANDSHAKE_BACKOFF,
        }
    }
}

// =============================================================================
// FRAMING
// =============================================================================

pub(crate) fn frame(frame_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(frame_type);
    out.extend_from_slice(body);
    out
}

fn data_frame(nonce: u64, ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DATA_FRAME_HEADER_SIZE + ciphertext.len());
    out.push(FRAME_TYPE_DATA);
    out.extend_from_slice(&nonce.to_le_bytes());
    out.extend_from_slice(ciphertext);
    out
}

fn parse_data_frame(frame: &[u8]) -> Option<(u64, &[u8])> {
    if frame.len() < DATA_FRAME_HEADER_SIZE || frame[0] != FRAME_TYPE_DATA {
        return None;
    }
    let nonce = u64::from_le_bytes(frame[1..DATA_FRAME_HEADER_SIZE].try_into().ok()?);
    Some((nonce, &frame[DATA_FRAME_HEADER_SIZE..]))
}

// =============================================================================
// SOCKET HELPERS
// =============================================================================

/// ICMP "port unreachable" responses to packets sent at a not-yet-open
/// port surface as these error kinds. They are cosmetic while punching.
pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

/// Ask the OS not to surface ICMP resets as socket errors.
///
/// No portable control exists; where the OS offers none the failure is
/// logged as a warning and the send/receive paths tolerate the spurious
/// errors instead.
pub(crate) fn suppress_icmp_resets(socket: &UdpSocket) {
    #[cfg(windows)]
    warn!(
        local = ?socket.local_addr().ok(),
        "icmp reset suppression unavailable, tolerating spurious resets"
    );
    #[cfg(not(windows))]
    let _ = socket;
}

async fn send_tolerant(
    socket: &UdpSocket,
    payload: &[u8],
    target: SocketAddr,
) -> Result<(), TransportError> {
    match socket.send_to(payload, target).await {
        Ok(_) => Ok(()),
        Err(e) if is_transient(&e) => {
            trace!(%target, "suppressed transient send error");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// HANDSHAKE DRIVING
// =============================================================================

async fn wait_for_frame(
    socket: &UdpSocket,
    remote: SocketAddr,
    expected: u8,
    buf: &mut [u8],
) -> Result<Vec<u8>, TransportError> {
    loop {
        let (len, from) = match socket.recv_from(buf).await {
            Ok(v) => v,
            Err(e) if is_transient(&e) => {
                trace!("suppressed transient receive error");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if from != remote {
            continue;
        }
        let frame = &buf[..len];
        if frame == PUNCH_MARKER || frame.first() != Some(&expected) {
            continue;
        }
        return Ok(frame[1..].to_vec());
    }
}

/// Run the initiator handshake over `socket`, retrying with backoff.
pub(crate) async fn initiate_handshake(
    socket: &UdpSocket,
    remote: SocketAddr,
    keypair: &StaticKeypair,
    config: &HandshakeConfig,
) -> Result<SecureLink, TransportError> {
    let mut handshake = InitiatorHandshake::new(keypair)?;
    let msg1 = frame(FRAME_TYPE_HANDSHAKE_1, &handshake.write_message(&[])?);

    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut wait = config.timeout;
    for attempt in 0..config.retries {
        send_tolerant(socket, &msg1, remote).await?;
        match tokio::time::timeout(
            wait,
            wait_for_frame(socket, remote, FRAME_TYPE_HANDSHAKE_2, &mut buf),
        )
        .await
        {
            Ok(body) => {
                handshake.read_message(&body?)?;
                let msg3 = frame(FRAME_TYPE_HANDSHAKE_3, &handshake.write_message(&[])?);
                socket.send_to(&msg3, remote).await?;
                return Ok(handshake.into_link()?);
            }
            Err(_elapsed) => {
                trace!(attempt, %remote, "handshake response timed out, retrying");
                wait *= config.backoff;
            }
        }
    }
    Err(TransportError::HandshakeTimeout)
}

// =============================================================================
// CLIENT CHANNEL
// =============================================================================

/// Established encrypted state shared by the client-side channels.
pub(crate) struct EncryptedUdp {
    socket: UdpSocket,
    remote: SocketAddr,
    link: SecureLink,
    recv_buf: Vec<u8>,
}

impl EncryptedUdp {
    pub(crate) fn new(socket: UdpSocket, remote: SocketAddr, link: SecureLink) -> Self {
        Self {
            socket,
            remote,
            link,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    pub(crate) async fn send(
        &mut self,
        payload: &[u8],
        max_payload: usize,
    ) -> Result<(), TransportError> {
        if payload.len() > max_payload {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: max_payload,
            });
        }
        let (nonce, ciphertext) = self.link.seal(payload)?;
        send_tolerant(&self.socket, &data_frame(nonce, &ciphertext), self.remote).await
    }

    pub(crate) async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let (len, from) = match self.socket.recv_from(&mut self.recv_buf).await {
                Ok(v) => v,
                Err(e) if is_transient(&e) => {
                    trace!("suppressed transient receive error");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if from != self.remote {
                continue;
            }
            let frame = &self.recv_buf[..len];
            if frame == PUNCH_MARKER {
                continue;
            }
            // Late handshake retransmits and other noise are dropped.
            let Some((nonce, ciphertext)) = parse_data_frame(frame) else {
                continue;
            };
            match self.link.open(nonce, ciphertext) {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    debug!(error = %e, "dropping undecryptable frame");
                }
            }
        }
    }
}

/// Plain encrypted UDP channel for peers reachable without traversal.
///
/// Lifecycle: [`DirectChannel::new`] (no I/O), [`DirectChannel::connect`]
/// (binds a socket and blocks on the handshake), then send/receive,
/// then `disconnect`.
pub struct DirectChannel {
    keypair: StaticKeypair,
    handshake: HandshakeConfig,
    io: Option<EncryptedUdp>,
    caps: ChannelCapabilities,
}

impl DirectChannel {
    /// Create an unconnected channel. Performs no I/O.
    pub fn new(keypair: StaticKeypair) -> Self {
        Self {
            keypair,
            handshake: HandshakeConfig::default(),
            io: None,
            caps: ChannelCapabilities::udp(),
        }
    }

    /// Override the handshake retry policy.
    pub fn with_handshake_config(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Bind a fresh socket and handshake with the peer.
    pub async fn connect(&mut self, remote: SocketAddr) -> Result<(), TransportError> {
        let socket = UdpSocket::bind((std::net::Ipv4Addr::UNSPECIFIED, 0)).await?;
        suppress_icmp_resets(&socket);
        let link = initiate_handshake(&socket, remote, &self.keypair, &self.handshake).await?;
        self.io = Some(EncryptedUdp::new(socket, remote, link));
        Ok(())
    }
}

impl Channel for DirectChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        self.caps
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let max = self.caps.max_payload;
        match &mut self.io {
            Some(io) => io.send(payload, max).await,
            None => Err(TransportError::NotConnected),
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        match &mut self.io {
            Some(io) => io.recv().await,
            None => Err(TransportError::NotConnected),
        }
    }

    async fn disconnect(&mut self) {
        // Dropping the state releases the socket; safe to call twice.
        self.io = None;
    }
}

// =============================================================================
// HOST ENDPOINT
// =============================================================================

type PeerMap = Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Vec<u8>>>>>;

struct NewPeer {
    addr: SocketAddr,
    first_frame: Vec<u8>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Host-side endpoint sharing one listening socket across all peers.
///
/// A pump task demultiplexes inbound datagrams by source address into
/// per-peer queues; previously unseen addresses become pending peers
/// surfaced by [`HostEndpoint::accept`].
pub struct HostEndpoint {
    socket: Arc<UdpSocket>,
    keypair: StaticKeypair,
    handshake: HandshakeConfig,
    peers: PeerMap,
    accept_rx: mpsc::UnboundedReceiver<NewPeer>,
    pump: JoinHandle<()>,
}

impl HostEndpoint {
    /// Bind the listening socket and start the demux pump.
    pub async fn bind(addr: SocketAddr, keypair: StaticKeypair) -> io::Result<Self> {
        Self::bind_with_config(addr, keypair, HandshakeConfig::default()).await
    }

    /// Bind with a custom handshake retry policy.
    pub async fn bind_with_config(
        addr: SocketAddr,
        keypair: StaticKeypair,
        handshake: HandshakeConfig,
    ) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        suppress_icmp_resets(&socket);

        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_datagrams(socket.clone(), peers.clone(), accept_tx));

        Ok(Self {
            socket,
            keypair,
            handshake,
            peers,
            accept_rx,
            pump,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The shared listening socket, for punch responses.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Wait for the next peer to complete its handshake.
    ///
    /// Peers whose handshake fails are dropped and logged; the wait
    /// continues with the next one.
    pub async fn accept(&mut self) -> Result<HostChannel, TransportError> {
        loop {
            let Some(NewPeer {
                addr,
                first_frame,
                mut rx,
            }) = self.accept_rx.recv().await
            else {
                return Err(TransportError::Closed);
            };

            match self.respond(addr, first_frame, &mut rx).await {
                Ok(link) => {
                    debug!(peer = %addr, "peer handshake complete");
                    return Ok(HostChannel {
                        socket: self.socket.clone(),
                        remote: addr,
                        link: Some(link),
                        rx,
                        peers: self.peers.clone(),
                        caps: ChannelCapabilities::udp(),
                    });
                }
                Err(e) => {
                    warn!(peer = %addr, error = %e, "handshake with joining peer failed");
                    self.peers.lock().expect("peer map lock").remove(&addr);
                }
            }
        }
    }

    async fn respond(
        &self,
        addr: SocketAddr,
        first_frame: Vec<u8>,
        rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Result<SecureLink, TransportError> {
        if first_frame.first() != Some(&FRAME_TYPE_HANDSHAKE_1) {
            return Err(
                CryptoError::HandshakeFailed("expected handshake initiation".into()).into(),
            );
        }
        let mut handshake = ResponderHandshake::new(&self.keypair)?;
        handshake.read_message(&first_frame[1..])?;
        let msg2 = frame(FRAME_TYPE_HANDSHAKE_2, &handshake.write_message(&[])?);

        let mut wait = self.handshake.timeout;
        for _ in 0..self.handshake.retries {
            // Also covers a lost msg2: the client re-sends msg1, times
            // us out, and we re-send here.
            send_tolerant(&self.socket, &msg2, addr).await?;
            match tokio::time::timeout(wait, async {
                loop {
                    match rx.recv().await {
                        None => return Err(TransportError::Closed),
                        Some(f) if f.first() == Some(&FRAME_TYPE_HANDSHAKE_3) => return Ok(f),
                        Some(_) => continue,
                    }
                }
            })
            .await
            {
                Ok(msg3) => {
                    handshake.read_message(&msg3?[1..])?;
                    return Ok(handshake.into_link()?);
                }
                Err(_elapsed) => wait *= self.handshake.backoff,
            }
        }
        Err(TransportError::HandshakeTimeout)
    }
}

impl Drop for HostEndpoint {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump_datagrams(
    socket: Arc<UdpSocket>,
    peers: PeerMap,
    accept_tx: mpsc::UnboundedSender<NewPeer>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) if is_transient(&e) => continue,
            Err(e) => {
                warn!(error = %e, "host socket receive failed, stopping pump");
                break;
            }
        };
        let datagram = &buf[..len];
        if datagram == PUNCH_MARKER {
            trace!(%from, "punch marker received");
            continue;
        }

        let mut peers = peers.lock().expect("peer map lock");
        if let Some(tx) = peers.get(&from) {
            if tx.send(datagram.to_vec()).is_err() {
                peers.remove(&from);
            }
            continue;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert(from, tx);
        let pending = NewPeer {
            addr: from,
            first_frame: datagram.to_vec(),
            rx,
        };
        if accept_tx.send(pending).is_err() {
            // Endpoint dropped; the pump is about to be aborted.
            break;
        }
    }
}

/// One accepted peer on a [`HostEndpoint`].
///
/// Shares the endpoint's socket for sending; receives through its demux
/// queue.
pub struct HostChannel {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    link: Option<SecureLink>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    peers: PeerMap,
    caps: ChannelCapabilities,
}

impl HostChannel {
    /// The peer's address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Channel for HostChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        self.caps
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let Some(link) = &mut self.link else {
            return Err(TransportError::NotConnected);
        };
        if payload.len() > self.caps.max_payload {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: self.caps.max_payload,
            });
        }
        let (nonce, ciphertext) = link.seal(payload)?;
        send_tolerant(&self.socket, &data_frame(nonce, &ciphertext), self.remote).await
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let Some(link) = &mut self.link else {
            return Err(TransportError::NotConnected);
        };
        loop {
            let Some(frame) = self.rx.recv().await else {
                return Err(TransportError::Closed);
            };
            let Some((nonce, ciphertext)) = parse_data_frame(&frame) else {
                continue;
            };
            match link.open(nonce, ciphertext) {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    debug!(error = %e, "dropping undecryptable frame");
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.link.take().is_some() {
            self.peers.lock().expect("peer map lock").remove(&self.remote);
        }
    }
}
