//! UDP transport and request/response correlation.
//!
//! One [`Connection`] owns one socket and one receive-loop task. Outgoing
//! requests are tracked in a pending map keyed by sequence number; the
//! receive loop resolves them as matching responses arrive. Frames that
//! match no pending request are routed to an open discovery window when
//! they are service responses, and otherwise dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::error::{LichtError, Result};
use crate::wire::{MessageType, Packet, Payload, HEADER_SIZE};

/// A StateService response routed to an open discovery window
#[derive(Debug)]
pub(crate) struct ServiceSighting {
    /// Address the datagram came from
    pub from: SocketAddr,
    /// Hardware identifier from the frame address
    pub target: u64,
    /// Service port the device advertised
    pub port: u32,
}

struct PendingRequest {
    /// Response type that resolves this request
    expected: MessageType,
    tx: oneshot::Sender<Result<Packet>>,
}

struct ConnectionState {
    /// Requests in flight, keyed by sequence number
    pending: HashMap<u8, PendingRequest>,
    /// Next sequence number candidate; wraps at 255
    next_seq: u8,
    /// Sink for unsolicited service responses while a window is open
    discovery_tx: Option<mpsc::UnboundedSender<ServiceSighting>>,
}

impl ConnectionState {
    /// Allocate the next sequence number, skipping any still in flight
    fn allocate_sequence(&mut self) -> Result<u8> {
        for _ in 0..=u8::MAX as usize {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            if !self.pending.contains_key(&seq) {
                return Ok(seq);
            }
        }
        Err(LichtError::SequenceExhausted)
    }
}

/// Owns one sequence number for the lifetime of a request. Dropping the
/// guard releases the slot, so a request cancelled at an await point
/// cannot leak its entry in the pending map.
struct SequenceSlot<'a> {
    state: &'a Mutex<ConnectionState>,
    sequence: u8,
}

impl Drop for SequenceSlot<'_> {
    fn drop(&mut self) {
        self.state.lock().unwrap().pending.remove(&self.sequence);
    }
}

/// One UDP socket shared by all in-flight operations of a backend instance
pub(crate) struct Connection {
    socket: Arc<UdpSocket>,
    source: u32,
    state: Arc<Mutex<ConnectionState>>,
    recv_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Bind a broadcast-capable socket and start the receive loop
    pub(crate) async fn bind(bind_addr: SocketAddr, source: u32) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        let socket = Arc::new(socket);
        tracing::info!("Bound UDP socket on {}", socket.local_addr()?);

        let state = Arc::new(Mutex::new(ConnectionState {
            pending: HashMap::new(),
            next_seq: rand::random(),
            discovery_tx: None,
        }));

        let recv_socket = socket.clone();
        let recv_state = state.clone();
        let recv_task = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        Self::handle_datagram(&recv_state, source, &buf[..len], from);
                    }
                    Err(e) => {
                        tracing::error!("Receive loop terminated: {}", e);
                        break;
                    }
                }
            }

            // Socket is gone, fail everything still in flight
            let mut state = recv_state.lock().unwrap();
            state.pending.clear();
            state.discovery_tx = None;
        });

        Ok(Self {
            socket,
            source,
            state,
            recv_task,
        })
    }

    /// Process one inbound datagram; never fails the receive loop
    fn handle_datagram(
        state: &Arc<Mutex<ConnectionState>>,
        source: u32,
        data: &[u8],
        from: SocketAddr,
    ) {
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                // A bad payload may still be the direct answer to one of
                // our requests; surface it to that caller instead of
                // swallowing it
                if let Some((raw_source, raw_seq)) = raw_correlation(data) {
                    if raw_source == source {
                        let mut state = state.lock().unwrap();
                        if let Some(pending) = state.pending.remove(&raw_seq) {
                            let _ = pending.tx.send(Err(e));
                            return;
                        }
                    }
                }
                tracing::debug!("Dropping undecodable datagram from {}: {}", from, e);
                return;
            }
        };

        if packet.source != source {
            tracing::trace!(
                "Dropping frame from {} with foreign source {:#x}",
                from,
                packet.source
            );
            return;
        }

        let mut state = state.lock().unwrap();

        // Pending requests take priority over the discovery sink
        let resolved = state
            .pending
            .get(&packet.sequence)
            .is_some_and(|pending| pending.expected == packet.payload.message_type());
        if resolved {
            if let Some(pending) = state.pending.remove(&packet.sequence) {
                let _ = pending.tx.send(Ok(packet));
            }
            return;
        }

        if let Payload::StateService { port, .. } = packet.payload {
            if let Some(tx) = &state.discovery_tx {
                let sighting = ServiceSighting {
                    from,
                    target: packet.target,
                    port,
                };
                if tx.send(sighting).is_err() {
                    // Window receiver went away
                    state.discovery_tx = None;
                }
                return;
            }
        }

        tracing::debug!(
            "Dropping unsolicited {:?} frame from {} (seq {})",
            packet.payload.message_type(),
            from,
            packet.sequence
        );
    }

    /// Send a request and suspend until the matching response arrives or
    /// the deadline elapses.
    ///
    /// A fresh sequence number is allocated for the request and released
    /// when it resolves, times out, fails to send, or the caller drops
    /// this future. No implicit retry is issued; callers that need
    /// resilience to datagram loss re-issue the call themselves.
    pub(crate) async fn send_request(
        &self,
        addr: SocketAddr,
        target: u64,
        payload: Payload,
        expected: MessageType,
        deadline: Duration,
    ) -> Result<Packet> {
        let (tx, rx) = oneshot::channel();

        let sequence = {
            let mut state = self.state.lock().unwrap();
            let sequence = state.allocate_sequence()?;
            state
                .pending
                .insert(sequence, PendingRequest { expected, tx });
            sequence
        };
        let _slot = SequenceSlot {
            state: self.state.as_ref(),
            sequence,
        };

        let wants_ack = expected == MessageType::Acknowledgement;
        let packet = Packet {
            tagged: target == 0,
            source: self.source,
            target,
            ack_required: wants_ack,
            res_required: !wants_ack,
            sequence,
            payload,
        };

        tracing::debug!(
            "Sending {:?} to {} (seq {})",
            packet.payload.message_type(),
            addr,
            sequence
        );

        self.socket.send_to(&packet.encode(), addr).await?;

        // The slot guard releases the sequence on every exit, so a late
        // response after a timeout is dropped as unsolicited
        match timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LichtError::ConnectionClosed),
            Err(_) => Err(LichtError::Timeout),
        }
    }

    /// Fire-and-forget send of a tagged frame, used for discovery
    /// broadcasts
    pub(crate) async fn send_broadcast(&self, addr: SocketAddr, payload: Payload) -> Result<()> {
        let sequence = self.state.lock().unwrap().allocate_sequence()?;
        let packet = Packet {
            tagged: true,
            source: self.source,
            target: 0,
            ack_required: false,
            res_required: true,
            sequence,
            payload,
        };
        tracing::debug!(
            "Broadcasting {:?} to {} (seq {})",
            packet.payload.message_type(),
            addr,
            sequence
        );
        self.socket.send_to(&packet.encode(), addr).await?;
        Ok(())
    }

    /// Open a discovery window; unsolicited StateService frames are routed
    /// to the returned receiver until [`Self::close_discovery`] is called.
    /// A new window supersedes any previous one. The returned sender
    /// identifies the window to `close_discovery`.
    pub(crate) fn open_discovery(
        &self,
    ) -> (
        mpsc::UnboundedSender<ServiceSighting>,
        mpsc::UnboundedReceiver<ServiceSighting>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().discovery_tx = Some(tx.clone());
        (tx, rx)
    }

    /// Close the window identified by `handle`. A superseded window's
    /// teardown leaves the current window's sink alone.
    pub(crate) fn close_discovery(&self, handle: &mpsc::UnboundedSender<ServiceSighting>) {
        let mut state = self.state.lock().unwrap();
        if state
            .discovery_tx
            .as_ref()
            .is_some_and(|tx| tx.same_channel(handle))
        {
            state.discovery_tx = None;
        }
    }

    /// Local address of the bound socket
    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

/// Pull (source, sequence) straight out of a raw header so that malformed
/// responses can still be correlated to their request
fn raw_correlation(data: &[u8]) -> Option<(u32, u8)> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    let source = u32::from_le_bytes(data[4..8].try_into().ok()?);
    Some((source, data[23]))
}
