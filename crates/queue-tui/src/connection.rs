//! Connection to the queue daemon.
//!
//! A background task owns the socket.  It reconnects with backoff, replays
//! the last subscription after every reconnect and forwards everything the
//! daemon broadcasts to the app as [`LinkEvent`]s.  Requests issued while the
//! link is down are reported back as undelivered instead of being queued, so
//! a stale click never lands minutes later.

use queue_proto::protocol::{Broadcast, Command, Message, Request};
use queue_proto::ticket::TicketFilter;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BACKOFF_START: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Request id used for the subscription replayed on reconnect.
const RESUBSCRIBE_ID: u64 = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    Disconnected(String),
    Broadcast(Broadcast),
    /// The request never reached the daemon.
    Undelivered(u64),
}

struct FrameReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

impl FrameReader {
    /// Next complete message, or `None` when the daemon closed the socket.
    async fn next_message(&mut self) -> anyhow::Result<Option<Message>> {
        let mut tmp = [0u8; 4096];
        loop {
            if let Some(len) = Message::frame_len(&self.buf)? {
                let decoded = Message::decode(&self.buf[..len]);
                self.buf.drain(..len);
                return decoded.map(|(msg, _)| Some(msg));
            }
            let n = self.half.read(&mut tmp).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }
}

async fn write_request(half: &mut OwnedWriteHalf, request: Request) -> anyhow::Result<()> {
    let encoded = Message::Request(request).encode()?;
    half.write_all(&encoded).await?;
    Ok(())
}

/// Handle the app keeps to talk to the daemon.
pub struct DaemonLink {
    req_tx: mpsc::Sender<Request>,
    next_id: u64,
}

impl DaemonLink {
    pub fn spawn(
        address: String,
        filter: TicketFilter,
        events: mpsc::Sender<LinkEvent>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (req_tx, req_rx) = mpsc::channel(64);
        let handle = tokio::spawn(run(address, filter, req_rx, events));
        (
            Self {
                req_tx,
                next_id: RESUBSCRIBE_ID,
            },
            handle,
        )
    }

    /// Queue `command`.  Returns the request id its reply will carry, or
    /// `None` if the link task is gone or saturated.
    pub fn request(&mut self, command: Command) -> Option<u64> {
        self.next_id += 1;
        let request_id = self.next_id;
        match self.req_tx.try_send(Request {
            request_id,
            command,
        }) {
            Ok(()) => Some(request_id),
            Err(e) => {
                warn!("Dropping request {}: {}", request_id, e);
                None
            }
        }
    }
}

async fn run(
    address: String,
    mut filter: TicketFilter,
    mut req_rx: mpsc::Receiver<Request>,
    events: mpsc::Sender<LinkEvent>,
) {
    let mut backoff = BACKOFF_START;

    loop {
        let stream = match TcpStream::connect(&address).await {
            Ok(s) => s,
            Err(e) => {
                debug!("Connect to {} failed: {}", address, e);
                // Nothing is in flight; tell the app about every click.
                while let Ok(req) = req_rx.try_recv() {
                    if let Command::Subscribe { filter: f } = req.command {
                        filter = f;
                    }
                    if events.send(LinkEvent::Undelivered(req.request_id)).await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_MAX);
                continue;
            }
        };

        info!("Connected to daemon at {}", address);
        backoff = BACKOFF_START;
        if events.send(LinkEvent::Connected).await.is_err() {
            return;
        }

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader {
            half: read_half,
            buf: Vec::with_capacity(4096),
        };

        let resubscribe = Request {
            request_id: RESUBSCRIBE_ID,
            command: Command::Subscribe {
                filter: filter.clone(),
            },
        };
        let reason = match write_request(&mut write_half, resubscribe).await {
            Err(e) => e.to_string(),
            Ok(()) => loop {
                tokio::select! {
                    incoming = reader.next_message() => {
                        match incoming {
                            Ok(Some(Message::Broadcast(b))) => {
                                if events.send(LinkEvent::Broadcast(b)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(Some(Message::Request(_))) => {}
                            Ok(None) => break "daemon closed the connection".to_string(),
                            Err(e) => break e.to_string(),
                        }
                    }
                    outgoing = req_rx.recv() => {
                        let Some(req) = outgoing else { return };
                        if let Command::Subscribe { filter: f } = &req.command {
                            filter = f.clone();
                        }
                        let id = req.request_id;
                        if let Err(e) = write_request(&mut write_half, req).await {
                            let _ = events.send(LinkEvent::Undelivered(id)).await;
                            break e.to_string();
                        }
                    }
                }
            },
        };

        warn!("Lost daemon connection: {}", reason);
        if events.send(LinkEvent::Disconnected(reason)).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_proto::protocol::{Outcome, PROTOCOL_VERSION};
    use queue_proto::ticket::ServiceType;
    use tokio::net::TcpListener;

    async fn read_request(stream: &mut TcpStream) -> Request {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 1024];
        loop {
            if let Some(len) = Message::frame_len(&buf).unwrap() {
                match Message::decode(&buf[..len]).unwrap().0 {
                    Message::Request(r) => return r,
                    other => panic!("unexpected {:?}", other),
                }
            }
            let n = stream.read(&mut tmp).await.unwrap();
            buf.extend_from_slice(&tmp[..n]);
        }
    }

    #[tokio::test]
    async fn test_subscribes_on_connect_and_forwards_broadcasts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (ev_tx, mut ev_rx) = mpsc::channel(16);
        let filter = TicketFilter::all().with_service(ServiceType::Ak1);
        let (mut link, _task) = DaemonLink::spawn(addr, filter.clone(), ev_tx);

        let (mut server, _) = listener.accept().await.unwrap();
        assert_eq!(ev_rx.recv().await, Some(LinkEvent::Connected));

        let first = read_request(&mut server).await;
        assert_eq!(first.request_id, RESUBSCRIBE_ID);
        assert_eq!(first.command, Command::Subscribe { filter });

        let hello = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            snapshot: vec![],
        });
        server.write_all(&hello.encode().unwrap()).await.unwrap();
        assert!(matches!(
            ev_rx.recv().await,
            Some(LinkEvent::Broadcast(Broadcast::Hello { .. }))
        ));

        let id = link.request(Command::Resync).unwrap();
        let req = read_request(&mut server).await;
        assert_eq!(req.request_id, id);

        let reply = Message::Broadcast(Broadcast::Reply {
            request_id: id,
            outcome: Outcome::Ok { ticket: None },
        });
        server.write_all(&reply.encode().unwrap()).await.unwrap();
        assert!(matches!(
            ev_rx.recv().await,
            Some(LinkEvent::Broadcast(Broadcast::Reply { request_id, .. })) if request_id == id
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (ev_tx, mut ev_rx) = mpsc::channel(16);
        let (_link, _task) = DaemonLink::spawn(addr, TicketFilter::all(), ev_tx);

        let (mut server, _) = listener.accept().await.unwrap();
        assert_eq!(ev_rx.recv().await, Some(LinkEvent::Connected));
        read_request(&mut server).await;

        let header = (u32::MAX).to_be_bytes();
        server.write_all(&header).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(3), ev_rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(LinkEvent::Disconnected(_))));
    }

    #[tokio::test]
    async fn test_requests_while_offline_are_undelivered() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };
        let (ev_tx, mut ev_rx) = mpsc::channel(16);
        let (mut link, _task) = DaemonLink::spawn(addr, TicketFilter::all(), ev_tx);

        let id = link.request(Command::Resync).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(3), ev_rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(LinkEvent::Undelivered(id)));
    }
}
