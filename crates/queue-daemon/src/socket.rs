use crate::coordinator::Coordinator;
use crate::notifier::SubscriptionEvent;
use queue_proto::error::QueueError;
use queue_proto::protocol::{Broadcast, Command, Message, Outcome, Request, PROTOCOL_VERSION};
use chrono::Local;
use queue_proto::ticket::{Ticket, TicketFilter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub fn start_server(
    bind_address: String,
    port: u16,
    coordinator: Arc<Coordinator>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);
        serve(listener, coordinator).await;
    })
}

/// Accept loop over an already-bound listener.
pub async fn serve(listener: TcpListener, coordinator: Arc<Coordinator>) {
    let clients = Arc::new(AtomicUsize::new(0));
    let mut client_id = 0usize;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                let count = clients.fetch_add(1, Ordering::SeqCst) + 1;
                info!("Client {} connected from {} ({} connected)", id, peer, count);

                let coordinator = coordinator.clone();
                let clients = clients.clone();
                tokio::spawn(async move {
                    handle_client(stream, coordinator, id).await;
                    let count = clients.fetch_sub(1, Ordering::SeqCst) - 1;
                    info!("Client {} disconnected ({} connected)", id, count);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn send(write_half: &mut OwnedWriteHalf, broadcast: Broadcast) -> bool {
    match Message::Broadcast(broadcast).encode() {
        Ok(encoded) => write_half.write_all(&encoded).await.is_ok(),
        Err(e) => {
            error!("Failed to encode broadcast: {}", e);
            true
        }
    }
}

async fn snapshot(coordinator: &Coordinator, filter: &TicketFilter) -> Result<Vec<Ticket>, QueueError> {
    coordinator.list(filter).await.map_err(|e| {
        warn!("Snapshot failed: {}", e);
        e
    })
}

/// Send a fresh snapshot; the error, if any, becomes the request outcome.
async fn resync(
    write_half: &mut OwnedWriteHalf,
    coordinator: &Coordinator,
    filter: &TicketFilter,
) -> Option<Outcome> {
    match snapshot(coordinator, filter).await {
        Ok(tickets) => send(write_half, Broadcast::Snapshot { tickets })
            .await
            .then_some(Outcome::Ok { ticket: None }),
        Err(error) => Some(Outcome::Err { error }),
    }
}

async fn handle_client(stream: TcpStream, coordinator: Arc<Coordinator>, client_id: usize) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Subscribe before taking the snapshot so nothing falls between the two.
    let today = Local::now().date_naive();
    let mut subscription = coordinator
        .notifier()
        .subscribe(TicketFilter::live(today));

    // Without a snapshot there is nothing authoritative to greet with; the
    // client reconnects and tries again.
    let Ok(tickets) = snapshot(&coordinator, subscription.filter()).await else {
        warn!("Client {}: no snapshot for Hello; closing", client_id);
        return;
    };
    let hello = Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        snapshot: tickets,
    };
    if !send(&mut write_half, hello).await {
        return;
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            let frame_len = match Message::frame_len(&read_buf) {
                                Ok(Some(len)) => len,
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Client {} sent a bad frame header: {}", client_id, e);
                                    return;
                                }
                            };
                            let decoded = Message::decode(&read_buf[..frame_len]);
                            read_buf.drain(..frame_len);
                            match decoded {
                                Ok((Message::Request(Request { request_id, command }), _)) => {
                                    debug!("Client {} sent request {}: {:?}", client_id, request_id, command);
                                    let mut stale = false;
                                    let outcome = match command {
                                        Command::Subscribe { filter } => {
                                            subscription.set_filter(filter);
                                            let Some(outcome) = resync(&mut write_half, &coordinator, subscription.filter()).await else {
                                                return;
                                            };
                                            stale = matches!(outcome, Outcome::Err { .. });
                                            outcome
                                        }
                                        Command::Resync => {
                                            let Some(outcome) = resync(&mut write_half, &coordinator, subscription.filter()).await else {
                                                return;
                                            };
                                            stale = matches!(outcome, Outcome::Err { .. });
                                            outcome
                                        }
                                        other => coordinator.execute(other).await,
                                    };
                                    if !send(&mut write_half, Broadcast::Reply { request_id, outcome }).await {
                                        return;
                                    }
                                    if stale {
                                        warn!("Client {}: snapshot failed; closing so it reconnects", client_id);
                                        return;
                                    }
                                }
                                Ok((Message::Broadcast(_), _)) => {
                                    debug!("Client {} sent a broadcast; ignored", client_id);
                                }
                                Err(e) => {
                                    warn!("Client {} sent an undecodable frame: {}", client_id, e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            event = subscription.recv() => {
                let broadcast = match event {
                    SubscriptionEvent::Ticket(ticket) => Broadcast::Ticket { ticket },
                    SubscriptionEvent::Log(message) => Broadcast::Log { message },
                    SubscriptionEvent::Resync => {
                        warn!("Client {} fell behind; sending a fresh snapshot", client_id);
                        match snapshot(&coordinator, subscription.filter()).await {
                            Ok(tickets) => Broadcast::Snapshot { tickets },
                            // Its board is stale and cannot be repaired here;
                            // a reconnect brings a fresh Hello.
                            Err(_) => break,
                        }
                    }
                    SubscriptionEvent::Closed => break,
                };
                if !send(&mut write_half, broadcast).await {
                    break;
                }
            }
        }
    }
}
