#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use queue_daemon::coordinator::{Coordinator, CoordinatorSettings};
use queue_daemon::notifier::ChangeNotifier;
use queue_daemon::store::{MemoryStore, StoreError, TicketStore, UpdateGuard, WriteLatch};
use queue_proto::protocol::{Broadcast, Command, Message, Request};
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter, TicketId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        storage_timeout: Duration::from_millis(200),
        ..CoordinatorSettings::default()
    }
}

pub fn coordinator() -> Arc<Coordinator> {
    coordinator_with(Arc::new(MemoryStore::new()))
}

pub fn coordinator_with(store: Arc<dyn TicketStore>) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(
        store,
        ChangeNotifier::default(),
        None,
        settings(),
    ))
}

/// Where a [`StallingStore`] write hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stall {
    #[default]
    Off,
    /// Hang, then write.  The write arrives after the caller gave up.
    BeforeWrite,
    /// Write, then hang before acknowledging.
    AfterWrite,
}

/// How long a stalled call hangs; longer than the test storage timeout.
pub const STALL: Duration = Duration::from_millis(500);

/// Wraps a [`MemoryStore`] and can be switched into modes where writes hang
/// past the storage timeout or reads fail.
#[derive(Default)]
pub struct StallingStore {
    inner: MemoryStore,
    stall: Mutex<Stall>,
    failing_reads: AtomicBool,
}

impl StallingStore {
    pub fn stall(&self, mode: Stall) {
        *self.stall.lock().unwrap() = mode;
    }

    pub fn fail_reads(&self, on: bool) {
        self.failing_reads.store(on, Ordering::SeqCst);
    }

    fn mode(&self) -> Stall {
        *self.stall.lock().unwrap()
    }

    async fn write<T>(&self, write: impl std::future::Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        let mode = self.mode();
        if mode == Stall::BeforeWrite {
            tokio::time::sleep(STALL).await;
        }
        let result = write.await;
        if mode == Stall::AfterWrite {
            tokio::time::sleep(STALL).await;
        }
        result
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for StallingStore {
    async fn next_sequence(
        &self,
        service: ServiceType,
        day: NaiveDate,
        latch: &WriteLatch,
    ) -> Result<u32, StoreError> {
        self.write(self.inner.next_sequence(service, day, latch)).await
    }

    async fn insert(&self, ticket: Ticket, latch: &WriteLatch) -> Result<Ticket, StoreError> {
        self.write(self.inner.insert(ticket, latch)).await
    }

    async fn get(&self, id: TicketId) -> Result<Ticket, StoreError> {
        self.check_reads()?;
        self.inner.get(id).await
    }

    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        self.check_reads()?;
        self.inner.list(filter).await
    }

    async fn update_if(
        &self,
        guard: UpdateGuard,
        next: Ticket,
        latch: &WriteLatch,
    ) -> Result<Ticket, StoreError> {
        self.write(self.inner.update_if(guard, next, latch)).await
    }
}

/// Minimal framed client for socket tests.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    pub async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn send(&mut self, request_id: u64, command: Command) {
        let bytes = Message::Request(Request {
            request_id,
            command,
        })
        .encode()
        .unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn next(&mut self) -> Broadcast {
        let mut tmp = [0u8; 4096];
        loop {
            if let Some(len) = Message::frame_len(&self.buf).unwrap() {
                let (msg, _) = Message::decode(&self.buf[..len]).unwrap();
                self.buf.drain(..len);
                match msg {
                    Message::Broadcast(b) => return b,
                    Message::Request(_) => continue,
                }
            }
            let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut tmp))
                .await
                .expect("timed out waiting for daemon")
                .unwrap();
            assert!(n > 0, "daemon closed the connection");
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Wait for the daemon to hang up, failing if it sends a frame first.
    pub async fn expect_closed(&mut self) {
        let mut tmp = [0u8; 4096];
        loop {
            if let Some(len) = Message::frame_len(&self.buf).unwrap() {
                let (msg, _) = Message::decode(&self.buf[..len]).unwrap();
                panic!("expected the daemon to close, got {:?}", msg);
            }
            let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut tmp))
                .await
                .expect("timed out waiting for the daemon to close")
                .unwrap_or(0);
            if n == 0 {
                return;
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Skip pushes until the reply to `request_id` arrives.
    pub async fn reply(&mut self, request_id: u64) -> queue_proto::protocol::Outcome {
        loop {
            if let Broadcast::Reply {
                request_id: id,
                outcome,
            } = self.next().await
            {
                if id == request_id {
                    return outcome;
                }
            }
        }
    }
}
