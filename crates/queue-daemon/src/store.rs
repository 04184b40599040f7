//! Ticket persistence.
//!
//! The store is the only place ticket state lives.  Every mutation goes
//! through [`TicketStore::update_if`], a conditional write that checks the
//! ticket's revision and, for transitions that put a ticket in front of a
//! counter, that the counter is still free.  Both checks happen under the same
//! write lock as the write itself, which is what keeps two clicks on two
//! panels from claiming the same ticket.

use async_trait::async_trait;
use chrono::NaiveDate;
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter, TicketId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticket {0} not found")]
    NotFound(TicketId),
    #[error("ticket {ticket_id} changed since it was read (now rev {current_rev})")]
    Conflict { ticket_id: TicketId, current_rev: u64 },
    #[error("counter {counter} is already serving {label}")]
    CounterOccupied { counter: u32, label: String },
    #[error("ticket {0} already exists")]
    Duplicate(TicketId),
    #[error("write abandoned by its caller")]
    Abandoned,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Preconditions of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateGuard {
    /// Revision the caller read.  The write is refused if the stored ticket
    /// has moved on.
    pub expected_rev: u64,
    /// When set, the write is refused if another ticket is already `Called`
    /// at this counter.
    pub idle_counter: Option<u32>,
}

impl UpdateGuard {
    pub fn rev(expected_rev: u64) -> Self {
        Self {
            expected_rev,
            idle_counter: None,
        }
    }

    pub fn claiming(expected_rev: u64, counter: u32) -> Self {
        Self {
            expected_rev,
            idle_counter: Some(counter),
        }
    }
}

/// Settles, exactly once, whether a write lands or is given up by the caller
/// waiting on it.
///
/// The store calls [`WriteLatch::try_commit`] right before a write becomes
/// visible and backs out if it loses.  A caller that stops waiting calls
/// [`WriteLatch::try_abandon`]; if that loses, the write is already landing.
#[derive(Debug, Default)]
pub struct WriteLatch(AtomicU8);

impl WriteLatch {
    const OPEN: u8 = 0;
    const COMMITTED: u8 = 1;
    const ABANDONED: u8 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_commit(&self) -> bool {
        self.settle(Self::COMMITTED)
    }

    pub fn try_abandon(&self) -> bool {
        self.settle(Self::ABANDONED)
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst) == Self::ABANDONED
    }

    fn settle(&self, to: u8) -> bool {
        self.0
            .compare_exchange(Self::OPEN, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Reserve the next queue number for `(service, day)`.  Numbers start at
    /// 1 and are never handed out twice.
    async fn next_sequence(
        &self,
        service: ServiceType,
        day: NaiveDate,
        latch: &WriteLatch,
    ) -> Result<u32, StoreError>;

    async fn insert(&self, ticket: Ticket, latch: &WriteLatch) -> Result<Ticket, StoreError>;

    async fn get(&self, id: TicketId) -> Result<Ticket, StoreError>;

    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// Replace the ticket with `next` if `guard` still holds.  The stored
    /// revision is bumped; the returned ticket carries it.
    async fn update_if(
        &self,
        guard: UpdateGuard,
        next: Ticket,
        latch: &WriteLatch,
    ) -> Result<Ticket, StoreError>;

    /// Move closed tickets issued before `day`, and the sequences of those
    /// days, out of the live set.  Returns how many tickets moved.
    async fn archive_before(&self, _day: NaiveDate) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Run a store write on its own task, bounded by `timeout`.
///
/// A write that has not reached its commit point when the timeout fires is
/// abandoned and never lands.  One that has is awaited to the end, so a
/// write that took effect is never reported as failed.
pub async fn bounded_write<T, F, Fut>(
    store: &Arc<dyn TicketStore>,
    timeout: Duration,
    op: &str,
    write: F,
) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(Arc<dyn TicketStore>, Arc<WriteLatch>) -> Fut,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    let latch = Arc::new(WriteLatch::new());
    let mut task = tokio::spawn(write(store.clone(), latch.clone()));
    let joined = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if latch.try_abandon() => {
            warn!("Store {} timed out after {} ms", op, timeout.as_millis());
            return Err(StoreError::Unavailable(format!(
                "{} timed out after {} ms",
                op,
                timeout.as_millis()
            )));
        }
        Err(_) => {
            debug!("Store {} is past its commit point; waiting for it", op);
            task.await
        }
    };
    joined.unwrap_or_else(|e| Err(StoreError::Unavailable(format!("{} task failed: {}", op, e))))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SequenceEntry {
    service: ServiceType,
    day: NaiveDate,
    last: u32,
}

/// On-disk form of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    sequences: Vec<SequenceEntry>,
    #[serde(default)]
    tickets: Vec<Ticket>,
}

/// One pending mutation.
enum Change {
    Sequence {
        service: ServiceType,
        day: NaiveDate,
        last: u32,
    },
    Ticket(Ticket),
}

#[derive(Debug, Default)]
struct Tables {
    tickets: HashMap<TicketId, Ticket>,
    sequences: HashMap<(ServiceType, NaiveDate), u32>,
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tickets: snapshot.tickets.into_iter().map(|t| (t.id, t)).collect(),
            sequences: snapshot
                .sequences
                .into_iter()
                .map(|e| ((e.service, e.day), e.last))
                .collect(),
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            sequences: self
                .sequences
                .iter()
                .map(|(&(service, day), &last)| SequenceEntry { service, day, last })
                .collect(),
            tickets: self.tickets.values().cloned().collect(),
        }
    }

    /// The snapshot as it will be once `change` is applied.
    fn snapshot_with(&self, change: &Change) -> Snapshot {
        let Snapshot {
            mut sequences,
            mut tickets,
        } = self.to_snapshot();
        match change {
            Change::Sequence { service, day, last } => {
                match sequences
                    .iter_mut()
                    .find(|e| e.service == *service && e.day == *day)
                {
                    Some(entry) => entry.last = *last,
                    None => sequences.push(SequenceEntry {
                        service: *service,
                        day: *day,
                        last: *last,
                    }),
                }
            }
            Change::Ticket(next) => match tickets.iter_mut().find(|t| t.id == next.id) {
                Some(slot) => *slot = next.clone(),
                None => tickets.push(next.clone()),
            },
        }
        Snapshot { sequences, tickets }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::Sequence { service, day, last } => {
                self.sequences.insert((service, day), last);
            }
            Change::Ticket(ticket) => {
                self.tickets.insert(ticket.id, ticket);
            }
        }
    }

    fn called_at(&self, counter: u32, except: TicketId) -> Option<&Ticket> {
        self.tickets
            .values()
            .find(|t| t.id != except && t.is_called_at(counter))
    }
}

/// In-process store, optionally mirrored to a JSON snapshot file.
///
/// With a snapshot file every mutation is staged to a temporary file, and
/// only after the caller's [`WriteLatch`] commits is it renamed into place
/// and applied in memory.  A write either lands in both or in neither.
/// Write futures are meant to be driven to completion, which
/// [`bounded_write`] does by giving each its own task.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot_file: Option<PathBuf>,
}

impl MemoryStore {
    /// A store that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot_file: None,
        }
    }

    /// A store backed by `path`, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            info!(
                "Loaded {} tickets from {:?}",
                snapshot.tickets.len(),
                path
            );
            Tables::from_snapshot(snapshot)
        } else {
            Tables::default()
        };
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_file: Some(path),
        })
    }

    /// Directory holding one JSON file of closed tickets per issue day.
    fn archive_dir(path: &Path) -> PathBuf {
        path.with_extension("archive")
    }

    async fn write_atomic(path: &Path, json: Vec<u8>) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write the post-change snapshot next to the live one.
    async fn stage(&self, tables: &Tables, change: &Change) -> Result<Option<PathBuf>, StoreError> {
        let Some(path) = &self.snapshot_file else {
            return Ok(None);
        };
        let json = serde_json::to_vec(&tables.snapshot_with(change))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        Ok(Some(tmp))
    }

    async fn commit(
        &self,
        tables: &mut Tables,
        change: Change,
        latch: &WriteLatch,
    ) -> Result<(), StoreError> {
        if latch.is_abandoned() {
            return Err(StoreError::Abandoned);
        }
        let staged = self.stage(tables, &change).await?;
        if !latch.try_commit() {
            if let Some(tmp) = staged {
                let _ = tokio::fs::remove_file(&tmp).await;
            }
            debug!("Dropped a write its caller gave up on");
            return Err(StoreError::Abandoned);
        }
        if let (Some(tmp), Some(path)) = (staged, &self.snapshot_file) {
            tokio::fs::rename(&tmp, path).await?;
        }
        tables.apply(change);
        Ok(())
    }

    /// Merge `closed` into the per-day archive files.
    async fn write_archive(path: &Path, closed: &[Ticket]) -> Result<(), StoreError> {
        let dir = Self::archive_dir(path);
        let mut by_day: BTreeMap<NaiveDate, Vec<&Ticket>> = BTreeMap::new();
        for t in closed {
            by_day.entry(t.issue_day).or_default().push(t);
        }
        for (day, tickets) in by_day {
            let file = dir.join(format!("{}.json", day));
            let mut merged: HashMap<TicketId, Ticket> = match tokio::fs::read(&file).await {
                Ok(bytes) => serde_json::from_slice::<Vec<Ticket>>(&bytes)?
                    .into_iter()
                    .map(|t| (t.id, t))
                    .collect(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
                Err(e) => return Err(e.into()),
            };
            merged.extend(tickets.into_iter().map(|t| (t.id, t.clone())));
            let mut day_tickets: Vec<Ticket> = merged.into_values().collect();
            day_tickets.sort_by_key(|t| (t.service_type, t.queue_number));
            Self::write_atomic(&file, serde_json::to_vec_pretty(&day_tickets)?).await?;
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn next_sequence(
        &self,
        service: ServiceType,
        day: NaiveDate,
        latch: &WriteLatch,
    ) -> Result<u32, StoreError> {
        let mut tables = self.tables.write().await;
        let last = tables.sequences.get(&(service, day)).copied().unwrap_or(0) + 1;
        self.commit(&mut tables, Change::Sequence { service, day, last }, latch)
            .await?;
        debug!("Sequence {} {} -> {}", service, day, last);
        Ok(last)
    }

    async fn insert(&self, mut ticket: Ticket, latch: &WriteLatch) -> Result<Ticket, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tickets.contains_key(&ticket.id) {
            return Err(StoreError::Duplicate(ticket.id));
        }
        ticket.rev = ticket.rev.max(1);
        self.commit(&mut tables, Change::Ticket(ticket.clone()), latch)
            .await?;
        Ok(ticket)
    }

    async fn get(&self, id: TicketId) -> Result<Ticket, StoreError> {
        let tables = self.tables.read().await;
        tables
            .tickets
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.tables.read().await;
        let mut out: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        out.sort_by_key(|t| (t.queue_key(), t.service_type));
        Ok(out)
    }

    async fn update_if(
        &self,
        guard: UpdateGuard,
        mut next: Ticket,
        latch: &WriteLatch,
    ) -> Result<Ticket, StoreError> {
        let mut tables = self.tables.write().await;
        let current_rev = tables
            .tickets
            .get(&next.id)
            .map(|t| t.rev)
            .ok_or(StoreError::NotFound(next.id))?;

        if current_rev != guard.expected_rev {
            return Err(StoreError::Conflict {
                ticket_id: next.id,
                current_rev,
            });
        }
        if let Some(counter) = guard.idle_counter {
            if let Some(busy) = tables.called_at(counter, next.id) {
                return Err(StoreError::CounterOccupied {
                    counter,
                    label: busy.label(),
                });
            }
        }

        next.rev = current_rev + 1;
        self.commit(&mut tables, Change::Ticket(next.clone()), latch)
            .await?;
        Ok(next)
    }

    async fn archive_before(&self, day: NaiveDate) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let is_archived = |t: &Ticket| t.issue_day < day && t.status.is_terminal();
        let closed: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| is_archived(*t))
            .cloned()
            .collect();
        let stale_sequences = tables.sequences.keys().any(|(_, d)| *d < day);
        if closed.is_empty() && !stale_sequences {
            return Ok(0);
        }

        let mut live = Tables {
            tickets: tables.tickets.clone(),
            sequences: tables.sequences.clone(),
        };
        live.tickets.retain(|_, t| !is_archived(t));
        live.sequences.retain(|(_, d), _| *d >= day);

        if let Some(path) = &self.snapshot_file {
            Self::write_archive(path, &closed).await?;
            Self::write_atomic(path, serde_json::to_vec(&live.to_snapshot())?).await?;
        }
        *tables = live;
        info!("Archived {} closed tickets issued before {}", closed.len(), day);
        Ok(closed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use queue_proto::ticket::TicketStatus;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 13).unwrap()
    }

    async fn next(store: &MemoryStore, service: ServiceType, on: NaiveDate) -> u32 {
        store
            .next_sequence(service, on, &WriteLatch::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sequence_is_per_service_and_day() {
        let store = MemoryStore::new();
        assert_eq!(next(&store, ServiceType::Ak1, day()).await, 1);
        assert_eq!(next(&store, ServiceType::Ak1, day()).await, 2);
        assert_eq!(next(&store, ServiceType::Jkp, day()).await, 1);
        assert_eq!(next(&store, ServiceType::Ak1, day().succ_opt().unwrap()).await, 1);
    }

    #[tokio::test]
    async fn test_update_if_checks_rev() {
        let store = MemoryStore::new();
        let t = store
            .insert(Ticket::new(ServiceType::Tka, 1, day(), Utc::now()), &WriteLatch::new())
            .await
            .unwrap();

        let mut next = t.clone();
        next.status = TicketStatus::Cancelled;
        let stored = store.update_if(UpdateGuard::rev(t.rev), next.clone(), &WriteLatch::new()).await.unwrap();
        assert_eq!(stored.rev, t.rev + 1);

        let err = store.update_if(UpdateGuard::rev(t.rev), next, &WriteLatch::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { current_rev, .. } if current_rev == t.rev + 1));
    }

    #[tokio::test]
    async fn test_update_if_refuses_busy_counter() {
        let store = MemoryStore::new();
        let mut a = store
            .insert(Ticket::new(ServiceType::Tka, 1, day(), Utc::now()), &WriteLatch::new())
            .await
            .unwrap();
        let b = store
            .insert(Ticket::new(ServiceType::Tka, 2, day(), Utc::now()), &WriteLatch::new())
            .await
            .unwrap();

        let rev = a.rev;
        a.status = TicketStatus::Called;
        a.counter_number = Some(1);
        store.update_if(UpdateGuard::claiming(rev, 1), a, &WriteLatch::new()).await.unwrap();

        let mut b_called = b.clone();
        b_called.status = TicketStatus::Called;
        b_called.counter_number = Some(1);
        let err = store
            .update_if(UpdateGuard::claiming(b.rev, 1), b_called, &WriteLatch::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CounterOccupied { counter: 1, .. }));
        assert_eq!(store.get(b.id).await.unwrap().status, TicketStatus::Waiting);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");

        let id = {
            let store = MemoryStore::open(&path).unwrap();
            store.next_sequence(ServiceType::Jkp, day(), &WriteLatch::new()).await.unwrap();
            let t = store
                .insert(Ticket::new(ServiceType::Jkp, 1, day(), Utc::now()), &WriteLatch::new())
                .await
                .unwrap();
            t.id
        };

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.get(id).await.unwrap().queue_number, 1);
        assert_eq!(store.next_sequence(ServiceType::Jkp, day(), &WriteLatch::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot should be makes every rename fail.
        let path = dir.path().join("tickets.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let store = MemoryStore {
            tables: RwLock::new(Tables::default()),
            snapshot_file: Some(path),
        };

        let err = store.next_sequence(ServiceType::Tka, day(), &WriteLatch::new()).await;
        assert!(matches!(err, Err(StoreError::Io(_))));
        assert!(store.tables.read().await.sequences.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_in_queue_order() {
        let store = MemoryStore::new();
        for n in [3, 1, 2] {
            store
                .insert(Ticket::new(ServiceType::Ak1, n, day(), Utc::now()), &WriteLatch::new())
                .await
                .unwrap();
        }
        let numbers: Vec<u32> = store
            .list(&TicketFilter::all())
            .await
            .unwrap()
            .iter()
            .map(|t| t.queue_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_abandoned_write_never_lands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");
        let store = MemoryStore::open(&path).unwrap();
        let t = store
            .insert(Ticket::new(ServiceType::Ak1, 1, day(), Utc::now()), &WriteLatch::new())
            .await
            .unwrap();

        let latch = WriteLatch::new();
        assert!(latch.try_abandon());
        let mut called = t.clone();
        called.status = TicketStatus::Called;
        called.counter_number = Some(3);
        let err = store
            .update_if(UpdateGuard::claiming(t.rev, 3), called, &latch)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Abandoned));

        assert_eq!(store.get(t.id).await.unwrap(), t);
        assert_eq!(MemoryStore::open(&path).unwrap().get(t.id).await.unwrap(), t);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_bounded_write_abandons_a_write_that_has_not_committed() {
        let store: Arc<dyn TicketStore> = Arc::new(MemoryStore::new());
        let ticket = Ticket::new(ServiceType::Tka, 1, day(), Utc::now());
        let result = bounded_write(&store, Duration::from_millis(20), "insert", move |store, latch| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            store.insert(ticket, &latch).await
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.list(&TicketFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_write_reports_a_write_that_committed_late() {
        let store: Arc<dyn TicketStore> = Arc::new(MemoryStore::new());
        let ticket = Ticket::new(ServiceType::Tka, 1, day(), Utc::now());
        let result = bounded_write(&store, Duration::from_millis(20), "insert", move |store, latch| async move {
            let stored = store.insert(ticket, &latch).await?;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, StoreError>(stored)
        })
        .await;
        let stored = result.unwrap();
        assert_eq!(store.get(stored.id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_archive_moves_closed_tickets_of_past_days() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");
        let store = MemoryStore::open(&path).unwrap();
        let yesterday = day();
        let today = day().succ_opt().unwrap();

        store.next_sequence(ServiceType::Jkp, yesterday, &WriteLatch::new()).await.unwrap();
        let mut done = Ticket::new(ServiceType::Jkp, 1, yesterday, Utc::now());
        done.status = TicketStatus::Completed;
        let done = store.insert(done, &WriteLatch::new()).await.unwrap();
        let open = store
            .insert(Ticket::new(ServiceType::Jkp, 2, yesterday, Utc::now()), &WriteLatch::new())
            .await
            .unwrap();
        let fresh = store
            .insert(Ticket::new(ServiceType::Jkp, 1, today, Utc::now()), &WriteLatch::new())
            .await
            .unwrap();

        assert_eq!(store.archive_before(today).await.unwrap(), 1);
        assert!(matches!(store.get(done.id).await, Err(StoreError::NotFound(_))));
        assert!(store.get(open.id).await.is_ok());
        assert!(store.get(fresh.id).await.is_ok());
        assert_eq!(store.archive_before(today).await.unwrap(), 0);

        let archived: Vec<Ticket> = serde_json::from_slice(
            &std::fs::read(MemoryStore::archive_dir(&path).join(format!("{}.json", yesterday))).unwrap(),
        )
        .unwrap();
        assert_eq!(archived, vec![done]);

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.list(&TicketFilter::all()).await.unwrap().len(), 2);
        assert!(reopened.tables.read().await.sequences.is_empty());
    }
}
