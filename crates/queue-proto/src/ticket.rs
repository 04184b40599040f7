//! Ticket model shared by the daemon and every viewer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The closed set of services the office offers.  The serialized form is the
/// code stored on every ticket and used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Foreign-worker reporting.
    #[serde(rename = "TKA")]
    Tka,
    /// Job-seeker card.
    #[serde(rename = "AK1")]
    Ak1,
    /// Unemployment-benefit claim.
    #[serde(rename = "JKP")]
    Jkp,
    /// Information, complaints and industrial mediation.
    #[serde(rename = "MEDIASI")]
    Mediasi,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Tka,
        ServiceType::Ak1,
        ServiceType::Jkp,
        ServiceType::Mediasi,
    ];

    /// Wire / ticket code.
    pub fn code(self) -> &'static str {
        match self {
            ServiceType::Tka => "TKA",
            ServiceType::Ak1 => "AK1",
            ServiceType::Jkp => "JKP",
            ServiceType::Mediasi => "MEDIASI",
        }
    }

    /// Short code painted on the TV board.
    pub fn board_code(self) -> &'static str {
        match self {
            ServiceType::Mediasi => "MDS",
            other => other.code(),
        }
    }

    /// Long name printed on the receipt.
    pub fn name(self) -> &'static str {
        match self {
            ServiceType::Tka => "LAPOR TENAGA KERJA ASING",
            ServiceType::Ak1 => "AK1 KARTU PENCARI KERJA",
            ServiceType::Jkp => "JKP (JAMINAN KEHILANGAN PEKERJAAN)",
            ServiceType::Mediasi => "LAINNYA (INFORMASI & PENGADUAN)",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ServiceType::Tka => "Pelaporan tenaga kerja asing dan perizinan",
            ServiceType::Ak1 => "Pembuatan dan legalisir kartu kuning (AK1)",
            ServiceType::Jkp => "Klaim manfaat jaminan kehilangan pekerjaan",
            ServiceType::Mediasi => "Layanan pengaduan, konsultasi, dan informasi umum",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ServiceType::ALL
            .into_iter()
            .find(|svc| svc.code() == upper || svc.board_code() == upper)
            .ok_or_else(|| format!("unknown service type: {s}"))
    }
}

/// Lifecycle status.
///
/// Transitions:
///   Waiting -> Called -> Completed | Cancelled
///   Called -> Skipped -> Called   (hold, then recall from hold)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Waiting,
    Called,
    Completed,
    Cancelled,
    Skipped,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        TicketStatus::Waiting,
        TicketStatus::Called,
        TicketStatus::Completed,
        TicketStatus::Cancelled,
        TicketStatus::Skipped,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Completed | TicketStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Called => "called",
            TicketStatus::Completed => "completed",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        TicketStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| format!("unknown ticket status: {s}"))
    }
}

/// One visitor's queue entry.  `rev` is bumped by the store on every accepted
/// mutation; viewers use it to drop stale pushes and the store uses it as the
/// compare-and-set guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub service_type: ServiceType,
    pub queue_number: u32,
    /// Local calendar day the number was issued for.
    pub issue_day: NaiveDate,
    pub status: TicketStatus,
    pub counter_number: Option<u32>,
    pub call_count: u32,
    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rev: u64,
}

impl Ticket {
    /// A fresh waiting ticket.
    pub fn new(
        service_type: ServiceType,
        queue_number: u32,
        issue_day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TicketId::new(),
            service_type,
            queue_number,
            issue_day,
            status: TicketStatus::Waiting,
            counter_number: None,
            call_count: 0,
            created_at: now,
            called_at: None,
            completed_at: None,
            rev: 1,
        }
    }

    /// `AK1005` style label.
    pub fn label(&self) -> String {
        format!("{}{:03}", self.service_type.code(), self.queue_number)
    }

    /// Label with the short board code (`MDS012`).
    pub fn board_label(&self) -> String {
        format!("{} {:03}", self.service_type.board_code(), self.queue_number)
    }

    /// Position in the waiting order: earlier days first, then by number.
    pub fn queue_key(&self) -> (NaiveDate, u32) {
        (self.issue_day, self.queue_number)
    }

    pub fn is_called_at(&self, counter: u32) -> bool {
        self.status == TicketStatus::Called && self.counter_number == Some(counter)
    }
}

/// Equality filter over tickets, the shape both store queries and viewer
/// subscriptions take.  Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<TicketStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    /// Drop closed tickets issued before this day.  Open tickets always
    /// match, whatever their day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<NaiveDate>,
}

impl TicketFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn statuses(statuses: impl IntoIterator<Item = TicketStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn ticket(id: TicketId) -> Self {
        Self {
            ticket_id: Some(id),
            ..Self::default()
        }
    }

    /// What a live board needs: everything from `today` on, plus older
    /// tickets that are still open.
    pub fn live(today: NaiveDate) -> Self {
        Self::default().since(today)
    }

    pub fn since(mut self, day: NaiveDate) -> Self {
        self.since = Some(day);
        self
    }

    pub fn with_service(mut self, service: ServiceType) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_counter(mut self, counter: u32) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&ticket.status))
            && self.service.map_or(true, |s| s == ticket.service_type)
            && self.counter.map_or(true, |c| ticket.counter_number == Some(c))
            && self.ticket_id.map_or(true, |id| id == ticket.id)
            && self
                .since
                .map_or(true, |day| ticket.issue_day >= day || !ticket.status.is_terminal())
    }

    /// Whether a push about `ticket` is relevant to a subscriber holding this
    /// filter.  Status and counter are ignored so the subscriber also sees a
    /// ticket leave its set.
    pub fn may_concern(&self, ticket: &Ticket) -> bool {
        self.service.map_or(true, |s| s == ticket.service_type)
            && self.ticket_id.map_or(true, |id| id == ticket.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_codes_round_trip_through_from_str() {
        for svc in ServiceType::ALL {
            assert_eq!(svc.code().parse::<ServiceType>().unwrap(), svc);
        }
        assert_eq!("mds".parse::<ServiceType>().unwrap(), ServiceType::Mediasi);
        assert!("XYZ".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_service_serializes_as_code() {
        let json = serde_json::to_string(&ServiceType::Mediasi).unwrap();
        assert_eq!(json, "\"MEDIASI\"");
    }

    #[test]
    fn test_label_pads_number() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 13).unwrap();
        let t = Ticket::new(ServiceType::Ak1, 5, day, Utc::now());
        assert_eq!(t.label(), "AK1005");
        let m = Ticket::new(ServiceType::Mediasi, 12, day, Utc::now());
        assert_eq!(m.board_label(), "MDS 012");
    }

    #[test]
    fn test_filter_matches_on_every_field() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 13).unwrap();
        let mut t = Ticket::new(ServiceType::Jkp, 1, day, Utc::now());
        t.status = TicketStatus::Called;
        t.counter_number = Some(3);

        assert!(TicketFilter::all().matches(&t));
        assert!(TicketFilter::statuses([TicketStatus::Called]).matches(&t));
        assert!(!TicketFilter::statuses([TicketStatus::Waiting]).matches(&t));
        assert!(TicketFilter::all().with_service(ServiceType::Jkp).matches(&t));
        assert!(!TicketFilter::all().with_service(ServiceType::Tka).matches(&t));
        assert!(TicketFilter::all().with_counter(3).matches(&t));
        assert!(!TicketFilter::all().with_counter(1).matches(&t));
        assert!(TicketFilter::ticket(t.id).matches(&t));
        assert!(!TicketFilter::ticket(TicketId::new()).matches(&t));

        let waiting_only = TicketFilter::statuses([TicketStatus::Waiting]);
        assert!(!waiting_only.matches(&t));
        assert!(waiting_only.may_concern(&t));
    }

    #[test]
    fn test_live_filter_keeps_open_tickets_from_earlier_days() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 14).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let live = TicketFilter::live(today);

        let mut old = Ticket::new(ServiceType::Tka, 9, yesterday, Utc::now());
        assert!(live.matches(&old));
        old.status = TicketStatus::Completed;
        assert!(!live.matches(&old));
        assert!(live.may_concern(&old));

        let mut fresh = Ticket::new(ServiceType::Tka, 1, today, Utc::now());
        fresh.status = TicketStatus::Cancelled;
        assert!(live.matches(&fresh));
    }
}
