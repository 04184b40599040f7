use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::ticket::{ServiceType, Ticket, TicketFilter, TicketId};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and warn about an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side accepts.  A peer announcing more is dropped.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Messages sent from a client (counter panel, kiosk, TV) to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Narrow the pushes this connection receives.  Replied to with a
    /// `Snapshot` of the matching tickets.
    Subscribe { filter: TicketFilter },
    /// Re-send the full snapshot for the current subscription.
    Resync,
    IssueTicket { service: ServiceType },
    GetTicket { ticket_id: TicketId },
    CallNext { counter: u32, service: ServiceType },
    Recall { counter: u32, ticket_id: TicketId },
    Hold { counter: u32, ticket_id: TicketId },
    RecallFromHold { counter: u32, ticket_id: TicketId },
    Complete { counter: u32, ticket_id: TicketId },
    Cancel { counter: u32, ticket_id: TicketId },
}

/// A command plus the id its `Reply` will carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u64,
    #[serde(flatten)]
    pub command: Command,
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum Outcome {
    Ok { ticket: Option<Ticket> },
    Err { error: QueueError },
}

impl From<Result<Ticket, QueueError>> for Outcome {
    fn from(result: Result<Ticket, QueueError>) -> Self {
        match result {
            Ok(ticket) => Outcome::Ok {
                ticket: Some(ticket),
            },
            Err(error) => Outcome::Err { error },
        }
    }
}

/// Messages sent from the daemon to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full snapshot.
    Hello {
        protocol_version: u32,
        snapshot: Vec<Ticket>,
    },
    /// Full resynchronisation for the connection's subscription.
    Snapshot { tickets: Vec<Ticket> },
    /// One ticket changed.  Replace-by-id on the receiver.
    Ticket { ticket: Ticket },
    Reply { request_id: u64, outcome: Outcome },
    Log { message: String },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        if json.len() > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds the {} byte limit", json.len(), MAX_FRAME_LEN);
        }
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN);
        }
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }

    /// Length of the next complete frame in `data`, if one has fully arrived.
    /// Fails as soon as the header announces more than [`MAX_FRAME_LEN`].
    pub fn frame_len(data: &[u8]) -> anyhow::Result<Option<usize>> {
        if data.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN);
        }
        Ok((data.len() >= 4 + len).then_some(4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketStatus;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_request_encode_decode() {
        let msg = Message::Request(Request {
            request_id: 7,
            command: Command::CallNext {
                counter: 3,
                service: ServiceType::Ak1,
            },
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_reply_is_not_mistaken_for_request() {
        let msg = Message::Broadcast(Broadcast::Reply {
            request_id: 7,
            outcome: Outcome::Err {
                error: QueueError::NoTicketsWaiting,
            },
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_hello_carries_snapshot() {
        let t = Ticket::new(
            ServiceType::Tka,
            1,
            NaiveDate::from_ymd_opt(2026, 1, 13).unwrap(),
            Utc::now(),
        );
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            snapshot: vec![t.clone()],
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        match decoded {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                snapshot,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(snapshot, vec![t]);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_subscribe_filter_on_the_wire() {
        let msg = Message::Request(Request {
            request_id: 1,
            command: Command::Subscribe {
                filter: TicketFilter::statuses([TicketStatus::Waiting, TicketStatus::Called]),
            },
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["cmd"], "Subscribe");
        assert_eq!(json["filter"]["statuses"][1], "called");
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let msg = Message::Request(Request {
            request_id: 1,
            command: Command::Resync,
        });
        let encoded = msg.encode().unwrap();
        assert_eq!(Message::frame_len(&encoded[..encoded.len() - 1]).unwrap(), None);
        assert_eq!(Message::frame_len(&encoded).unwrap(), Some(encoded.len()));
        assert!(Message::decode(&encoded[..3]).is_err());
    }

    #[test]
    fn test_oversized_header_is_refused_before_the_body_arrives() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(Message::frame_len(&header).is_err());
        assert!(Message::decode(&header).is_err());
        let ok = (MAX_FRAME_LEN as u32).to_be_bytes();
        assert_eq!(Message::frame_len(&ok).unwrap(), None);
    }
}
