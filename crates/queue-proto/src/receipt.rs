//! The flat record handed to the receipt printer, and the live-status URL the
//! receipt's QR code points at.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::{Ticket, TicketId};

/// One 80mm receipt.  `qr_image_data` carries the QR payload; the printer
/// renders it with its native QR command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintRecord {
    pub date: String,
    pub time: String,
    pub service_name: String,
    pub service_code: String,
    pub number: String,
    pub qr_image_data: String,
}

/// URL of a ticket's live-status page.
pub fn status_url(public_base_url: &str, id: TicketId) -> String {
    format!("{}/queue/status/{}", public_base_url.trim_end_matches('/'), id)
}

impl PrintRecord {
    pub fn for_ticket(ticket: &Ticket, public_base_url: &str) -> Self {
        Self::at(ticket, public_base_url, ticket.created_at)
    }

    fn at(ticket: &Ticket, public_base_url: &str, when: DateTime<Utc>) -> Self {
        let local = when.with_timezone(&Local);
        Self {
            date: local.format("%d - %m - %Y").to_string(),
            time: local.format("%I:%M %p").to_string(),
            service_name: ticket.service_type.name().to_string(),
            service_code: ticket.service_type.code().to_string(),
            number: format!("{:03}", ticket.queue_number),
            qr_image_data: status_url(public_base_url, ticket.id),
        }
    }

    /// Big label printed in the middle of the receipt.
    pub fn headline(&self) -> String {
        format!("{}{}", self.service_code, self.number)
    }
}
