// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Thread-safe circulation journal.
//!
//! Records every applied operation in commit order so dashboards can show
//! recent activity without re-reading the store.

use crate::base::{BorrowerId, FineId, LoanId, TitleId};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::Serialize;

/// One applied operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TitleAdded {
        title_id: TitleId,
        at: DateTime<Utc>,
    },
    CopiesChanged {
        title_id: TitleId,
        total_copies: u32,
        at: DateTime<Utc>,
    },
    TitleRemoved {
        title_id: TitleId,
        at: DateTime<Utc>,
    },
    BorrowerAdded {
        borrower_id: BorrowerId,
        at: DateTime<Utc>,
    },
    BorrowerRemoved {
        borrower_id: BorrowerId,
        at: DateTime<Utc>,
    },
    Issued {
        loan_id: LoanId,
        title_id: TitleId,
        borrower_id: BorrowerId,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Returned {
        loan_id: LoanId,
        title_id: TitleId,
        fine: Option<(FineId, u64)>,
        at: DateTime<Utc>,
    },
    FineSettled {
        fine_id: FineId,
        amount: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::TitleAdded { at, .. }
            | Self::CopiesChanged { at, .. }
            | Self::TitleRemoved { at, .. }
            | Self::BorrowerAdded { at, .. }
            | Self::BorrowerRemoved { at, .. }
            | Self::Issued { at, .. }
            | Self::Returned { at, .. }
            | Self::FineSettled { at, .. } => *at,
        }
    }
}

/// Lock-free FIFO of [`Event`]s.
#[derive(Debug, Default)]
pub struct Journal {
    events: SegQueue<Event>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            events: SegQueue::new(),
        }
    }

    pub fn record(&self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Removes and returns every recorded event, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        let mut drained = Vec::with_capacity(self.events.len());
        while let Some(event) = self.events.pop() {
            drained.push(event);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order() {
        let journal = Journal::new();
        let at = Utc::now();
        journal.record(Event::TitleAdded {
            title_id: TitleId(1),
            at,
        });
        journal.record(Event::TitleRemoved {
            title_id: TitleId(1),
            at,
        });
        assert_eq!(journal.len(), 2);

        let events = journal.drain();
        assert!(matches!(events[0], Event::TitleAdded { .. }));
        assert!(matches!(events[1], Event::TitleRemoved { .. }));
        assert!(journal.is_empty());
    }

    #[test]
    fn events_serialize_with_tag() {
        let at = "2024-01-01T00:00:00Z".parse().unwrap();
        let event = Event::FineSettled {
            fine_id: FineId(2),
            amount: 12,
            at,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fine_settled");
        assert_eq!(json["amount"], 12);
        assert_eq!(event.at(), at);
    }
}
