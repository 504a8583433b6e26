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

//! # Loan Engine
//!
//! This library tracks the circulation of a lending library: issuing copies
//! of catalogued titles to borrowers, accepting returns, charging late fines
//! and reporting dashboard aggregates.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central circulation processor enforcing the lending policy
//! - [`Title`]: Catalogued title with its pool of lendable copies
//! - [`Loan`]: One copy in the hands of one borrower
//! - [`Fine`]: Charge for a late return
//! - [`LibraryStore`]: Storage seam, implemented in memory by [`MemoryStore`]
//! - [`LoanError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use loan_engine_rs::{BorrowerId, Engine, Isbn, ManualClock, NewBorrower, NewTitle, TitleId};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
//! let engine = Engine::new().with_clock(clock.clone());
//!
//! engine.add_title(NewTitle {
//!     id: TitleId(1),
//!     isbn: Isbn::new("978-0-262-03384-8"),
//!     title: "Introduction to Algorithms".into(),
//!     author: "Cormen".into(),
//!     total_copies: 2,
//! }).unwrap();
//! engine.add_borrower(NewBorrower::student(BorrowerId(1), "Ada", "ada@example.edu")).unwrap();
//!
//! // Issue for 14 days, return on day 20: six days late at 2 per day.
//! let loan = engine.issue_copy(TitleId(1), BorrowerId(1), 14).unwrap();
//! clock.advance_days(20);
//! let receipt = engine.return_copy(loan.id()).unwrap();
//! assert_eq!(receipt.fine_amount(), 12);
//! assert_eq!(engine.title(TitleId(1)).unwrap().stock(), 2);
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Send + Sync`. Operations on different borrowers run in
//! parallel; each operation's writes land in the store as one batch.

mod base;
pub mod borrower;
pub mod clock;
mod engine;
pub mod error;
pub mod fine;
pub mod journal;
pub mod loan;
pub mod policy;
pub mod stats;
pub mod store;
pub mod title;

pub use base::{BorrowerId, FineId, Isbn, LoanId, TitleId};
pub use borrower::{Borrower, Capability, NewBorrower, Role, authorize};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, ReturnReceipt};
pub use error::{ErrorKind, LoanError};
pub use fine::Fine;
pub use journal::{Event, Journal};
pub use loan::{Loan, LoanState, LoanStatus};
pub use policy::{Policy, PolicyError};
pub use stats::{LibraryStats, collection_rate};
pub use store::{
    Batch, FineQuery, LibraryStore, LoanOrder, LoanQuery, MemoryStore, Mutation, Snapshot,
};
pub use title::{NewTitle, Title};
