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

//! Catalogued titles and their pool of lendable copies.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use loan_engine_rs::{Isbn, Title, TitleId};
//!
//! let isbn = Isbn::new("978-0-262-03384-8");
//! let mut title = Title::new(TitleId(1), isbn, "CLRS", "Cormen", 2, Utc::now()).unwrap();
//! title.take_copy().unwrap();
//! assert_eq!(title.stock(), 1);
//! assert_eq!(title.on_loan(), 1);
//! ```

use crate::LoanError;
use crate::base::{Isbn, TitleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A title with `total_copies` physical units, `stock` of which are on the shelf.
//
//  stock ──take_copy──► stock - 1     (refused at 0)
//  stock ──restore_copy──► stock + 1  (refused at total_copies)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TitleRecord")]
pub struct Title {
    id: TitleId,
    isbn: Isbn,
    title: String,
    author: String,
    total_copies: u32,
    stock: u32,
    added_at: DateTime<Utc>,
}

impl Title {
    pub fn new(
        id: TitleId,
        isbn: Isbn,
        title: impl Into<String>,
        author: impl Into<String>,
        total_copies: u32,
        added_at: DateTime<Utc>,
    ) -> Result<Self, LoanError> {
        if total_copies == 0 {
            return Err(LoanError::InvalidCopies);
        }
        if isbn.is_empty() {
            return Err(LoanError::MissingField("isbn"));
        }
        Ok(Self {
            id,
            isbn,
            title: title.into(),
            author: author.into(),
            total_copies,
            stock: total_copies,
            added_at,
        })
    }

    pub fn id(&self) -> TitleId {
        self.id
    }

    pub fn isbn(&self) -> &Isbn {
        &self.isbn
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Copies currently issued.
    pub fn on_loan(&self) -> u32 {
        self.total_copies - self.stock
    }

    pub fn is_available(&self) -> bool {
        self.stock > 0
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.stock <= self.total_copies,
            "Invariant violated: stock {} exceeds total copies {}",
            self.stock,
            self.total_copies
        );
        debug_assert!(self.total_copies >= 1, "Invariant violated: title without copies");
    }

    /// Hands one copy out.
    pub fn take_copy(&mut self) -> Result<(), LoanError> {
        if self.stock == 0 {
            return Err(LoanError::OutOfStock(self.id));
        }
        self.stock -= 1;
        self.assert_invariants();
        Ok(())
    }

    /// Puts one copy back on the shelf.
    pub fn restore_copy(&mut self) -> Result<(), LoanError> {
        if self.stock >= self.total_copies {
            return Err(LoanError::StockFull(self.id));
        }
        self.stock += 1;
        self.assert_invariants();
        Ok(())
    }

    /// Changes capacity, moving stock by the same delta.
    ///
    /// Refused when fewer copies would remain than are out on loan.
    pub fn set_total_copies(&mut self, total_copies: u32) -> Result<(), LoanError> {
        if total_copies == 0 {
            return Err(LoanError::InvalidCopies);
        }
        let on_loan = self.on_loan();
        if total_copies < on_loan {
            return Err(LoanError::CopiesOnLoan(self.id, on_loan));
        }
        self.total_copies = total_copies;
        self.stock = total_copies - on_loan;
        self.assert_invariants();
        Ok(())
    }
}

/// Request to catalogue a title; it enters fully stocked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTitle {
    pub id: TitleId,
    pub isbn: Isbn,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(alias = "totalCopies")]
    pub total_copies: u32,
}

impl NewTitle {
    pub fn into_title(self, added_at: DateTime<Utc>) -> Result<Title, LoanError> {
        Title::new(
            self.id,
            self.isbn,
            self.title,
            self.author,
            self.total_copies,
            added_at,
        )
    }
}

/// Wire shape of a title, accepting the field spellings used by the
/// various storage back-ends.
#[derive(Debug, Deserialize)]
struct TitleRecord {
    id: TitleId,
    isbn: Isbn,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(alias = "totalCopies")]
    total_copies: u32,
    #[serde(default)]
    stock: Option<u32>,
    #[serde(alias = "addedDate", alias = "added_date")]
    added_at: DateTime<Utc>,
}

impl TryFrom<TitleRecord> for Title {
    type Error = LoanError;

    fn try_from(record: TitleRecord) -> Result<Self, Self::Error> {
        let mut title = Title::new(
            record.id,
            record.isbn,
            record.title,
            record.author,
            record.total_copies,
            record.added_at,
        )?;
        if let Some(stock) = record.stock {
            if stock > title.total_copies {
                return Err(LoanError::StockFull(title.id));
            }
            title.stock = stock;
        }
        Ok(title)
    }
}
