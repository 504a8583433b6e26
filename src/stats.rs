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

//! Dashboard aggregates.

use crate::borrower::{Borrower, Role};
use crate::fine::{Fine, fine_total};
use crate::loan::Loan;
use crate::title::Title;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Point-in-time library figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total_copies: u64,
    pub issued: usize,
    pub overdue: usize,
    pub registered_borrowers: usize,
    pub returned_today: usize,
    pub total_fines: u64,
    pub paid_fines: u64,
    pub unpaid_fines: u64,
    /// Paid share of all fines, in percent.
    pub collection_rate: Decimal,
}

impl LibraryStats {
    const RATE_PRECISION: u32 = 2;

    pub fn compute(
        titles: &[Title],
        borrowers: &[Borrower],
        loans: &[Loan],
        fines: &[Fine],
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        let total_fines = fine_total(fines);
        let paid_fines = fine_total(fines.iter().filter(|f| f.is_paid()));

        Self {
            total_copies: titles.iter().map(|t| u64::from(t.total_copies())).sum(),
            issued: loans.iter().filter(|l| l.is_outstanding()).count(),
            overdue: loans.iter().filter(|l| l.is_overdue(now)).count(),
            registered_borrowers: borrowers.iter().filter(|b| b.role == Role::Student).count(),
            returned_today: loans
                .iter()
                .filter(|l| l.returned_at().is_some_and(|at| at.date_naive() == today))
                .count(),
            total_fines,
            paid_fines,
            unpaid_fines: total_fines - paid_fines,
            collection_rate: collection_rate(paid_fines, total_fines)
                .round_dp(Self::RATE_PRECISION),
        }
    }
}

/// `paid / total` as a percentage. A zero total counts as one, giving 0%.
pub fn collection_rate(paid: u64, total: u64) -> Decimal {
    let denominator = Decimal::from(total.max(1));
    Decimal::from(paid) * Decimal::ONE_HUNDRED / denominator
}
