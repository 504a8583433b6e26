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

//! Borrowers, roles and what each role may do.

use crate::LoanError;
use crate::base::BorrowerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Librarian,
    Student,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Issue and return copies on behalf of borrowers.
    Circulate,
    ManageCatalog,
    ManageBorrowers,
    SettleFines,
    /// Be the subject of a loan.
    Borrow,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }

    pub fn allows(self, capability: Capability) -> bool {
        match capability {
            Capability::Borrow => self == Role::Student,
            Capability::Circulate
            | Capability::ManageCatalog
            | Capability::ManageBorrowers
            | Capability::SettleFines => self.is_staff(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Librarian => "librarian",
            Role::Student => "student",
        })
    }
}

impl FromStr for Role {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "librarian" => Ok(Role::Librarian),
            "student" => Ok(Role::Student),
            other => Err(LoanError::UnknownRole(other.to_string())),
        }
    }
}

/// Fails with [`LoanError::Forbidden`] unless `role` holds `capability`.
pub fn authorize(role: Role, capability: Capability) -> Result<(), LoanError> {
    if role.allows(capability) {
        Ok(())
    } else {
        Err(LoanError::Forbidden)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: BorrowerId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, alias = "rollNo")]
    pub roll_no: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(alias = "joinDate", alias = "join_date")]
    pub joined_at: DateTime<Utc>,
}

impl Borrower {
    pub fn new(
        id: BorrowerId,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role,
            roll_no: None,
            department: None,
            contact: None,
            joined_at,
        }
    }

    pub fn student(
        id: BorrowerId,
        name: impl Into<String>,
        email: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self::new(id, name, email, Role::Student, joined_at)
    }

    pub fn with_roll_no(mut self, roll_no: impl Into<String>) -> Self {
        self.roll_no = Some(roll_no.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn can_borrow(&self) -> bool {
        self.role.allows(Capability::Borrow)
    }

    /// E-mail addresses compare case-insensitively.
    pub fn same_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

/// Request to register a borrower or staff member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBorrower {
    pub id: BorrowerId,
    pub name: String,
    pub email: String,
    #[serde(default = "NewBorrower::default_role")]
    pub role: Role,
    #[serde(default, alias = "rollNo")]
    pub roll_no: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl NewBorrower {
    fn default_role() -> Role {
        Role::Student
    }

    pub fn student(id: BorrowerId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: Role::Student,
            roll_no: None,
            department: None,
            contact: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn into_borrower(self, joined_at: DateTime<Utc>) -> Result<Borrower, LoanError> {
        if self.email.trim().is_empty() {
            return Err(LoanError::MissingField("email"));
        }
        if self.name.trim().is_empty() {
            return Err(LoanError::MissingField("name"));
        }
        Ok(Borrower {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role,
            roll_no: self.roll_no,
            department: self.department,
            contact: self.contact,
            joined_at,
        })
    }
}
