use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validity granted to a passport whose expiry date was not supplied.
pub const PASSPORT_VALIDITY_YEARS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassportId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PassportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar user fields a caller may set directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserAttributes {
    pub name: String,
    pub email: String,
}

/// Desired passport state carried by a write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassportRequest {
    /// Identifier the caller believes the owned passport has, only ever compared, never used for lookup.
    pub id: Option<PassportId>,
    pub number: String,
    pub nationality: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl PassportRequest {
    pub fn new(number: impl Into<String>, nationality: impl Into<String>) -> Self {
        PassportRequest {
            id: None,
            number: number.into(),
            nationality: nationality.into(),
            issue_date: None,
            expiry_date: None,
        }
    }
}

/// The owned side of the association. `owner` is the authoritative foreign key,
/// it stays `None` only until the owning user is first saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passport {
    pub id: Option<PassportId>,
    pub number: String,
    pub nationality: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub owner: Option<UserId>,
}

impl Passport {
    pub fn from_request(request: &PassportRequest, owner: Option<UserId>) -> Self {
        Passport {
            id: None,
            number: request.number.clone(),
            nationality: request.nationality.clone(),
            issue_date: request.issue_date,
            expiry_date: request.expiry_date,
            owner,
        }
    }

    /// Copies the mutable fields of `request`, the unique number is left untouched.
    pub fn merge(&mut self, request: &PassportRequest) {
        self.nationality = request.nationality.clone();
        if request.issue_date.is_some() {
            self.issue_date = request.issue_date;
        }
        if request.expiry_date.is_some() {
            self.expiry_date = request.expiry_date;
        }
    }
}

/// The owning side of the association, holding at most one passport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub passport: Option<Passport>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(attributes: UserAttributes) -> Self {
        User { name: attributes.name, email: attributes.email, ..User::default() }
    }

    pub fn apply(&mut self, attributes: UserAttributes) {
        self.name = attributes.name;
        self.email = attributes.email;
    }

    /// True when the owned passport, if any, points back at this user.
    pub fn is_consistent(&self) -> bool {
        match (&self.passport, self.id) {
            (None, _) => true,
            (Some(passport), Some(id)) => passport.owner == Some(id),
            (Some(passport), None) => passport.owner.is_none(),
        }
    }
}

pub fn default_expiry(issue_date: DateTime<Utc>) -> Option<DateTime<Utc>> {
    issue_date.checked_add_months(Months::new(PASSPORT_VALIDITY_YEARS * 12))
}
