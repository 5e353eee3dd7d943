//! Persistent row layouts. The passport row carries the owner id, which is the single
//! authoritative link between the two tables.

use crate::model::{Passport, PassportId, User, UserId};
use crate::AppError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportRow {
    pub number: String,
    pub nationality: String,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub owner: u64,
}

pub fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, AppError> {
    Ok(bincode::serialize(row)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

fn unstamped(what: &str) -> AppError {
    AppError::InvalidRequest(format!("{} must be timestamped before it is saved", what))
}

impl UserRow {
    pub fn from_user(user: &User) -> Result<Self, AppError> {
        Ok(UserRow {
            name: user.name.clone(),
            email: user.email.clone(),
            created_at: user.created_at.ok_or_else(|| unstamped("user"))?,
            modified_at: user.modified_at.ok_or_else(|| unstamped("user"))?,
        })
    }

    pub fn into_user(self, id: UserId, passport: Option<Passport>) -> User {
        User {
            id: Some(id),
            name: self.name,
            email: self.email,
            passport,
            created_at: Some(self.created_at),
            modified_at: Some(self.modified_at),
        }
    }
}

impl PassportRow {
    pub fn from_passport(passport: &Passport, owner: UserId) -> Result<Self, AppError> {
        Ok(PassportRow {
            number: passport.number.clone(),
            nationality: passport.nationality.clone(),
            issue_date: passport.issue_date.ok_or_else(|| unstamped("passport"))?,
            expiry_date: passport.expiry_date.ok_or_else(|| unstamped("passport"))?,
            owner: owner.0,
        })
    }

    pub fn into_passport(self, id: PassportId) -> Passport {
        Passport {
            id: Some(id),
            number: self.number,
            nationality: self.nationality,
            issue_date: Some(self.issue_date),
            expiry_date: Some(self.expiry_date),
            owner: Some(UserId(self.owner)),
        }
    }
}
