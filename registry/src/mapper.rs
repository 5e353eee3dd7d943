//! External representation of users and passports. Passport views never carry the
//! owner, the nesting inside the user view already expresses it.

use crate::model::{Passport, PassportId, PassportRequest, User, UserAttributes, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PassportId>,
    pub passport_number: String,
    pub nationality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<PassportView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

pub fn passport_to_view(passport: &Passport) -> PassportView {
    PassportView {
        id: passport.id,
        passport_number: passport.number.clone(),
        nationality: passport.nationality.clone(),
        issue_date: passport.issue_date,
        expiry_date: passport.expiry_date,
    }
}

pub fn to_view(user: &User) -> UserView {
    UserView {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        passport: user.passport.as_ref().map(passport_to_view),
        created_at: user.created_at,
        modified_at: user.modified_at,
    }
}

pub fn passport_from_view(view: &PassportView, owner: Option<UserId>) -> Passport {
    Passport {
        id: view.id,
        number: view.passport_number.clone(),
        nationality: view.nationality.clone(),
        issue_date: view.issue_date,
        expiry_date: view.expiry_date,
        owner,
    }
}

/// Rebuilds a detached record, the passport back-reference is derived from the user id.
pub fn from_view(view: &UserView) -> User {
    User {
        id: view.id,
        name: view.name.clone(),
        email: view.email.clone(),
        passport: view.passport.as_ref().map(|passport| passport_from_view(passport, view.id)),
        created_at: view.created_at,
        modified_at: view.modified_at,
    }
}

/// Splits a view into what a caller may set: user attributes and the desired passport.
/// Store-assigned timestamps are dropped, the passport id survives only as a consistency claim.
pub fn into_request(view: UserView) -> (UserAttributes, Option<PassportRequest>) {
    let request = view.passport.map(|passport| PassportRequest {
        id: passport.id,
        number: passport.passport_number,
        nationality: passport.nationality,
        issue_date: passport.issue_date,
        expiry_date: passport.expiry_date,
    });
    (UserAttributes { name: view.name, email: view.email }, request)
}
