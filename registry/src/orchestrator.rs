//! Write and read operations expressed against an open store transaction.
//! Callers own the transaction boundary, see [`crate::service::UserService`].

use crate::model::{default_expiry, PassportRequest, User, UserAttributes, UserId};
use crate::resolver::{resolve, validate_dates, LinkAction};
use crate::storage::{AssociationStore, RecordReader};
use crate::AppError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub user: User,
    pub action: LinkAction,
}

/// Timestamps are assigned here, once per operation, never by the store.
fn stamp(user: &mut User, now: DateTime<Utc>) -> Result<(), AppError> {
    user.created_at.get_or_insert(now);
    user.modified_at = Some(user.modified_at.map_or(now, |previous| previous.max(now)));
    if let Some(passport) = user.passport.as_mut() {
        let issue_date = *passport.issue_date.get_or_insert(now);
        if passport.expiry_date.is_none() {
            let expiry_date = default_expiry(issue_date)
                .ok_or_else(|| AppError::InvalidRequest(format!("issue date {} is out of range", issue_date)))?;
            passport.expiry_date = Some(expiry_date);
        }
        validate_dates(passport)?;
    }
    Ok(())
}

pub fn create_or_update<S>(
    store: &mut S,
    id: Option<UserId>,
    attributes: UserAttributes,
    request: Option<PassportRequest>,
    now: DateTime<Utc>,
) -> Result<Upserted, AppError>
where
    S: AssociationStore + ?Sized,
{
    let mut user = match id {
        Some(id) => store.find_user_by_id(id)?.ok_or_else(|| AppError::not_found("user", id))?,
        None => User::default(),
    };
    user.apply(attributes);
    let resolution = resolve(&mut user, request.as_ref(), &*store)?;
    stamp(&mut user, now)?;
    let user = store.save_atomic(&user, &resolution.orphans)?;
    Ok(Upserted { user, action: resolution.action })
}

/// Always creates a new user. A caller-supplied id is only checked for collisions.
pub fn create<S>(
    store: &mut S,
    requested_id: Option<UserId>,
    attributes: UserAttributes,
    request: Option<PassportRequest>,
    now: DateTime<Utc>,
) -> Result<Upserted, AppError>
where
    S: AssociationStore + ?Sized,
{
    if let Some(id) = requested_id {
        if store.find_user_by_id(id)?.is_some() {
            return Err(AppError::AlreadyExists(format!("user with id {} already exists", id)));
        }
    }
    create_or_update(store, None, attributes, request, now)
}

pub fn delete<S>(store: &mut S, id: UserId) -> Result<(), AppError>
where
    S: AssociationStore + ?Sized,
{
    if store.delete_user_by_id(id)? {
        Ok(())
    } else {
        Err(AppError::not_found("user", id))
    }
}

pub fn get<R: RecordReader + ?Sized>(reader: &R, id: UserId) -> Result<User, AppError> {
    reader.find_user_by_id(id)?.ok_or_else(|| AppError::not_found("user", id))
}

pub fn list<R: RecordReader + ?Sized>(reader: &R) -> Result<Vec<User>, AppError> {
    reader.list_users()
}

pub fn list_with_passports<R: RecordReader + ?Sized>(reader: &R) -> Result<Vec<User>, AppError> {
    Ok(reader.list_users()?.into_iter().filter(|user| user.passport.is_some()).collect())
}
