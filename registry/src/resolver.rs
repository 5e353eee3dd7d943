//! Decides what happens to a user's passport on every write. Works on in-memory
//! records only, the one capability it needs from the store is a lookup by number.

use crate::model::{Passport, PassportId, PassportRequest, User};
use crate::AppError;

pub trait PassportLookup {
    fn find_passport_by_number(&self, number: &str) -> Result<Option<Passport>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Nothing requested and nothing owned.
    Unchanged,
    /// Owned passport dropped, it is scheduled for deletion.
    Detached,
    /// Passport with the requested number found unowned and attached.
    Reused,
    /// Fresh passport attached, ids and timestamps come from the store.
    Created,
    /// Owned passport kept, mutable fields overwritten.
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub action: LinkAction,
    /// Passports the store must delete in the same transaction.
    pub orphans: Vec<PassportId>,
}

impl Resolution {
    fn new(action: LinkAction) -> Self {
        Resolution { action, orphans: Vec::new() }
    }
}

fn validate(request: &PassportRequest) -> Result<(), AppError> {
    if request.number.trim().is_empty() {
        return Err(AppError::InvalidRequest("passport number must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_dates(passport: &Passport) -> Result<(), AppError> {
    match (passport.issue_date, passport.expiry_date) {
        (Some(issue), Some(expiry)) if expiry < issue => Err(AppError::InvalidRequest(format!(
            "passport {} would expire ({}) before it is issued ({})",
            passport.number, expiry, issue
        ))),
        _ => Ok(()),
    }
}

/// Brings `user.passport` to the state described by `request`, mutual references included.
/// On error `user` is left as it was.
pub fn resolve<L>(user: &mut User, request: Option<&PassportRequest>, lookup: &L) -> Result<Resolution, AppError>
where
    L: PassportLookup + ?Sized,
{
    let user_id = user.id;
    let request = match request {
        Some(request) => request,
        None => {
            return Ok(match user.passport.take() {
                Some(previous) => Resolution { action: LinkAction::Detached, orphans: previous.id.into_iter().collect() },
                None => Resolution::new(LinkAction::Unchanged),
            });
        }
    };
    validate(request)?;

    if let Some(owned) = user.passport.as_mut() {
        if owned.number != request.number {
            return Err(AppError::RelationshipConflict(format!(
                "user already holds passport {}, its number cannot change to {}",
                owned.number, request.number
            )));
        }
        if let (Some(claimed), Some(actual)) = (request.id, owned.id) {
            if claimed != actual {
                return Err(AppError::RelationshipConflict(format!(
                    "passport id mismatch: user holds passport {}, request refers to {}",
                    actual, claimed
                )));
            }
        }
        let mut updated = owned.clone();
        updated.merge(request);
        updated.owner = user_id;
        validate_dates(&updated)?;
        *owned = updated;
        return Ok(Resolution::new(LinkAction::Updated));
    }

    match lookup.find_passport_by_number(&request.number)? {
        Some(mut existing) => {
            if let Some(holder) = existing.owner {
                if Some(holder) != user_id {
                    return Err(AppError::RelationshipConflict(format!(
                        "passport {} already belongs to user {}",
                        request.number, holder
                    )));
                }
            }
            existing.merge(request);
            existing.owner = user_id;
            validate_dates(&existing)?;
            user.passport = Some(existing);
            Ok(Resolution::new(LinkAction::Reused))
        }
        None => {
            let created = Passport::from_request(request, user_id);
            validate_dates(&created)?;
            user.passport = Some(created);
            Ok(Resolution::new(LinkAction::Created))
        }
    }
}
