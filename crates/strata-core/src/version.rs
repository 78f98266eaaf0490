//! Version numbering and status transitions
//!
//! Every accepted mutation produces a new value whose version is exactly one
//! more than the prior value's. Soft delete records the prior status so that
//! restore can bring it back.

use crate::error::{Error, Result};
use crate::id::Guid;
use crate::instance::{Instance, InstanceHeader, InstanceStatus};
use chrono::Utc;

/// Build the next revision of `prior` from `mutated`.
///
/// The result carries `prior.version + 1` and fresh update metadata. Fails
/// with `InvalidState` when the two values are different instances.
pub fn increment_version<T: Instance>(prior: &T, mutated: T, user: &str) -> Result<T> {
    if prior.guid() != mutated.guid() {
        return Err(Error::InvalidState(format!(
            "cannot version {} from {}",
            mutated.guid(),
            prior.guid()
        )));
    }

    let header = InstanceHeader {
        version: prior.version() + 1,
        updated_by: Some(user.to_string()),
        updated_at: Some(Utc::now()),
        ..mutated.header().clone()
    };
    Ok(mutated.with_header(header))
}

/// Fail with `AlreadyDeleted` if the instance is soft-deleted
pub fn ensure_not_deleted(header: &InstanceHeader) -> Result<()> {
    if header.is_deleted() {
        return Err(Error::AlreadyDeleted(header.guid.to_string()));
    }
    Ok(())
}

/// Fail with `NotDeleted` unless the instance is soft-deleted
pub fn ensure_deleted(header: &InstanceHeader) -> Result<()> {
    if !header.is_deleted() {
        return Err(Error::NotDeleted(header.guid.to_string()));
    }
    Ok(())
}

/// Check that `status_on_delete` is set exactly when the status is `Deleted`
pub fn check_status_invariant(header: &InstanceHeader) -> Result<()> {
    match (header.is_deleted(), header.status_on_delete) {
        (true, Some(InstanceStatus::Deleted)) => Err(Error::InvalidState(format!(
            "{} records DELETED as its status on delete",
            header.guid
        ))),
        (true, Some(_)) | (false, None) => Ok(()),
        (true, None) => Err(Error::InvalidState(format!(
            "{} is deleted without a status on delete",
            header.guid
        ))),
        (false, Some(_)) => Err(Error::InvalidState(format!(
            "{} carries a status on delete but is not deleted",
            header.guid
        ))),
    }
}

/// Apply a property or content change to a live instance
pub fn update<T: Instance>(current: &T, mutated: T, user: &str) -> Result<T> {
    ensure_not_deleted(current.header())?;
    increment_version(current, mutated, user)
}

/// Move a live instance to another non-deleted status
pub fn change_status<T: Instance>(current: &T, status: InstanceStatus, user: &str) -> Result<T> {
    ensure_not_deleted(current.header())?;
    if status.is_deleted() {
        return Err(Error::InvalidParameter(
            "status DELETED can only be reached through delete".to_string(),
        ));
    }
    let header = InstanceHeader {
        status,
        ..current.header().clone()
    };
    increment_version(current, current.clone().with_header(header), user)
}

/// Soft-delete a live instance, recording its status for restore
pub fn soft_delete<T: Instance>(current: &T, user: &str) -> Result<T> {
    ensure_not_deleted(current.header())?;
    let header = InstanceHeader {
        status: InstanceStatus::Deleted,
        status_on_delete: Some(current.status()),
        ..current.header().clone()
    };
    increment_version(current, current.clone().with_header(header), user)
}

/// Restore a soft-deleted instance to the status it held before deletion
pub fn restore<T: Instance>(current: &T, user: &str) -> Result<T> {
    ensure_deleted(current.header())?;
    let previous = current.header().status_on_delete.ok_or_else(|| {
        Error::InvalidState(format!(
            "{} is deleted without a status on delete",
            current.guid()
        ))
    })?;
    let header = InstanceHeader {
        status: previous,
        status_on_delete: None,
        ..current.header().clone()
    };
    increment_version(current, current.clone().with_header(header), user)
}

/// Re-key an already versioned value under a new GUID
pub fn rekey<T: Instance>(versioned: T, new_guid: Guid) -> T {
    let header = InstanceHeader {
        re_identified_from: Some(versioned.guid().clone()),
        guid: new_guid,
        ..versioned.header().clone()
    };
    versioned.with_header(header)
}
