//! Stateless parameter validation
//!
//! Pure checks invoked explicitly by each public operation before any store
//! round-trip. Every failure is an `InvalidParameter`.

use crate::error::{Error, Result};
use crate::id::{CollectionId, Guid};
use crate::instance::InstanceHeader;
use crate::temporal::{AsOf, HistoryWindow, ValidTime};

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidParameter(msg.into())
}

/// The calling user must be named
pub fn validate_user_id(user: &str) -> Result<()> {
    if user.trim().is_empty() {
        return Err(invalid("userId must not be blank"));
    }
    Ok(())
}

/// A GUID parameter must not be blank
pub fn validate_guid(guid: &Guid, parameter: &str) -> Result<()> {
    if guid.is_blank() {
        return Err(invalid(format!("{} must not be blank", parameter)));
    }
    Ok(())
}

/// A type or classification name must not be blank
pub fn validate_name(name: &str, parameter: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(invalid(format!("{} must not be blank", parameter)));
    }
    Ok(())
}

/// Resolve the page size to use, rejecting sizes above `max`.
///
/// A page size of zero selects `default`.
pub fn effective_page_size(page_size: usize, default: usize, max: usize) -> Result<usize> {
    if page_size > max {
        return Err(invalid(format!(
            "pageSize {} exceeds the maximum of {}",
            page_size, max
        )));
    }
    Ok(if page_size == 0 { default.min(max) } else { page_size })
}

/// Point-in-time reads cannot look into the future
pub fn validate_as_of(as_of: &AsOf) -> Result<()> {
    match as_of.valid_time {
        Some(at) if at > ValidTime::now() => Err(invalid("asOfTime must not be in the future")),
        _ => Ok(()),
    }
}

/// A history window must not end before it starts
pub fn validate_history_window(window: &HistoryWindow) -> Result<()> {
    if let (Some(from), Some(to)) = (window.from, window.to) {
        if from > to {
            return Err(invalid("fromTime must not be after toTime"));
        }
    }
    Ok(())
}

/// Traversal depth is -1 (unbounded) or non-negative
pub fn validate_depth(depth: i32) -> Result<()> {
    if depth < -1 {
        return Err(invalid(format!("level {} is below -1", depth)));
    }
    Ok(())
}

/// A reference copy must be owned by another collection
pub fn validate_reference_copy(header: &InstanceHeader, local: &CollectionId) -> Result<()> {
    validate_guid(&header.guid, "guid")?;
    if header.is_homed_in(local) {
        return Err(invalid(format!(
            "reference copy {} claims to be homed in the local collection {}",
            header.guid, local
        )));
    }
    Ok(())
}

/// Only instances owned or mirrored by the local collection may be mutated
pub fn validate_can_update(header: &InstanceHeader, local: &CollectionId) -> Result<()> {
    if header.is_homed_in(local) || header.replicated_by.as_ref() == Some(local) {
        return Ok(());
    }
    Err(invalid(format!(
        "{} is a reference copy owned by {}",
        header.guid, header.home
    )))
}

/// The new home of a re-home must differ from the current one
pub fn validate_new_home(header: &InstanceHeader, new_home: &CollectionId) -> Result<()> {
    if header.is_homed_in(new_home) {
        return Err(invalid(format!(
            "{} is already homed in {}",
            header.guid, new_home
        )));
    }
    Ok(())
}
