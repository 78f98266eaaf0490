//! Bitemporal time handling for Strata
//!
//! Valid time is the business-effective time of a revision; transaction time
//! is the moment the store committed it. Point-in-time reads pin a valid time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Valid time - when a revision became effective
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidTime(DateTime<Utc>);

impl ValidTime {
    /// Create a valid time from the current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create from a DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Create from microseconds since Unix epoch
    pub fn from_micros(micros: i64) -> Self {
        Self(DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Get as DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Get as milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Get as microseconds since Unix epoch
    pub fn as_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    /// The beginning of time (for queries)
    pub fn min() -> Self {
        Self(DateTime::<Utc>::MIN_UTC)
    }

    /// The end of time (for queries)
    pub fn max() -> Self {
        Self(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for ValidTime {
    fn default() -> Self {
        Self::now()
    }
}

/// Transaction time - when the store committed a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionTime(DateTime<Utc>);

impl TransactionTime {
    /// Create a transaction time from the current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Get as DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Get as milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Default for TransactionTime {
    fn default() -> Self {
        Self::now()
    }
}

/// One stored revision of a record
///
/// A revision is effective from `valid_time` until the next revision of the
/// same record (`valid_until`), or indefinitely when it is the latest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision<T> {
    /// The record content
    pub data: T,

    /// When this revision became effective
    pub valid_time: ValidTime,

    /// When the store committed this revision
    pub transaction_time: TransactionTime,

    /// When a later revision superseded this one (None if current)
    pub valid_until: Option<ValidTime>,
}

impl<T> Revision<T> {
    /// Create a current revision
    pub fn new(data: T, valid_time: ValidTime, transaction_time: TransactionTime) -> Self {
        Self {
            data,
            valid_time,
            transaction_time,
            valid_until: None,
        }
    }

    /// Check if this revision is the latest one
    pub fn is_current(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Check if this revision was in effect at a specific valid time
    pub fn was_valid_at(&self, at: ValidTime) -> bool {
        self.valid_time <= at && self.valid_until.is_none_or(|until| until > at)
    }

    /// Check if this revision was in effect at any point of a window
    pub fn overlaps(&self, window: &HistoryWindow) -> bool {
        let from = window.from.unwrap_or_else(ValidTime::min);
        let to = window.to.unwrap_or_else(ValidTime::max);
        self.valid_time <= to && self.valid_until.is_none_or(|until| until > from)
    }

    /// Get a reference to the data
    pub fn get(&self) -> &T {
        &self.data
    }

    /// Consume and return the data
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Map the revision content, keeping its times
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Revision<U> {
        Revision {
            data: f(self.data),
            valid_time: self.valid_time,
            transaction_time: self.transaction_time,
            valid_until: self.valid_until,
        }
    }
}

/// Valid-time window for history queries (both ends inclusive)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub from: Option<ValidTime>,
    pub to: Option<ValidTime>,
}

impl HistoryWindow {
    /// Create a window; `None` leaves that end open
    pub fn new(from: Option<ValidTime>, to: Option<ValidTime>) -> Self {
        Self { from, to }
    }

    /// An unbounded window (all time)
    pub fn all() -> Self {
        Self::default()
    }

    /// Check if a time is within this window
    pub fn contains(&self, time: ValidTime) -> bool {
        self.from.is_none_or(|from| time >= from) && self.to.is_none_or(|to| time <= to)
    }
}

/// Order in which history revisions are returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryOrder {
    /// Oldest revision first
    Forwards,

    /// Newest revision first
    #[default]
    Backwards,
}

/// Point-in-time read specification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsOf {
    /// The valid time to read as of (None = latest)
    pub valid_time: Option<ValidTime>,
}

impl AsOf {
    /// Read the latest revisions
    pub fn now() -> Self {
        Self { valid_time: None }
    }

    /// Read as of a specific valid time
    pub fn at(time: ValidTime) -> Self {
        Self {
            valid_time: Some(time),
        }
    }

    /// Returns true if this reads the latest revisions
    pub fn is_now(&self) -> bool {
        self.valid_time.is_none()
    }

    /// Check whether a revision is the one visible to this read
    pub fn sees<T>(&self, revision: &Revision<T>) -> bool {
        match self.valid_time {
            None => revision.is_current(),
            Some(at) => revision.was_valid_at(at),
        }
    }
}

impl From<ValidTime> for AsOf {
    fn from(time: ValidTime) -> Self {
        Self::at(time)
    }
}
