//! Per-entity data access.
//!
//! Every function is generic over [`sea_orm::ConnectionTrait`], so the same
//! query runs on the pool for reads or on a transaction handle inside a
//! unit of work. Services never build select queries themselves.

pub mod menu;
pub mod orders;
pub mod restaurants;
pub mod sessions;
pub mod tables;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;

pub(crate) fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

pub(crate) fn utc(value: DateTimeWithTimeZone) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}
