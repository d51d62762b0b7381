//! Domain types for the stored task representation.
//!
//! [`TaskRecord`] is the durable unit both stores persist. It carries the
//! lifecycle rules (TTL, session visibility, effective status) so that the
//! file-backed and in-memory stores behave identically.

pub mod record;

pub use record::TaskRecord;
pub(crate) use record::RecordUpdate;
