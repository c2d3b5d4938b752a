//! Session documents and on-disk layout
//!
//! `schema` holds the serialized shapes (session, events, footage windows,
//! camera headers); `bundle` maps them onto the recordings directory.

pub mod bundle;
pub mod schema;

pub use schema::{CameraHeader, EventKind, EventRecord, FootageWindow, SessionDocument};
