//! Session memory
//!
//! Holds what earlier queries produced so later ones (reports, symbol
//! follow-ups) can build on it.

pub mod session;

pub use session::{CachedDataset, HistoryEntry, Session, SessionSummary};
