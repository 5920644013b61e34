//! # Formats Module
//!
//! Binary persistence format for trial-manager state (postcard + header).
//!
//! File I/O is not done here. This module only converts between values and
//! framed bytes; the [`crate::storage`] backends decide where bytes live.

mod snapshot;

pub use snapshot::*;
