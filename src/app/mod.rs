//! Binary-side UI helpers.

pub(crate) mod progress_manager;
