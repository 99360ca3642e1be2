//! Serialisable types a host forwards to its UI.

pub mod events;
