//! Remote conversational agent: wire protocol, persona, connection.

pub mod connection;
pub mod persona;
pub mod protocol;
