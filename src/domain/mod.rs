//! Domain layer: the entities the ledger is about and the ports it speaks
//! through. No storage, clock, or crypto specifics live here.

pub mod account;
pub mod money;
pub mod ports;
pub mod qr;
pub mod transaction;
pub mod user;
