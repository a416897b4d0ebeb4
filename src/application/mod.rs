//! Application layer: the services that orchestrate the domain.
//!
//! `SettlementCoordinator` owns the one path that moves money;
//! `QrPaymentRegistry` and `AccountService` layer QR payment and account
//! lifecycle semantics on top of the same store contract.

pub mod accounts;
pub mod qr;
pub mod settlement;
