//! Core abstractions for Vellum: the virtual storage contract and journal domain types.
//! No I/O or cryptography lives here; see `vellum-storage` for the encrypted backend.

pub mod journal;
pub mod storage;
