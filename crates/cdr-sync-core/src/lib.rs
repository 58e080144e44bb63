//! # cdr-sync core
//!
//! Runtime-free logic shared by the `cdrsync` binary and its tests: call
//! record and CRM data models, phone-number normalization, provider status
//! mapping, note rendering, and the [`crm::CrmApi`] abstraction with an
//! in-memory implementation.
//!
//! This crate contains no tokio, reqwest, or other I/O dependencies. Network
//! clients and the sync engine live in the `cdr-sync` crate.

pub mod crm;
pub mod models;
pub mod notes;
pub mod phone;
pub mod status;
