//! Libervia Kernel - Per-Tenant Decision Core
//!
//! This crate implements the tenant-scoped core the gateway fronts: a
//! segmented, hash-chained event log; atomic JSON entity stores; and the
//! `CoreInstance` facade the runtime cache hands out. The gateway forwards
//! cognitive operations here and never reaches into a tenant directory
//! directly.

mod adapter;
mod entities;
mod event_log;
mod instance;
mod store;

pub use adapter::{AdapterFactory, IntegrationAdapter};
pub use entities::*;
pub use event_log::{entry_hash, verify_chain, EventLog};
pub use instance::{CoreInstance, InstanceMetrics};
pub use store::{JsonStore, StoredItem};
