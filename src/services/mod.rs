//! Service layer: board persistence, live session tracking, permissions,
//! and background maintenance. Services are free async functions over the
//! shared pool/registry; routes stay thin.

pub mod maintenance;
pub mod permission;
pub mod registry;
pub mod session;
pub mod store;
