//! # Session Registry
//!
//! Server-side state for in-flight process codes.
//!
//! ## Components
//! - **Code**: Random process code generation over the fixed key alphabet
//! - **Registry**: Lock-striped table of session records with TTL expiry
//! - **Sweeper**: One background task per server that purges expired records
//!
//! Per-key operations are atomic. Nothing spans more than one key, so no
//! cross-key atomicity is offered.

pub mod code;
pub mod registry;
pub mod sweeper;

pub use registry::{RegistryStats, SessionRecord, SessionRegistry};
pub use sweeper::spawn_sweeper;
