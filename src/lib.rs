//! FIDIC (Red Book 2017) contract administration rule engine.
//!
//! Deadlines and role-gated state machines for claims (Clause 20), contractor's
//! document reviews (Clause 5) and disagreements (Clause 3.7), persisted in a
//! conditional-update record store.

pub mod claim;
pub mod config;
pub mod contract;
pub mod deadline;
pub mod disagreement;
pub mod document;
pub mod error;
pub mod journal;
pub mod role;
pub mod service;
pub mod store;
pub mod utils;

pub use error::{EngineError, EngineResult, ErrorKind, ValidationError};
pub use service::ContractAdminService;
