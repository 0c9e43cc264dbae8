//! Typed collection API.
//!
//! [`Model`] describes how a type maps to a collection; [`Collection<M>`]
//! runs queries, saves and deletes for it through the identity pool.

mod lifecycle;
mod model;
mod typed;

pub use lifecycle::{FindOptions, SaveOptions, SaveOutcome, SaveReason};
pub use model::Model;
pub use typed::{Collection, OutgoingReference};

pub(crate) use lifecycle::{delete_single, save_instance};
