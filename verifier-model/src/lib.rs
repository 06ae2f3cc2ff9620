//! The pre-parsed, class-loading-free model a bytecode verifier's core operates on: class ids and
//! an append-only name interner, a minimal class-hierarchy view, and a decoded method body
//! (instructions plus exception table).
//!
//! Everything that would normally sit below this layer — reading `.class` files, resolving
//! constant-pool entries, linking across class loaders — is treated as an external collaborator
//! and is out of scope; see `SPEC_FULL.md` §1.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod code;
pub mod data;
pub mod id;
pub mod util;

pub use data::{class_names::ClassNames, classes::Classes};
