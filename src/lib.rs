#![doc = include_str!("../README.md")]
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unused_crate_dependencies,
    unreachable_pub,
    missing_docs
)]

mod errors;
pub use errors::Error;

mod int;
pub use int::{random_request_id, SignedInt32Le};

mod config;
pub use config::{servers, Config, IniSection};

pub mod battleye;
pub mod source;

// Unused crate lint workaround for dev dependencies.
#[cfg(test)]
use criterion as _;
#[cfg(all(test, not(feature = "tokio")))]
use tokio as _;
