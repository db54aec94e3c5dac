//! Object store abstraction.
//!
//! This module provides the `ObjectStore` trait the pipeline downloads its
//! input from and uploads artifacts to, along with two backends:
//!
//! - `SwiftStore`: OpenStack Swift / Rackspace Cloud Files over HTTP
//! - `FsStore`: a local directory tree
//!
//! Bodies are exchanged as chunk streams so no object is ever held in
//! memory as a whole.

mod fs;
mod swift;
mod types;

pub use fs::FsStore;
pub use swift::SwiftStore;
pub use types::*;
