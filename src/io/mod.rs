//! Blocking I/O built on the scheduler's wait substrate.

mod completion;

pub use completion::{RequestId, RequestQueue};
