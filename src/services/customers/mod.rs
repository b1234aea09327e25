//! Customers service.
//!
//! Lists customers page by page under a search filter, reads single
//! customers and replaces their tag lists.

mod requests;
mod responses;
mod service;

pub use requests::ListCustomersRequest;
pub use service::*;
