//! Service implementations for the upstream directory API.

pub mod customers;

pub use customers::{CustomerDirectory, CustomersService, ListCustomersRequest};
