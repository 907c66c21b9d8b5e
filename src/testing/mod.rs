//! Testing utilities and mock implementations
//!
//! Drive the connection manager without a broker: sessions opened by
//! [`MockTransport`] report whatever outcome the test asks for.

pub mod mocks;

pub use mocks::*;
