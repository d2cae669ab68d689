//! Utilities for standing up scripted mock exchanges in end-to-end tests.

pub mod exchange;

pub use exchange::{MockBehavior, MockExchangeClient};
