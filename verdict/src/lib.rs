#![allow(ambiguous_glob_reexports)]

//! Verdict aggregate crate that re-exports the main components for
//! downstream users.

pub use verdict_broker as broker;
pub use verdict_config as config;
pub use verdict_core as core;
pub use verdict_data as data;
pub use verdict_engine as engine;
pub use verdict_executor as executor;
pub use verdict_journal as journal;
pub use verdict_risk as risk;
pub use verdict_state as state;
pub use verdict_strategy as strategy;
pub use verdict_test_utils as test_utils;

/// Convenience prelude to pull commonly used items into scope.
pub mod prelude {
    pub use verdict_broker::*;
    pub use verdict_config::*;
    pub use verdict_core::*;
    pub use verdict_data::*;
    pub use verdict_engine::*;
    pub use verdict_executor::*;
    pub use verdict_journal::*;
    pub use verdict_risk::*;
    pub use verdict_state::*;
    pub use verdict_strategy::*;
}
