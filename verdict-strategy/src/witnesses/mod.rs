//! Built-in witness panel.

mod liquidity_sweep;
mod macro_sentinel;
mod microstructure;
mod range_break;
mod risk_sentinel;
mod time_structure;
mod volatility_release;

pub use liquidity_sweep::{LiquiditySweepConfig, LiquiditySweepWitness};
pub use macro_sentinel::{MacroSentinelConfig, MacroSentinelWitness};
pub use microstructure::{MicrostructureConfig, MicrostructureWitness};
pub use range_break::{RangeBreakConfig, RangeBreakWitness};
pub use risk_sentinel::{RiskSentinelConfig, RiskSentinelWitness};
pub use time_structure::{TimeStructureConfig, TimeStructureWitness};
pub use volatility_release::{VolatilityReleaseConfig, VolatilityReleaseWitness};
