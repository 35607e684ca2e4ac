//! Forecasting engine: weather adjuster, base forecast, reserve allocator.
//!
//! All functions are pure and request-scoped; nothing here touches I/O.

pub mod adjust;
pub mod config;
pub mod forecast;
pub mod reserve;
pub mod rounding;

pub use adjust::{adjust, OverrideTable};
pub use config::EngineConfig;
pub use forecast::forecast;
pub use reserve::{allocate, Volatility};
