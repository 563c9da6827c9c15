//! # hud-context
//!
//! Token accounting for the HUD:
//! - [`ContextTracker`] - incremental transcript reading + live estimation
//! - [`limits`] - model context-window lookup
//! - [`pricing`] - model pricing and session cost estimation

pub mod limits;
pub mod pricing;
pub mod tracker;

pub use limits::{context_limit, DEFAULT_CONTEXT_LIMIT};
pub use pricing::{CostEstimate, ModelPricing, PricingTable};
pub use tracker::{
    ContextBreakdown, ContextHealth, ContextTracker, HealthStatus, COMPACTION_THRESHOLD,
    SPARKLINE_SAMPLES, WARNING_THRESHOLD,
};
