//! referral-matrix: placement and compensation engine for a
//! referral-tree membership network.
//!
//! Members form a tree where every position holds at most eight direct
//! children. Placement walks a materialized slot frontier so joins
//! land breadth-first; referral attribution (sponsor) survives
//! spillover even when the tree parent differs. Purchases cascade up
//! to eight ancestor levels as wallet credits, guarded by an
//! idempotent commission ledger, with qualification tiers gating how
//! deep each ancestor can earn.
//!
//! [`MatrixEngine`] is the entry point; the `db` and `engine` modules
//! expose the composable per-connection functions underneath it.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod money;

pub use config::Config;
pub use db::{build_pool, DbPool};
pub use engine::{
    DistributionInput, DistributionOutcome, EventBus, MatrixEngine, MatrixEvent,
};
pub use error::MatrixError;
