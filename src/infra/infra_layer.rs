// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "detection/mod.rs"]
pub mod detection;

#[path = "persistence/mod.rs"]
pub mod persistence;

#[path = "reporting/mod.rs"]
pub mod reporting;

#[path = "watchlist/mod.rs"]
pub mod watchlist;
