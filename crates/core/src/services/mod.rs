pub mod aligner;
pub mod fetch_scheduler;
pub mod market_hours;
pub mod rate_budget;
pub mod return_engine;
pub mod timing;
