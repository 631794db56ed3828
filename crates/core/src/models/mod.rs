pub mod chart;
pub mod fetch;
pub mod price;
pub mod settings;
pub mod ticker;
pub mod timeframe;
