pub mod usage_store;
