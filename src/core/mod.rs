pub mod cache;
pub mod codec;
pub mod config_store;
pub mod csm;
pub mod models;
pub mod network;
pub mod observability;
pub mod storage;
pub mod tokens;
