pub mod acl;
pub mod audit;
pub mod auth;
pub mod bakery;
pub mod charm;
pub mod code;
pub mod config;
pub mod db;
pub mod errors;
pub mod logs;
pub mod pool;
pub mod resolve;
pub mod server;
