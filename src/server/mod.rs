pub mod config;
pub mod context;
pub mod handlers;
pub mod response;
pub mod restful;
