pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware;
pub mod protocol;
pub mod sandbox;
pub mod server;
pub mod storage;
pub mod utils;

pub use server::Server;
