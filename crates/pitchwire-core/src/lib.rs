pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod merge;
pub mod projection;
pub mod protocol;
pub mod session;
