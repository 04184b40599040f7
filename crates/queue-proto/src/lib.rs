pub mod board;
pub mod config;
pub mod display;
pub mod error;
pub mod machine;
pub mod platform;
pub mod protocol;
pub mod receipt;
pub mod ticket;
