pub mod browser;
pub mod protocol;
pub mod server;
