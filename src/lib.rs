pub mod config;
pub mod logging;
pub mod routers;
pub mod server;
