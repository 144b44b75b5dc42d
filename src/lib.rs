pub mod config;
pub mod cookies;
pub mod decode;
pub mod domain;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod relay;
pub mod server;
pub mod session;
pub mod transport;
