pub mod config;
pub mod hostport;
pub mod security;

pub use hostport::HostPort;
