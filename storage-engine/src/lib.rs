pub mod moka_transport;

pub use moka_transport::MokaTransport;
