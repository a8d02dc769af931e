pub mod client;
pub mod election_service;
pub mod server;

pub use client::GrpcTransport;
pub use election_service::ElectionServiceImpl;
pub use server::GrpcServer;
