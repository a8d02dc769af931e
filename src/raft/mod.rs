pub mod election;
pub mod leader;
pub mod node;
pub mod peers;
pub mod rpc;
pub mod state;
pub mod timer;
pub mod transport;

pub use election::{ElectionOutcome, VoteTally};
pub use node::{LeadershipHook, NoopHook, RaftNode};
pub use peers::PeerRegistry;
pub use state::{NodeState, RaftRole, RaftState, StateSnapshot};
pub use transport::{LocalTransport, PeerHandle, Transport};
