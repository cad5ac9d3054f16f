pub mod connection;
pub mod ice;
pub mod state;
pub mod types;

pub use state::{Effect, Input, NegotiationState, PeerState};
pub use types::{CandidateSummary, IceServerKind, PeerId, ServerConfig};
