//! Per-peer session lifecycle: the connection state machine, the candidate
//! buffer, the registry that owns sessions, and the presence watchers that
//! drive it.

pub mod connection;
pub mod ice_buffer;
pub mod presence;
pub mod registry;
pub mod state;

pub use connection::{ConnectionSession, SessionContext, SessionHandle, SessionInput};
pub use ice_buffer::IceCandidateBuffer;
pub use presence::PresenceWatcher;
pub use registry::{RegistryCounts, SessionRecipe, SessionRegistry};
pub use state::{CloseReason, RegistryNotice, SessionDiagnostics, SessionState};
