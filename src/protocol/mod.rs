/*!
Protocol layer: agreement state machines and their factory.

The agreement submodule holds one state machine per handshake shape; the
factory mints configured agreements from validated specifications.
*/

// Agreement trait and per-shape state machines
pub mod agreement;

// Agreement construction and session-id minting
pub mod factory;

pub use agreement::{Agreement, AgreementStatus, LocalIdentity, PeerIdentity};
pub use factory::AgreementFactory;
