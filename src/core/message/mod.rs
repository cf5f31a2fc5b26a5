/*!
Wire messages of the key-agreement protocol.

The codec submodule owns the envelope and tagged-field framing; the
handshake submodule defines the four message shapes built on top of it.
*/

// Envelope and tagged-field framing
pub mod codec;

// The four handshake message shapes
pub mod handshake;

pub use codec::MessageType;
pub use handshake::{ClientConfirm, ClientHello, HelloPayload, KemRequest, ServerAuth, ServerHello};
