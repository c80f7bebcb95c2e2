//! # rchat-proto
//!
//! Wire protocol for the rchatd replicated chat daemon.
//!
//! Every unit on the wire is an [`Envelope`] (`{version, command, data}`)
//! serialized as JSON and terminated by a single NUL byte. The same framing
//! is used on both channels; the command vocabularies are disjoint:
//!
//! - the **client channel** speaks [`ClientRequest`] / [`Reply`],
//! - the **replica channel** speaks [`PeerFrame`], whose `distribute_update`
//!   frame carries a nested client-mutation envelope.
//!
//! ## Quick start
//!
//! ```rust
//! use rchat_proto::ClientRequest;
//!
//! let req = ClientRequest::Login {
//!     username: "alice".into(),
//!     password: "pw".into(),
//! };
//! let env = req.to_envelope();
//! assert_eq!(env.command, "login");
//!
//! let back = ClientRequest::from_envelope(&env).unwrap();
//! assert_eq!(back, req);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

#[cfg(feature = "tokio")]
pub mod codec;
pub mod envelope;
pub mod error;
pub mod peer;
pub mod reply;
pub mod request;

#[cfg(feature = "tokio")]
pub use codec::FrameCodec;
pub use envelope::{Envelope, PROTOCOL_VERSION};
pub use error::{ProtocolError, Result};
pub use peer::PeerFrame;
pub use reply::{DeliveredMessage, Reply};
pub use request::ClientRequest;
