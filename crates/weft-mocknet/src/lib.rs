//! # Weft Mocknet
//!
//! An in-memory substitute for a real network transport, used to build and
//! exercise protocol logic across many simulated peers without sockets.
//!
//! From a protocol implementor's point of view it behaves like the real
//! thing: peers have identities, peers become reachable via links,
//! reachable peers can connect, and connections carry independent,
//! protocol-tagged, ordered byte streams dispatched to registered
//! handlers. There is no latency or loss modeling and no wire format; the
//! network moves already-framed application bytes verbatim.
//!
//! ## Shape
//!
//! - [`Mocknet`]: the registry owning peers, links, and topology
//! - [`Peernet`]: one peer's local view (handlers, connections, streams)
//! - [`Link`]: a topology fact, "these two peers may connect"
//! - [`Stream`]: an ordered duplex byte channel implementing the tokio
//!   I/O traits, so protocol code stays transport-agnostic
//! - [`ShutdownController`] / [`ShutdownSignal`]: the explicit lifecycle
//!   scope that bounds everything a mocknet owns
//!
//! ## Example
//!
//! ```no_run
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//! use weft_mocknet::{Mocknet, ProtocolId, ShutdownController, Stream};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (_controller, signal) = ShutdownController::new();
//! let mn = Mocknet::full_mesh_connected(signal, 2)?;
//! let nets = mn.nets();
//!
//! let proto = ProtocolId::from("/demo/echo/1");
//! nets[1].set_handler(proto.clone(), |mut stream: Stream| async move {
//!     let mut buf = [0u8; 4];
//!     if stream.read_exact(&mut buf).await.is_ok() {
//!         let _ = stream.write_all(&buf).await;
//!     }
//!     let _ = stream.close().await;
//! });
//!
//! let mut stream = nets[0].new_stream(proto, nets[1].local_peer())?;
//! stream.write_all(b"ping").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod link;
pub mod mocknet;
pub mod peernet;
pub mod stream;

mod conn;

pub use error::{MocknetError, MocknetResult};
pub use handler::StreamHandler;
pub use lifecycle::{ShutdownController, ShutdownSignal};
pub use link::Link;
pub use mocknet::Mocknet;
pub use peernet::Peernet;
pub use stream::Stream;

// Identity types come from the identity layer; re-exported so most users
// need a single import.
pub use weft_types::{PeerId, ProtocolId};
