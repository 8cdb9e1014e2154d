pub mod cache;
pub mod cell;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod queue;
pub mod reassembly;
pub mod residency;
pub mod session;
pub mod traversal;

pub use cache::*;
pub use cell::*;
pub use codec::*;
pub use config::*;
pub use protocol::*;
pub use queue::*;
pub use reassembly::*;
pub use residency::*;
pub use session::*;
pub use traversal::*;
