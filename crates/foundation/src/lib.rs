pub mod address;
pub mod math;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use address::*;
pub use math::*;
pub use time::*;
