//! TCP network layer: accept loop, client sessions, command routing,
//! and graceful shutdown.

mod router;
mod server;
mod session;
mod shutdown;

pub use router::handle_line;
pub use server::Server;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};

/// Version string reported by `VERSION` and the connection banner.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
