pub mod server;
pub mod shutdown;
pub mod webhook;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use shutdown::ShutdownCoordinator;
