//! Session repository implementations.

mod memory;
mod session;

pub use memory::MemorySessionRepository;
pub use session::SurrealSessionRepository;
