mod handlers;
mod server;
mod stats;
#[cfg(test)]
mod tests;

pub use server::{StreamServer, StreamServerBuilder};
pub use stats::{ConnectionGuard, StreamStats, StreamStatsSnapshot};
