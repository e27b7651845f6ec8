//! Routing-oracle and response-cache adapters (spec §4.6): thin contracts
//! to the external driveable-routing service and its key-value response
//! cache, plus a reference HTTP implementation so the crate is runnable and
//! testable standalone.

pub mod cache;
pub mod oracle;
pub mod wire;

pub use cache::{Cache, InMemoryCache, NullCache, DEFAULT_TTL};
pub use oracle::{CachedOracle, FixtureOracle, HttpOracle, MatrixResult, NullOracle, Oracle, OracleResult, SharedOracle};
