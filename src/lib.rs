// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration structs loaded from JSON
// - error:      Typed failures surfaced by a run
// - schema:     Wire and result types
// - util:       Chunker and time helpers
// - metrics:    Process-wide counters
// - directory:  Source of the entities to collect
// - gateway:    Upstream bindings (blocking, non-blocking, mock)
// - collector:  Engines, worker pools and the run entry point
// - persist:    Batched persistence hand-off and sinks
//
pub mod collector;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod persist;
pub mod schema;
pub mod util;

pub use collector::{Collector, Strategy};
pub use error::{CollectError, ConfigurationError, PersistenceError, UpstreamError};
pub use schema::CollectResult;
