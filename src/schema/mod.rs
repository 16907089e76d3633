//! JSON Schema registry: loads `<tag>-<direction>-<major>-<minor>-<micro>.json`
//! files from a directory and validates inbound/outbound payloads against
//! them.

mod registry;

pub use registry::{Direction, SchemaError, SchemaRegistry};
