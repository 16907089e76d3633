//! Directory-scanned JSON Schema registry.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain_types::MessageType;

/// Which side of a message pair a schema file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// A `mType` request payload, i.e. `data.req`.
    Request,
    /// A `mType` response payload, i.e. `data.rsp`.
    Response,
}

impl Direction {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "request" => Some(Direction::Request),
            "response" => Some(Direction::Response),
            _ => None,
        }
    }
}

/// Errors the schema registry can report.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Failed to read the schema directory or one of its files.
    #[error("I/O error reading schema directory: {0}")]
    Io(#[from] std::io::Error),

    /// A file under the schema directory did not match the
    /// `<tag>-<direction>-<major>-<minor>-<micro>.json` naming convention.
    #[error("schema file {0:?} does not match the <tag>-<direction>-<major>-<minor>-<micro>.json naming convention")]
    BadFilename(String),

    /// A schema file's contents were not valid JSON.
    #[error("schema file {path:?} is not valid JSON: {source}")]
    Parse {
        /// The offending file.
        path: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// No schema is registered for the requested message type and
    /// direction.
    #[error("no schema registered for {message_type} ({direction:?})")]
    NotFound {
        /// The message type that was requested.
        message_type: MessageType,
        /// Which direction was requested.
        direction: Direction,
    },

    /// The compiled schema rejected an instance document.
    #[error("schema validation failed for {message_type}: {details}")]
    Invalid {
        /// The message type that failed validation.
        message_type: MessageType,
        /// One line per validation error, newline-joined.
        details: String,
    },

    /// The schema itself could not be compiled by the validator.
    #[error("schema for {message_type} failed to compile: {reason}")]
    Compile {
        /// The message type whose schema failed to compile.
        message_type: MessageType,
        /// The underlying compilation error.
        reason: String,
    },
}

struct SchemaEntry {
    message_type: MessageType,
    schema: Value,
}

/// Holds every schema found under a directory, keyed by `(tag, direction)`.
/// Validation compiles the matching schema on demand, mirroring how the
/// rest of this crate treats schemas as static configuration rather than
/// a hot path.
pub struct SchemaRegistry {
    entries: HashMap<(String, Direction), Vec<SchemaEntry>>,
}

impl SchemaRegistry {
    /// Scans `dir` non-recursively for `*.json` files and loads every one
    /// matching the naming convention. Files that don't match are skipped
    /// with a warning rather than failing the whole load, since a schema
    /// directory is often shared with unrelated support files.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let mut entries: HashMap<(String, Direction), Vec<SchemaEntry>> = HashMap::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let file_name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let Some((tag, direction, major, minor, micro)) = parse_filename(&file_name) else {
                warn!(file = %file_name, "skipping schema file with unrecognized name");
                continue;
            };

            let contents = std::fs::read_to_string(&path)?;
            let schema: Value = serde_json::from_str(&contents).map_err(|source| SchemaError::Parse {
                path: path.display().to_string(),
                source,
            })?;

            let message_type = MessageType { tag: tag.clone(), major, minor, micro };
            debug!(%message_type, ?direction, "loaded schema");
            entries.entry((tag, direction)).or_default().push(SchemaEntry { message_type, schema });
        }

        for group in entries.values_mut() {
            group.sort_by(|a, b| {
                (a.message_type.major, a.message_type.minor, a.message_type.micro).cmp(&(
                    b.message_type.major,
                    b.message_type.minor,
                    b.message_type.micro,
                ))
            });
        }

        Ok(Self { entries })
    }

    /// An empty registry, useful for tests or deployments that disable
    /// schema validation.
    #[must_use]
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Validates `payload` against the request schema for `message_type`.
    pub fn validate_request(&self, message_type: &MessageType, payload: &Value) -> Result<(), SchemaError> {
        self.validate(message_type, Direction::Request, payload)
    }

    /// Validates `payload` against the response schema for `message_type`.
    pub fn validate_response(&self, message_type: &MessageType, payload: &Value) -> Result<(), SchemaError> {
        self.validate(message_type, Direction::Response, payload)
    }

    fn validate(
        &self,
        message_type: &MessageType,
        direction: Direction,
        payload: &Value,
    ) -> Result<(), SchemaError> {
        let entry = self.resolve(message_type, direction)?;

        let validator = jsonschema::validator_for(&entry.schema).map_err(|source| SchemaError::Compile {
            message_type: entry.message_type.clone(),
            reason: source.to_string(),
        })?;

        let output = validator.apply(payload).basic();
        if let jsonschema::BasicOutput::Invalid(errors) = output {
            let details = errors.iter().fold(String::new(), |mut acc, e| {
                if !acc.is_empty() {
                    acc.push('\n');
                }
                acc.push_str(&format!("{} at {}", e.error_description(), e.instance_location()));
                acc
            });
            return Err(SchemaError::Invalid { message_type: entry.message_type.clone(), details });
        }
        Ok(())
    }

    /// Finds the schema entry for `message_type`/`direction`. Falls back
    /// to the highest registered version for that tag when the exact
    /// version isn't registered, mirroring a gateway rolling forward
    /// across minor schema updates without requiring every client to pin.
    fn resolve(&self, message_type: &MessageType, direction: Direction) -> Result<&SchemaEntry, SchemaError> {
        let group = self
            .entries
            .get(&(message_type.tag.clone(), direction))
            .ok_or_else(|| SchemaError::NotFound { message_type: message_type.clone(), direction })?;

        if let Some(exact) = group.iter().find(|e| {
            e.message_type.major == message_type.major
                && e.message_type.minor == message_type.minor
                && e.message_type.micro == message_type.micro
        }) {
            return Ok(exact);
        }

        group
            .last()
            .ok_or_else(|| SchemaError::NotFound { message_type: message_type.clone(), direction })
    }

    /// True if any schema is registered for `tag` in either direction.
    #[must_use]
    pub fn knows_tag(&self, tag: &str) -> bool {
        self.entries.keys().any(|(t, _)| t == tag)
    }
}

fn parse_filename(stem: &str) -> Option<(String, Direction, u16, u16, u16)> {
    let parts: Vec<&str> = stem.rsplitn(4, '-').collect();
    if parts.len() != 4 {
        return None;
    }
    let [micro, minor, major, rest] = [parts[0], parts[1], parts[2], parts[3]];
    let micro: u16 = micro.parse().ok()?;
    let minor: u16 = minor.parse().ok()?;
    let major: u16 = major.parse().ok()?;
    let (tag, direction) = rest.rsplit_once('-')?;
    let direction = Direction::parse(direction)?;
    Some((tag.to_string(), direction, major, minor, micro))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_schema(dir: &Path, name: &str, schema: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(schema.as_bytes()).unwrap();
    }

    #[test]
    fn parses_well_formed_filenames() {
        let parsed = parse_filename("iqmeshNetwork_BondNodeLocal-request-1-0-0").unwrap();
        assert_eq!(parsed, ("iqmeshNetwork_BondNodeLocal".to_string(), Direction::Request, 1, 0, 0));
    }

    #[test]
    fn rejects_malformed_filenames() {
        assert!(parse_filename("not-a-schema-name").is_none());
    }

    #[test]
    fn loads_and_validates_matching_payload() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(
            dir.path(),
            "iqmeshNetwork_BondNodeLocal-request-1-0-0.json",
            r#"{"type":"object","required":["deviceAddr"],"properties":{"deviceAddr":{"type":"integer"}}}"#,
        );
        let registry = SchemaRegistry::load_dir(dir.path()).unwrap();
        let mtype = MessageType { tag: "iqmeshNetwork_BondNodeLocal".to_string(), major: 1, minor: 0, micro: 0 };
        registry.validate_request(&mtype, &serde_json::json!({"deviceAddr": 3})).unwrap();
    }

    #[test]
    fn rejects_payload_missing_required_field() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(
            dir.path(),
            "iqmeshNetwork_BondNodeLocal-request-1-0-0.json",
            r#"{"type":"object","required":["deviceAddr"]}"#,
        );
        let registry = SchemaRegistry::load_dir(dir.path()).unwrap();
        let mtype = MessageType { tag: "iqmeshNetwork_BondNodeLocal".to_string(), major: 1, minor: 0, micro: 0 };
        let err = registry.validate_request(&mtype, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid { .. }));
    }

    #[test]
    fn unknown_message_type_is_not_found() {
        let registry = SchemaRegistry::empty();
        let mtype = MessageType::with_default_version("mystery");
        let err = registry.validate_request(&mtype, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { .. }));
    }
}
