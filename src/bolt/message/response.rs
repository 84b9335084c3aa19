//! Response messages, server to client.

use std::collections::HashMap;
use std::fmt;

use super::tag;
use crate::bolt::error::ServerErrorCode;
use crate::bolt::packstream::{PackError, PackStruct, PackValue};

/// SUCCESS: the request completed; metadata depends on the request.
#[derive(Debug, Clone, Default)]
pub struct Success {
    pub metadata: HashMap<String, PackValue>,
}

impl Success {
    pub fn new(metadata: HashMap<String, PackValue>) -> Self {
        Self { metadata }
    }

    pub fn get(&self, key: &str) -> Option<&PackValue> {
        self.metadata.get(key)
    }

    /// Column names from a RUN success.
    pub fn fields(&self) -> Option<Vec<String>> {
        let list = self.metadata.get("fields")?.as_list()?;
        list.iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Bookmark from a COMMIT (or autocommit PULL) success.
    pub fn bookmark(&self) -> Option<&str> {
        self.metadata.get("bookmark").and_then(|v| v.as_str())
    }

    /// Whether a PULL left records on the server.
    pub fn has_more(&self) -> bool {
        self.metadata
            .get("has_more")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn server(&self) -> Option<&str> {
        self.metadata.get("server").and_then(|v| v.as_str())
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.metadata.get("connection_id").and_then(|v| v.as_str())
    }

    pub fn db(&self) -> Option<&str> {
        self.metadata.get("db").and_then(|v| v.as_str())
    }

    pub fn stats(&self) -> Option<&HashMap<String, PackValue>> {
        self.metadata.get("stats").and_then(|v| v.as_map())
    }

    fn from_struct(s: &PackStruct) -> Result<Self, PackError> {
        let metadata = match s.field(0) {
            Some(PackValue::Map(m)) => m.clone(),
            Some(other) => {
                return Err(PackError::InvalidStruct(format!(
                    "SUCCESS metadata must be a map, got {}",
                    other.kind()
                )))
            }
            None => HashMap::new(),
        };
        Ok(Self { metadata })
    }
}

/// RECORD: one result row.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub fields: Vec<PackValue>,
}

impl Record {
    pub fn new(fields: Vec<PackValue>) -> Self {
        Self { fields }
    }

    fn from_struct(s: &PackStruct) -> Result<Self, PackError> {
        match s.field(0) {
            Some(PackValue::List(fields)) => Ok(Self { fields: fields.clone() }),
            Some(other) => Err(PackError::InvalidStruct(format!(
                "RECORD fields must be a list, got {}",
                other.kind()
            ))),
            None => Ok(Self::default()),
        }
    }
}

/// FAILURE: the request failed with a classified status code.
#[derive(Debug, Clone)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

impl Failure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Transient failures are safe to retry on a fresh transaction.
    pub fn is_transient(&self) -> bool {
        ServerErrorCode::is_transient(&self.code)
    }

    pub fn is_security(&self) -> bool {
        ServerErrorCode::is_security(&self.code)
    }

    fn from_struct(s: &PackStruct) -> Result<Self, PackError> {
        let metadata = s
            .field(0)
            .and_then(|v| v.as_map())
            .ok_or_else(|| PackError::InvalidStruct("FAILURE requires a metadata map".into()))?;

        let code = metadata
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PackError::InvalidStruct("FAILURE requires a code".into()))?
            .to_string();
        let message = metadata
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self { code, message })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// All response messages.
#[derive(Debug, Clone)]
pub enum Response {
    Success(Success),
    Record(Record),
    Failure(Failure),
    Ignored,
}

impl Response {
    pub fn tag(&self) -> u8 {
        match self {
            Response::Success(_) => tag::SUCCESS,
            Response::Record(_) => tag::RECORD,
            Response::Failure(_) => tag::FAILURE,
            Response::Ignored => tag::IGNORED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Response::Success(_) => "SUCCESS",
            Response::Record(_) => "RECORD",
            Response::Failure(_) => "FAILURE",
            Response::Ignored => "IGNORED",
        }
    }

    /// Whether this response completes the request it answers. RECORD
    /// responses stream; the terminal response pops the handler.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Response::Record(_))
    }

    pub fn from_struct(s: &PackStruct) -> Result<Self, PackError> {
        match s.tag {
            tag::SUCCESS => Ok(Response::Success(Success::from_struct(s)?)),
            tag::RECORD => Ok(Response::Record(Record::from_struct(s)?)),
            tag::FAILURE => Ok(Response::Failure(Failure::from_struct(s)?)),
            tag::IGNORED => Ok(Response::Ignored),
            _ => Err(PackError::InvalidStruct(format!(
                "unknown response tag 0x{:02X}",
                s.tag
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_struct(entries: &[(&str, PackValue)]) -> PackStruct {
        let map: HashMap<String, PackValue> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        PackStruct::new(tag::SUCCESS, vec![PackValue::Map(map)])
    }

    #[test]
    fn success_metadata_accessors() {
        let s = success_struct(&[
            ("server", PackValue::from("Lodestone/2.1")),
            ("connection_id", PackValue::from("conn-7")),
            ("bookmark", PackValue::from("lode:bm:42")),
            ("has_more", PackValue::Boolean(true)),
            (
                "fields",
                PackValue::List(vec![PackValue::from("a"), PackValue::from("b")]),
            ),
        ]);
        let success = match Response::from_struct(&s).unwrap() {
            Response::Success(s) => s,
            other => panic!("expected SUCCESS, got {}", other.name()),
        };

        assert_eq!(success.server(), Some("Lodestone/2.1"));
        assert_eq!(success.connection_id(), Some("conn-7"));
        assert_eq!(success.bookmark(), Some("lode:bm:42"));
        assert!(success.has_more());
        assert_eq!(success.fields().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn success_without_metadata() {
        let s = PackStruct::new(tag::SUCCESS, vec![]);
        let success = Success::from_struct(&s).unwrap();
        assert!(success.metadata.is_empty());
        assert!(success.bookmark().is_none());
        assert!(!success.has_more());
    }

    #[test]
    fn record_round() {
        let s = PackStruct::new(
            tag::RECORD,
            vec![PackValue::List(vec![
                PackValue::from("Ada"),
                PackValue::Integer(36),
            ])],
        );
        let record = match Response::from_struct(&s).unwrap() {
            Response::Record(r) => r,
            other => panic!("expected RECORD, got {}", other.name()),
        };
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields[0].as_str(), Some("Ada"));
    }

    #[test]
    fn record_rejects_non_list() {
        let s = PackStruct::new(tag::RECORD, vec![PackValue::Integer(1)]);
        assert!(matches!(
            Response::from_struct(&s).unwrap_err(),
            PackError::InvalidStruct(_)
        ));
    }

    #[test]
    fn failure_parsing_and_classification() {
        let mut map = HashMap::new();
        map.insert("code".to_string(), PackValue::from(ServerErrorCode::DEADLOCK_DETECTED));
        map.insert("message".to_string(), PackValue::from("deadlock"));
        let s = PackStruct::new(tag::FAILURE, vec![PackValue::Map(map)]);

        let failure = match Response::from_struct(&s).unwrap() {
            Response::Failure(fa) => fa,
            other => panic!("expected FAILURE, got {}", other.name()),
        };
        assert!(failure.is_transient());
        assert!(!failure.is_security());
        assert!(failure.to_string().contains("deadlock"));
    }

    #[test]
    fn failure_requires_code() {
        let s = PackStruct::new(
            tag::FAILURE,
            vec![PackValue::Map(HashMap::new())],
        );
        assert!(matches!(
            Response::from_struct(&s).unwrap_err(),
            PackError::InvalidStruct(_)
        ));
    }

    #[test]
    fn ignored_has_no_fields() {
        let s = PackStruct::new(tag::IGNORED, vec![]);
        assert!(matches!(Response::from_struct(&s).unwrap(), Response::Ignored));
    }

    #[test]
    fn unknown_tag_rejected() {
        let s = PackStruct::new(0x42, vec![]);
        assert!(matches!(
            Response::from_struct(&s).unwrap_err(),
            PackError::InvalidStruct(_)
        ));
    }

    #[test]
    fn terminality() {
        assert!(Response::Success(Success::default()).is_terminal());
        assert!(Response::Failure(Failure::new("c", "m")).is_terminal());
        assert!(Response::Ignored.is_terminal());
        assert!(!Response::Record(Record::default()).is_terminal());
    }
}
