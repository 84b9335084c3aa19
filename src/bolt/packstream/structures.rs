//! Wire-level payloads for the tagged structs of the graph data model.
//!
//! Each type here mirrors one struct tag on the wire: graph entities
//! (node, relationship, unbound relationship, path), spatial points and
//! the temporal family. Conversion to the driver's user-facing values
//! happens one layer up, in `driver::types`.

use std::collections::HashMap;

use super::types::{PackStruct, PackValue};
use super::PackError;

fn field_int(fields: &[PackValue], index: usize, what: &str) -> Result<i64, PackError> {
    fields
        .get(index)
        .and_then(PackValue::as_int)
        .ok_or_else(|| PackError::InvalidStruct(format!("{} must be an integer", what)))
}

fn field_float(fields: &[PackValue], index: usize, what: &str) -> Result<f64, PackError> {
    fields
        .get(index)
        .and_then(PackValue::as_float)
        .ok_or_else(|| PackError::InvalidStruct(format!("{} must be a float", what)))
}

fn field_string(fields: &[PackValue], index: usize, what: &str) -> Result<String, PackError> {
    fields
        .get(index)
        .and_then(PackValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| PackError::InvalidStruct(format!("{} must be a string", what)))
}

fn field_string_list(
    fields: &[PackValue],
    index: usize,
    what: &str,
) -> Result<Vec<String>, PackError> {
    fields
        .get(index)
        .and_then(PackValue::as_list)
        .ok_or_else(|| PackError::InvalidStruct(format!("{} must be a list", what)))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| PackError::InvalidStruct(format!("{} entries must be strings", what)))
        })
        .collect()
}

fn field_map(
    fields: &[PackValue],
    index: usize,
    what: &str,
) -> Result<HashMap<String, PackValue>, PackError> {
    fields
        .get(index)
        .and_then(PackValue::as_map)
        .cloned()
        .ok_or_else(|| PackError::InvalidStruct(format!("{} must be a map", what)))
}

/// A graph node: identity, labels, properties.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStruct {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, PackValue>,
}

impl NodeStruct {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, PackValue>) -> Self {
        Self { id, labels, properties }
    }

    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            id: field_int(fields, 0, "node id")?,
            labels: field_string_list(fields, 1, "node labels")?,
            properties: field_map(fields, 2, "node properties")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.id),
            PackValue::List(self.labels.iter().map(|l| PackValue::from(l.as_str())).collect()),
            PackValue::Map(self.properties.clone()),
        ]
    }
}

/// A directed relationship bound to its endpoint node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipStruct {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, PackValue>,
}

impl RelationshipStruct {
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: impl Into<String>,
        properties: HashMap<String, PackValue>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type: rel_type.into(),
            properties,
        }
    }

    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            id: field_int(fields, 0, "relationship id")?,
            start_node_id: field_int(fields, 1, "relationship start node")?,
            end_node_id: field_int(fields, 2, "relationship end node")?,
            rel_type: field_string(fields, 3, "relationship type")?,
            properties: field_map(fields, 4, "relationship properties")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.id),
            PackValue::Integer(self.start_node_id),
            PackValue::Integer(self.end_node_id),
            PackValue::from(self.rel_type.as_str()),
            PackValue::Map(self.properties.clone()),
        ]
    }
}

/// A relationship without endpoint ids, as it appears inside a path.
#[derive(Debug, Clone, PartialEq)]
pub struct UnboundRelationshipStruct {
    pub id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, PackValue>,
}

impl UnboundRelationshipStruct {
    pub fn new(id: i64, rel_type: impl Into<String>, properties: HashMap<String, PackValue>) -> Self {
        Self { id, rel_type: rel_type.into(), properties }
    }

    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            id: field_int(fields, 0, "relationship id")?,
            rel_type: field_string(fields, 1, "relationship type")?,
            properties: field_map(fields, 2, "relationship properties")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.id),
            PackValue::from(self.rel_type.as_str()),
            PackValue::Map(self.properties.clone()),
        ]
    }
}

/// An alternating sequence of nodes and relationships. The `indices`
/// sequence replays node/relationship order and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PathStruct {
    pub nodes: Vec<NodeStruct>,
    pub relationships: Vec<UnboundRelationshipStruct>,
    pub indices: Vec<i64>,
}

impl PathStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        let nodes = fields
            .get(0)
            .and_then(PackValue::as_list)
            .ok_or_else(|| PackError::InvalidStruct("path nodes must be a list".into()))?
            .iter()
            .map(|v| {
                let s = v
                    .as_struct()
                    .filter(|s| s.tag == super::registry::tag::NODE)
                    .ok_or_else(|| PackError::InvalidStruct("path node must be a Node struct".into()))?;
                NodeStruct::from_fields(&s.fields)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let relationships = fields
            .get(1)
            .and_then(PackValue::as_list)
            .ok_or_else(|| PackError::InvalidStruct("path relationships must be a list".into()))?
            .iter()
            .map(|v| {
                let s = v
                    .as_struct()
                    .filter(|s| s.tag == super::registry::tag::UNBOUND_RELATIONSHIP)
                    .ok_or_else(|| {
                        PackError::InvalidStruct(
                            "path relationship must be an UnboundRelationship struct".into(),
                        )
                    })?;
                UnboundRelationshipStruct::from_fields(&s.fields)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let indices = fields
            .get(2)
            .and_then(PackValue::as_list)
            .ok_or_else(|| PackError::InvalidStruct("path indices must be a list".into()))?
            .iter()
            .map(|v| {
                v.as_int()
                    .ok_or_else(|| PackError::InvalidStruct("path indices must be integers".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { nodes, relationships, indices })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::List(
                self.nodes
                    .iter()
                    .map(|n| PackValue::Struct(PackStruct::new(super::registry::tag::NODE, n.to_fields())))
                    .collect(),
            ),
            PackValue::List(
                self.relationships
                    .iter()
                    .map(|r| {
                        PackValue::Struct(PackStruct::new(
                            super::registry::tag::UNBOUND_RELATIONSHIP,
                            r.to_fields(),
                        ))
                    })
                    .collect(),
            ),
            PackValue::List(self.indices.iter().map(|i| PackValue::Integer(*i)).collect()),
        ]
    }
}

/// A 2D point in the coordinate system identified by `srid`.
#[derive(Debug, Clone, PartialEq)]
pub struct Point2dStruct {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
}

impl Point2dStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            srid: field_int(fields, 0, "point srid")?,
            x: field_float(fields, 1, "point x")?,
            y: field_float(fields, 2, "point y")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.srid),
            PackValue::Float(self.x),
            PackValue::Float(self.y),
        ]
    }
}

/// A 3D point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point3dStruct {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3dStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            srid: field_int(fields, 0, "point srid")?,
            x: field_float(fields, 1, "point x")?,
            y: field_float(fields, 2, "point y")?,
            z: field_float(fields, 3, "point z")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.srid),
            PackValue::Float(self.x),
            PackValue::Float(self.y),
            PackValue::Float(self.z),
        ]
    }
}

/// Days since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateStruct {
    pub epoch_days: i64,
}

impl DateStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self { epoch_days: field_int(fields, 0, "date days")? })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![PackValue::Integer(self.epoch_days)]
    }
}

/// Nanoseconds since midnight, with a UTC offset in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStruct {
    pub nanos_of_day: i64,
    pub offset_seconds: i64,
}

impl TimeStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            nanos_of_day: field_int(fields, 0, "time nanoseconds")?,
            offset_seconds: field_int(fields, 1, "time offset")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.nanos_of_day),
            PackValue::Integer(self.offset_seconds),
        ]
    }
}

/// Nanoseconds since midnight, no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimeStruct {
    pub nanos_of_day: i64,
}

impl LocalTimeStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self { nanos_of_day: field_int(fields, 0, "time nanoseconds")? })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![PackValue::Integer(self.nanos_of_day)]
    }
}

/// Seconds + nanoseconds since the epoch, with a UTC offset in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeStruct {
    pub epoch_seconds: i64,
    pub nanos: i64,
    pub offset_seconds: i64,
}

impl DateTimeStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            epoch_seconds: field_int(fields, 0, "datetime seconds")?,
            nanos: field_int(fields, 1, "datetime nanoseconds")?,
            offset_seconds: field_int(fields, 2, "datetime offset")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.epoch_seconds),
            PackValue::Integer(self.nanos),
            PackValue::Integer(self.offset_seconds),
        ]
    }
}

/// Seconds + nanoseconds since the epoch, with a named time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeZonedStruct {
    pub epoch_seconds: i64,
    pub nanos: i64,
    pub zone_id: String,
}

impl DateTimeZonedStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            epoch_seconds: field_int(fields, 0, "datetime seconds")?,
            nanos: field_int(fields, 1, "datetime nanoseconds")?,
            zone_id: field_string(fields, 2, "datetime zone id")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.epoch_seconds),
            PackValue::Integer(self.nanos),
            PackValue::from(self.zone_id.as_str()),
        ]
    }
}

/// Seconds + nanoseconds since the epoch, no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDateTimeStruct {
    pub epoch_seconds: i64,
    pub nanos: i64,
}

impl LocalDateTimeStruct {
    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            epoch_seconds: field_int(fields, 0, "datetime seconds")?,
            nanos: field_int(fields, 1, "datetime nanoseconds")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.epoch_seconds),
            PackValue::Integer(self.nanos),
        ]
    }
}

/// A calendar-aware duration: months and days vary in length, so they
/// are carried separately from the seconds/nanoseconds remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationStruct {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanos: i64,
}

impl DurationStruct {
    pub fn new(months: i64, days: i64, seconds: i64, nanos: i64) -> Self {
        Self { months, days, seconds, nanos }
    }

    pub fn from_fields(fields: &[PackValue]) -> Result<Self, PackError> {
        Ok(Self {
            months: field_int(fields, 0, "duration months")?,
            days: field_int(fields, 1, "duration days")?,
            seconds: field_int(fields, 2, "duration seconds")?,
            nanos: field_int(fields, 3, "duration nanoseconds")?,
        })
    }

    pub fn to_fields(&self) -> Vec<PackValue> {
        vec![
            PackValue::Integer(self.months),
            PackValue::Integer(self.days),
            PackValue::Integer(self.seconds),
            PackValue::Integer(self.nanos),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_fields_roundtrip() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), PackValue::from("Ada"));
        let node = NodeStruct::new(7, vec!["Person".into()], props);
        let parsed = NodeStruct::from_fields(&node.to_fields()).unwrap();
        assert_eq!(node, parsed);
    }

    #[test]
    fn node_rejects_bad_labels() {
        let fields = vec![
            PackValue::Integer(1),
            PackValue::List(vec![PackValue::Integer(9)]),
            PackValue::Map(HashMap::new()),
        ];
        assert!(matches!(
            NodeStruct::from_fields(&fields).unwrap_err(),
            PackError::InvalidStruct(_)
        ));
    }

    #[test]
    fn relationship_fields_roundtrip() {
        let rel = RelationshipStruct::new(1, 2, 3, "KNOWS", HashMap::new());
        let parsed = RelationshipStruct::from_fields(&rel.to_fields()).unwrap();
        assert_eq!(rel, parsed);
    }

    #[test]
    fn path_fields_roundtrip() {
        let path = PathStruct {
            nodes: vec![
                NodeStruct::new(1, vec![], HashMap::new()),
                NodeStruct::new(2, vec![], HashMap::new()),
            ],
            relationships: vec![UnboundRelationshipStruct::new(9, "KNOWS", HashMap::new())],
            indices: vec![1, 1],
        };
        let parsed = PathStruct::from_fields(&path.to_fields()).unwrap();
        assert_eq!(path, parsed);
    }

    #[test]
    fn path_rejects_truncated_node() {
        // A nested Node struct with too few fields must error, not
        // index out of bounds.
        let fields = vec![
            PackValue::List(vec![PackValue::Struct(PackStruct::new(
                super::super::registry::tag::NODE,
                vec![PackValue::Integer(1)],
            ))]),
            PackValue::List(vec![]),
            PackValue::List(vec![]),
        ];
        assert!(matches!(
            PathStruct::from_fields(&fields).unwrap_err(),
            PackError::InvalidStruct(_)
        ));
    }

    #[test]
    fn path_rejects_wrong_nested_tag() {
        let fields = vec![
            PackValue::List(vec![PackValue::Struct(PackStruct::new(
                super::super::registry::tag::DATE,
                vec![PackValue::Integer(1)],
            ))]),
            PackValue::List(vec![]),
            PackValue::List(vec![]),
        ];
        assert!(matches!(
            PathStruct::from_fields(&fields).unwrap_err(),
            PackError::InvalidStruct(_)
        ));
    }

    #[test]
    fn temporal_fields_roundtrip() {
        let date = DateStruct { epoch_days: 18628 };
        assert_eq!(DateStruct::from_fields(&date.to_fields()).unwrap(), date);

        let time = TimeStruct { nanos_of_day: 1234, offset_seconds: 3600 };
        assert_eq!(TimeStruct::from_fields(&time.to_fields()).unwrap(), time);

        let dt = DateTimeStruct { epoch_seconds: 1_600_000_000, nanos: 42, offset_seconds: -7200 };
        assert_eq!(DateTimeStruct::from_fields(&dt.to_fields()).unwrap(), dt);

        let zoned = DateTimeZonedStruct {
            epoch_seconds: 1_600_000_000,
            nanos: 42,
            zone_id: "Europe/Stockholm".into(),
        };
        assert_eq!(DateTimeZonedStruct::from_fields(&zoned.to_fields()).unwrap(), zoned);

        let dur = DurationStruct::new(12, 30, 3600, 500);
        assert_eq!(DurationStruct::from_fields(&dur.to_fields()).unwrap(), dur);
    }

    #[test]
    fn points_roundtrip() {
        let p2 = Point2dStruct { srid: 4326, x: 1.5, y: -2.5 };
        assert_eq!(Point2dStruct::from_fields(&p2.to_fields()).unwrap(), p2);

        let p3 = Point3dStruct { srid: 4979, x: 1.0, y: 2.0, z: 3.0 };
        assert_eq!(Point3dStruct::from_fields(&p3.to_fields()).unwrap(), p3);
    }
}
