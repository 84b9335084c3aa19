//! User-facing value types.
//!
//! [`Value`] is the driver's domain representation: wire structs
//! decoded through the registry into graph entities, spatial points and
//! chrono-backed temporal values.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::bolt::packstream::registry::{self, StructValue};
use crate::bolt::packstream::structures::{
    DateStruct, DateTimeStruct, DateTimeZonedStruct, DurationStruct, LocalDateTimeStruct,
    LocalTimeStruct, NodeStruct, PathStruct, Point2dStruct, Point3dStruct, RelationshipStruct,
    TimeStruct, UnboundRelationshipStruct,
};
use crate::bolt::packstream::{PackStruct, PackValue};

use super::error::{Error, Result};

/// Days between 0001-01-01 (CE) and 1970-01-01.
const EPOCH_CE_DAYS: i64 = 719_163;

/// A value read from or written to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
    UnboundRelationship(UnboundRelationship),
    Path(Path),
    Point(Point),
    Date(NaiveDate),
    Time(OffsetTime),
    LocalTime(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    ZonedDateTime(ZonedDateTime),
    LocalDateTime(NaiveDateTime),
    Duration(Duration),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::UnboundRelationship(_) => "UnboundRelationship",
            Value::Path(_) => "Path",
            Value::Point(_) => "Point",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::LocalTime(_) => "LocalTime",
            Value::DateTime(_) => "DateTime",
            Value::ZonedDateTime(_) => "ZonedDateTime",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Duration(_) => "Duration",
        }
    }

    /// Decode a wire value. A struct with an unknown tag or a field
    /// count that disagrees with the tag's arity is a protocol error.
    pub fn from_wire(value: PackValue) -> Result<Value> {
        Ok(match value {
            PackValue::Null => Value::Null,
            PackValue::Boolean(b) => Value::Boolean(b),
            PackValue::Integer(i) => Value::Integer(i),
            PackValue::Float(f) => Value::Float(f),
            PackValue::String(s) => Value::String(s),
            PackValue::Bytes(b) => Value::Bytes(b),
            PackValue::List(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::from_wire)
                    .collect::<Result<Vec<_>>>()?,
            ),
            PackValue::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Value::from_wire(v)?)))
                    .collect::<Result<HashMap<_, _>>>()?,
            ),
            PackValue::Struct(s) => Value::from_struct(&s)?,
        })
    }

    fn from_struct(s: &PackStruct) -> Result<Value> {
        let decoded = registry::decode_struct(s).map_err(|e| Error::protocol(e.to_string()))?;
        Ok(match decoded {
            StructValue::Node(n) => Value::Node(Node::from_wire(n)?),
            StructValue::Relationship(r) => Value::Relationship(Relationship::from_wire(r)?),
            StructValue::UnboundRelationship(r) => {
                Value::UnboundRelationship(UnboundRelationship::from_wire(r)?)
            }
            StructValue::Path(p) => Value::Path(Path::from_wire(p)?),
            StructValue::Point2d(p) => Value::Point(Point::new_2d(p.srid, p.x, p.y)),
            StructValue::Point3d(p) => Value::Point(Point::new_3d(p.srid, p.x, p.y, p.z)),
            StructValue::Date(d) => Value::Date(date_from_wire(d)?),
            StructValue::Time(t) => Value::Time(OffsetTime::from_wire(t)?),
            StructValue::LocalTime(t) => Value::LocalTime(local_time_from_wire(t.nanos_of_day)?),
            StructValue::DateTime(dt) => Value::DateTime(datetime_from_wire(dt)?),
            StructValue::DateTimeZoned(dt) => Value::ZonedDateTime(ZonedDateTime {
                epoch_seconds: dt.epoch_seconds,
                nanos: dt.nanos,
                zone_id: dt.zone_id,
            }),
            StructValue::LocalDateTime(dt) => {
                Value::LocalDateTime(local_datetime_from_wire(dt.epoch_seconds, dt.nanos)?)
            }
            StructValue::Duration(d) => Value::Duration(Duration {
                months: d.months,
                days: d.days,
                seconds: d.seconds,
                nanos: d.nanos,
            }),
        })
    }

    /// Encode for the wire.
    pub fn to_wire(&self) -> PackValue {
        match self {
            Value::Null => PackValue::Null,
            Value::Boolean(b) => PackValue::Boolean(*b),
            Value::Integer(i) => PackValue::Integer(*i),
            Value::Float(f) => PackValue::Float(*f),
            Value::String(s) => PackValue::String(s.clone()),
            Value::Bytes(b) => PackValue::Bytes(b.clone()),
            Value::List(items) => PackValue::List(items.iter().map(Value::to_wire).collect()),
            Value::Map(map) => PackValue::Map(
                map.iter().map(|(k, v)| (k.clone(), v.to_wire())).collect(),
            ),
            Value::Node(n) => struct_value(StructValue::Node(n.to_wire())),
            Value::Relationship(r) => struct_value(StructValue::Relationship(r.to_wire())),
            Value::UnboundRelationship(r) => {
                struct_value(StructValue::UnboundRelationship(r.to_wire()))
            }
            Value::Path(p) => struct_value(StructValue::Path(p.to_wire())),
            Value::Point(p) => struct_value(match p.z {
                Some(z) => StructValue::Point3d(Point3dStruct { srid: p.srid, x: p.x, y: p.y, z }),
                None => StructValue::Point2d(Point2dStruct { srid: p.srid, x: p.x, y: p.y }),
            }),
            Value::Date(d) => struct_value(StructValue::Date(DateStruct {
                epoch_days: i64::from(chrono::Datelike::num_days_from_ce(d)) - EPOCH_CE_DAYS,
            })),
            Value::Time(t) => struct_value(StructValue::Time(t.to_wire())),
            Value::LocalTime(t) => struct_value(StructValue::LocalTime(LocalTimeStruct {
                nanos_of_day: nanos_of_day(t),
            })),
            Value::DateTime(dt) => struct_value(StructValue::DateTime(DateTimeStruct {
                epoch_seconds: dt.timestamp(),
                nanos: i64::from(dt.timestamp_subsec_nanos()),
                offset_seconds: i64::from(dt.offset().local_minus_utc()),
            })),
            Value::ZonedDateTime(dt) => struct_value(StructValue::DateTimeZoned(
                DateTimeZonedStruct {
                    epoch_seconds: dt.epoch_seconds,
                    nanos: dt.nanos,
                    zone_id: dt.zone_id.clone(),
                },
            )),
            Value::LocalDateTime(dt) => {
                struct_value(StructValue::LocalDateTime(LocalDateTimeStruct {
                    epoch_seconds: dt.and_utc().timestamp(),
                    nanos: i64::from(dt.and_utc().timestamp_subsec_nanos()),
                }))
            }
            Value::Duration(d) => struct_value(StructValue::Duration(DurationStruct::new(
                d.months, d.days, d.seconds, d.nanos,
            ))),
        }
    }
}

fn struct_value(value: StructValue) -> PackValue {
    PackValue::Struct(registry::encode_struct(&value))
}

fn wire_map_to_values(map: HashMap<String, PackValue>) -> Result<HashMap<String, Value>> {
    map.into_iter()
        .map(|(k, v)| Ok((k, Value::from_wire(v)?)))
        .collect()
}

fn values_to_wire_map(map: &HashMap<String, Value>) -> HashMap<String, PackValue> {
    map.iter().map(|(k, v)| (k.clone(), v.to_wire())).collect()
}

fn date_from_wire(d: DateStruct) -> Result<NaiveDate> {
    let ce_days = d
        .epoch_days
        .checked_add(EPOCH_CE_DAYS)
        .and_then(|days| i32::try_from(days).ok())
        .ok_or_else(|| Error::protocol(format!("date out of range: {} days", d.epoch_days)))?;
    NaiveDate::from_num_days_from_ce_opt(ce_days)
        .ok_or_else(|| Error::protocol(format!("date out of range: {} days", d.epoch_days)))
}

fn local_time_from_wire(nanos_of_day: i64) -> Result<NaiveTime> {
    if nanos_of_day < 0 {
        return Err(Error::protocol(format!("negative time of day: {}", nanos_of_day)));
    }
    let secs = (nanos_of_day / 1_000_000_000) as u32;
    let nanos = (nanos_of_day % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| Error::protocol(format!("time of day out of range: {}", nanos_of_day)))
}

fn nanos_of_day(t: &NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) * 1_000_000_000 + i64::from(t.nanosecond())
}

fn local_datetime_from_wire(epoch_seconds: i64, nanos: i64) -> Result<NaiveDateTime> {
    let nanos = u32::try_from(nanos)
        .map_err(|_| Error::protocol(format!("nanoseconds out of range: {}", nanos)))?;
    DateTime::from_timestamp(epoch_seconds, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| Error::protocol(format!("timestamp out of range: {}", epoch_seconds)))
}

fn datetime_from_wire(dt: DateTimeStruct) -> Result<DateTime<FixedOffset>> {
    let offset = i32::try_from(dt.offset_seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| Error::protocol(format!("offset out of range: {}", dt.offset_seconds)))?;
    let nanos = u32::try_from(dt.nanos)
        .map_err(|_| Error::protocol(format!("nanoseconds out of range: {}", dt.nanos)))?;
    DateTime::from_timestamp(dt.epoch_seconds, nanos)
        .map(|utc| utc.with_timezone(&offset))
        .ok_or_else(|| Error::protocol(format!("timestamp out of range: {}", dt.epoch_seconds)))
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    fn from_wire(n: NodeStruct) -> Result<Self> {
        Ok(Self {
            id: n.id,
            labels: n.labels,
            properties: wire_map_to_values(n.properties)?,
        })
    }

    fn to_wire(&self) -> NodeStruct {
        NodeStruct::new(self.id, self.labels.clone(), values_to_wire_map(&self.properties))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            write!(f, "({})", self.id)
        } else {
            write!(f, "({}:{})", self.id, self.labels.join(":"))
        }
    }
}

/// A relationship bound to its endpoint nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl Relationship {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    fn from_wire(r: RelationshipStruct) -> Result<Self> {
        Ok(Self {
            id: r.id,
            start_node_id: r.start_node_id,
            end_node_id: r.end_node_id,
            rel_type: r.rel_type,
            properties: wire_map_to_values(r.properties)?,
        })
    }

    fn to_wire(&self) -> RelationshipStruct {
        RelationshipStruct::new(
            self.id,
            self.start_node_id,
            self.end_node_id,
            self.rel_type.clone(),
            values_to_wire_map(&self.properties),
        )
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[{}:{}]->({})",
            self.start_node_id, self.id, self.rel_type, self.end_node_id
        )
    }
}

/// A relationship as it appears inside a path, without endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnboundRelationship {
    pub id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl UnboundRelationship {
    fn from_wire(r: UnboundRelationshipStruct) -> Result<Self> {
        Ok(Self {
            id: r.id,
            rel_type: r.rel_type,
            properties: wire_map_to_values(r.properties)?,
        })
    }

    fn to_wire(&self) -> UnboundRelationshipStruct {
        UnboundRelationshipStruct::new(self.id, self.rel_type.clone(), values_to_wire_map(&self.properties))
    }
}

/// An alternating sequence of nodes and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<UnboundRelationship>,
    pub indices: Vec<i64>,
}

impl Path {
    /// Number of relationships in the path.
    pub fn len(&self) -> usize {
        self.indices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn from_wire(p: PathStruct) -> Result<Self> {
        Ok(Self {
            nodes: p.nodes.into_iter().map(Node::from_wire).collect::<Result<Vec<_>>>()?,
            relationships: p
                .relationships
                .into_iter()
                .map(UnboundRelationship::from_wire)
                .collect::<Result<Vec<_>>>()?,
            indices: p.indices,
        })
    }

    fn to_wire(&self) -> PathStruct {
        PathStruct {
            nodes: self.nodes.iter().map(Node::to_wire).collect(),
            relationships: self.relationships.iter().map(UnboundRelationship::to_wire).collect(),
            indices: self.indices.clone(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<path: {} nodes, {} relationships>", self.nodes.len(), self.relationships.len())
    }
}

/// A 2D or 3D spatial point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Point {
    pub fn new_2d(srid: i64, x: f64, y: f64) -> Self {
        Self { srid, x, y, z: None }
    }

    pub fn new_3d(srid: i64, x: f64, y: f64, z: f64) -> Self {
        Self { srid, x, y, z: Some(z) }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "point(srid={}, {}, {}, {})", self.srid, self.x, self.y, z),
            None => write!(f, "point(srid={}, {}, {})", self.srid, self.x, self.y),
        }
    }
}

/// Time of day with a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTime {
    pub time: NaiveTime,
    pub offset_seconds: i32,
}

impl OffsetTime {
    fn from_wire(t: TimeStruct) -> Result<Self> {
        Ok(Self {
            time: local_time_from_wire(t.nanos_of_day)?,
            offset_seconds: i32::try_from(t.offset_seconds)
                .map_err(|_| Error::protocol(format!("offset out of range: {}", t.offset_seconds)))?,
        })
    }

    fn to_wire(&self) -> TimeStruct {
        TimeStruct {
            nanos_of_day: nanos_of_day(&self.time),
            offset_seconds: i64::from(self.offset_seconds),
        }
    }
}

/// A point in time pinned to a named time zone. The zone id is kept
/// opaque; resolving it needs a tz database the driver does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonedDateTime {
    pub epoch_seconds: i64,
    pub nanos: i64,
    pub zone_id: String,
}

/// A calendar-aware duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanos: i64,
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}M{}DT{}.{:09}S",
            self.months, self.days, self.seconds, self.nanos
        )
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(value) => value.into(),
            None => Value::Null,
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_int()
            .ok_or_else(|| Error::client(format!("expected Integer, got {}", value.type_name())))
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::client(format!("expected String, got {}", other.type_name()))),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| Error::client(format!("expected Boolean, got {}", value.type_name())))
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_float()
            .ok_or_else(|| Error::client(format!("expected Float, got {}", value.type_name())))
    }
}
