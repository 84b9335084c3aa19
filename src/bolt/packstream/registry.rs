//! Struct handler registry.
//!
//! Bidirectional mapping between struct tag bytes and the typed
//! payloads of the graph data model: the read path resolves by tag, the
//! write path by value kind. Every handler declares a fixed field
//! count; a wire struct whose field count disagrees with its tag's
//! declared arity is a decode error, raised before the surrounding
//! message is acted on.
//!
//! An unknown tag on decode is a protocol error and fatal to the
//! connection. An unknown kind on encode cannot occur: [`StructValue`]
//! is exhaustive.

use super::structures::{
    DateStruct, DateTimeStruct, DateTimeZonedStruct, DurationStruct, LocalDateTimeStruct,
    LocalTimeStruct, NodeStruct, PathStruct, Point2dStruct, Point3dStruct, RelationshipStruct,
    TimeStruct, UnboundRelationshipStruct,
};
use super::types::PackStruct;
use super::PackError;

/// Struct tag bytes of the graph data model.
pub mod tag {
    pub const NODE: u8 = 0x4E; // 'N'
    pub const RELATIONSHIP: u8 = 0x52; // 'R'
    pub const UNBOUND_RELATIONSHIP: u8 = 0x72; // 'r'
    pub const PATH: u8 = 0x50; // 'P'
    pub const POINT_2D: u8 = 0x58; // 'X'
    pub const POINT_3D: u8 = 0x59; // 'Y'
    pub const DATE: u8 = 0x44; // 'D'
    pub const TIME: u8 = 0x54; // 'T'
    pub const LOCAL_TIME: u8 = 0x74; // 't'
    pub const DATE_TIME: u8 = 0x46; // 'F', offset-based
    pub const DATE_TIME_ZONED: u8 = 0x66; // 'f', zone-id-based
    pub const LOCAL_DATE_TIME: u8 = 0x64; // 'd'
    pub const DURATION: u8 = 0x45; // 'E'
}

/// A decoded domain struct, one variant per registered tag.
#[derive(Debug, Clone, PartialEq)]
pub enum StructValue {
    Node(NodeStruct),
    Relationship(RelationshipStruct),
    UnboundRelationship(UnboundRelationshipStruct),
    Path(PathStruct),
    Point2d(Point2dStruct),
    Point3d(Point3dStruct),
    Date(DateStruct),
    Time(TimeStruct),
    LocalTime(LocalTimeStruct),
    DateTime(DateTimeStruct),
    DateTimeZoned(DateTimeZonedStruct),
    LocalDateTime(LocalDateTimeStruct),
    Duration(DurationStruct),
}

/// One entry of the registry: tag, declared arity, and the field codec.
pub struct StructHandler {
    pub tag: u8,
    pub name: &'static str,
    pub arity: usize,
    decode: fn(&PackStruct) -> Result<StructValue, PackError>,
}

macro_rules! handler {
    ($tag:expr, $name:literal, $arity:expr, $ty:ident, $variant:ident) => {
        StructHandler {
            tag: $tag,
            name: $name,
            arity: $arity,
            decode: |s| Ok(StructValue::$variant($ty::from_fields(&s.fields)?)),
        }
    };
}

static HANDLERS: &[StructHandler] = &[
    handler!(tag::NODE, "Node", 3, NodeStruct, Node),
    handler!(tag::RELATIONSHIP, "Relationship", 5, RelationshipStruct, Relationship),
    handler!(
        tag::UNBOUND_RELATIONSHIP,
        "UnboundRelationship",
        3,
        UnboundRelationshipStruct,
        UnboundRelationship
    ),
    handler!(tag::PATH, "Path", 3, PathStruct, Path),
    handler!(tag::POINT_2D, "Point2D", 3, Point2dStruct, Point2d),
    handler!(tag::POINT_3D, "Point3D", 4, Point3dStruct, Point3d),
    handler!(tag::DATE, "Date", 1, DateStruct, Date),
    handler!(tag::TIME, "Time", 2, TimeStruct, Time),
    handler!(tag::LOCAL_TIME, "LocalTime", 1, LocalTimeStruct, LocalTime),
    handler!(tag::DATE_TIME, "DateTime", 3, DateTimeStruct, DateTime),
    handler!(tag::DATE_TIME_ZONED, "DateTimeZoned", 3, DateTimeZonedStruct, DateTimeZoned),
    handler!(tag::LOCAL_DATE_TIME, "LocalDateTime", 2, LocalDateTimeStruct, LocalDateTime),
    handler!(tag::DURATION, "Duration", 4, DurationStruct, Duration),
];

/// Resolve a handler by tag byte (read path).
pub fn handler_for_tag(tag: u8) -> Option<&'static StructHandler> {
    HANDLERS.iter().find(|h| h.tag == tag)
}

/// Resolve a handler by decoded value kind (write path).
pub fn handler_for_value(value: &StructValue) -> &'static StructHandler {
    let tag = match value {
        StructValue::Node(_) => tag::NODE,
        StructValue::Relationship(_) => tag::RELATIONSHIP,
        StructValue::UnboundRelationship(_) => tag::UNBOUND_RELATIONSHIP,
        StructValue::Path(_) => tag::PATH,
        StructValue::Point2d(_) => tag::POINT_2D,
        StructValue::Point3d(_) => tag::POINT_3D,
        StructValue::Date(_) => tag::DATE,
        StructValue::Time(_) => tag::TIME,
        StructValue::LocalTime(_) => tag::LOCAL_TIME,
        StructValue::DateTime(_) => tag::DATE_TIME,
        StructValue::DateTimeZoned(_) => tag::DATE_TIME_ZONED,
        StructValue::LocalDateTime(_) => tag::LOCAL_DATE_TIME,
        StructValue::Duration(_) => tag::DURATION,
    };
    // Every variant has an entry in HANDLERS.
    handler_for_tag(tag).expect("registry covers all struct kinds")
}

/// Decode a wire struct through the registry, enforcing arity.
pub fn decode_struct(s: &PackStruct) -> Result<StructValue, PackError> {
    let handler = handler_for_tag(s.tag)
        .ok_or_else(|| PackError::InvalidStruct(format!("unknown struct tag 0x{:02X}", s.tag)))?;
    if s.fields.len() != handler.arity {
        return Err(PackError::InvalidStruct(format!(
            "{} expects {} fields, got {}",
            handler.name,
            handler.arity,
            s.fields.len()
        )));
    }
    (handler.decode)(s)
}

/// Encode a domain struct back into its wire form.
pub fn encode_struct(value: &StructValue) -> PackStruct {
    let fields = match value {
        StructValue::Node(v) => v.to_fields(),
        StructValue::Relationship(v) => v.to_fields(),
        StructValue::UnboundRelationship(v) => v.to_fields(),
        StructValue::Path(v) => v.to_fields(),
        StructValue::Point2d(v) => v.to_fields(),
        StructValue::Point3d(v) => v.to_fields(),
        StructValue::Date(v) => v.to_fields(),
        StructValue::Time(v) => v.to_fields(),
        StructValue::LocalTime(v) => v.to_fields(),
        StructValue::DateTime(v) => v.to_fields(),
        StructValue::DateTimeZoned(v) => v.to_fields(),
        StructValue::LocalDateTime(v) => v.to_fields(),
        StructValue::Duration(v) => v.to_fields(),
    };
    PackStruct::new(handler_for_value(value).tag, fields)
}
