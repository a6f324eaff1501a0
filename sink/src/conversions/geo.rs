//! Geometry encodings: well-known text, GeoJSON and well-known binary.

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde_json::{Value, json};

use crate::{bail, sink_error};
use crate::conversions::binary::parse_binary;
use crate::error::{ErrorKind, SinkResult};
use crate::types::{LineString, Point, Polygon};

const WKB_POINT: u32 = 1;
const WKB_LINE_STRING: u32 = 2;
const WKB_POLYGON: u32 = 3;

/// Any of the supported geometry kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    pub fn to_wkt(&self) -> String {
        match self {
            Geometry::Point(point) => point.to_string(),
            Geometry::LineString(line) => line.to_string(),
            Geometry::Polygon(polygon) => polygon.to_string(),
        }
    }

    pub fn to_geojson(&self) -> Value {
        fn coordinates(points: &[Point]) -> Value {
            Value::Array(points.iter().map(|point| json!([point.x, point.y])).collect())
        }

        let coordinates = match self {
            Geometry::Point(point) => json!([point.x, point.y]),
            Geometry::LineString(line) => coordinates(&line.points),
            Geometry::Polygon(polygon) => {
                Value::Array(polygon.rings.iter().map(|ring| coordinates(ring)).collect())
            }
        };

        json!({ "type": self.kind(), "coordinates": coordinates })
    }

    /// Encodes the geometry as little-endian well-known binary.
    pub fn to_wkb(&self) -> Vec<u8> {
        fn write_points(buffer: &mut Vec<u8>, points: &[Point]) {
            let _ = buffer.write_u32::<LittleEndian>(points.len() as u32);
            for point in points {
                let _ = buffer.write_f64::<LittleEndian>(point.x);
                let _ = buffer.write_f64::<LittleEndian>(point.y);
            }
        }

        // Writes into a `Vec` cannot fail.
        let mut buffer = vec![1u8];
        match self {
            Geometry::Point(point) => {
                let _ = buffer.write_u32::<LittleEndian>(WKB_POINT);
                let _ = buffer.write_f64::<LittleEndian>(point.x);
                let _ = buffer.write_f64::<LittleEndian>(point.y);
            }
            Geometry::LineString(line) => {
                let _ = buffer.write_u32::<LittleEndian>(WKB_LINE_STRING);
                write_points(&mut buffer, &line.points);
            }
            Geometry::Polygon(polygon) => {
                let _ = buffer.write_u32::<LittleEndian>(WKB_POLYGON);
                let _ = buffer.write_u32::<LittleEndian>(polygon.rings.len() as u32);
                for ring in &polygon.rings {
                    write_points(&mut buffer, ring);
                }
            }
        }
        buffer
    }
}

/// Parses a geometry from text in any supported encoding.
///
/// Text starting with `{` is GeoJSON, text starting with a letter is WKT, and anything else is
/// WKB in hex (`0x` prefix) or base64. Surrounding quotes and whitespace are ignored.
pub fn parse_geometry(text: &str) -> SinkResult<Geometry> {
    let trimmed = text.trim().trim_matches(|ch: char| ch == '\'' || ch == '"').trim();

    if trimmed.starts_with('{') {
        let document: Value = serde_json::from_str(trimmed)?;
        parse_geojson(&document)
    } else if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        parse_wkb(&parse_binary(trimmed)?)
    } else if trimmed.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        match parse_wkt(trimmed) {
            Ok(geometry) => Ok(geometry),
            Err(err) => match parse_binary(trimmed) {
                Ok(bytes) => parse_wkb(&bytes).map_err(|_| err),
                Err(_) => Err(err),
            },
        }
    } else {
        parse_wkb(&parse_binary(trimmed)?)
    }
}

/// Parses well-known text, ignoring case.
pub fn parse_wkt(text: &str) -> SinkResult<Geometry> {
    let upper = text.trim().to_uppercase();
    let Some(open) = upper.find('(') else {
        bail!(
            ErrorKind::InvalidData,
            "Invalid well-known text",
            format!("`{text}` has no coordinates")
        );
    };

    let tag = upper[..open].trim();
    let body = upper[open..].trim();
    let Some(inner) = body.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) else {
        bail!(
            ErrorKind::InvalidData,
            "Invalid well-known text",
            format!("`{text}` has unbalanced parentheses")
        );
    };

    match tag {
        "POINT" => Ok(Geometry::Point(parse_wkt_point(inner)?)),
        "LINESTRING" => Ok(Geometry::LineString(LineString {
            points: parse_wkt_points(inner)?,
        })),
        "POLYGON" => {
            let rings = split_rings(inner)?
                .into_iter()
                .map(parse_wkt_points)
                .collect::<SinkResult<Vec<_>>>()?;
            Ok(Geometry::Polygon(Polygon { rings }))
        }
        other => bail!(
            ErrorKind::InvalidData,
            "Unsupported geometry type",
            format!("`{other}` is not POINT, LINESTRING or POLYGON")
        ),
    }
}

fn parse_wkt_point(text: &str) -> SinkResult<Point> {
    let coordinates = text.split_whitespace().collect::<Vec<_>>();
    let [x, y] = coordinates.as_slice() else {
        bail!(
            ErrorKind::InvalidData,
            "Invalid well-known text",
            format!("`{text}` is not an `x y` coordinate pair")
        );
    };

    Ok(Point::new(x.parse()?, y.parse()?))
}

fn parse_wkt_points(text: &str) -> SinkResult<Vec<Point>> {
    text.split(',').map(parse_wkt_point).collect()
}

/// Splits `(a, b), (c, d)` into `a, b` and `c, d`.
fn split_rings(text: &str) -> SinkResult<Vec<&str>> {
    let mut rings = Vec::new();
    let mut start = None;

    for (index, ch) in text.char_indices() {
        match (ch, start) {
            ('(', None) => start = Some(index + 1),
            (')', Some(begin)) => {
                rings.push(&text[begin..index]);
                start = None;
            }
            ('(', Some(_)) | (')', None) => bail!(
                ErrorKind::InvalidData,
                "Invalid well-known text",
                format!("`{text}` has unbalanced ring parentheses")
            ),
            _ => {}
        }
    }

    if start.is_some() || rings.is_empty() {
        bail!(
            ErrorKind::InvalidData,
            "Invalid well-known text",
            format!("`{text}` has no complete ring")
        );
    }

    Ok(rings)
}

/// Parses a GeoJSON geometry object.
pub fn parse_geojson(document: &Value) -> SinkResult<Geometry> {
    let kind = document.get("type").and_then(Value::as_str);
    let coordinates = document.get("coordinates");

    let (Some(kind), Some(coordinates)) = (kind, coordinates) else {
        bail!(
            ErrorKind::InvalidData,
            "Invalid GeoJSON geometry",
            "`type` and `coordinates` are required"
        );
    };

    match kind {
        "Point" => Ok(Geometry::Point(geojson_point(coordinates)?)),
        "LineString" => Ok(Geometry::LineString(LineString {
            points: geojson_points(coordinates)?,
        })),
        "Polygon" => {
            let Some(rings) = coordinates.as_array() else {
                bail!(
                    ErrorKind::InvalidData,
                    "Invalid GeoJSON geometry",
                    "polygon coordinates must be an array of rings"
                );
            };
            let rings = rings
                .iter()
                .map(geojson_points)
                .collect::<SinkResult<Vec<_>>>()?;
            Ok(Geometry::Polygon(Polygon { rings }))
        }
        other => bail!(
            ErrorKind::InvalidData,
            "Unsupported geometry type",
            format!("`{other}` is not Point, LineString or Polygon")
        ),
    }
}

fn geojson_point(value: &Value) -> SinkResult<Point> {
    let coordinates = value.as_array().map(|array| {
        array
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<_>>>()
    });

    match coordinates {
        Some(Some(coordinates)) if coordinates.len() >= 2 => {
            Ok(Point::new(coordinates[0], coordinates[1]))
        }
        _ => bail!(
            ErrorKind::InvalidData,
            "Invalid GeoJSON geometry",
            format!("{value} is not a coordinate pair")
        ),
    }
}

fn geojson_points(value: &Value) -> SinkResult<Vec<Point>> {
    match value.as_array() {
        Some(points) => points.iter().map(geojson_point).collect(),
        None => bail!(
            ErrorKind::InvalidData,
            "Invalid GeoJSON geometry",
            format!("{value} is not an array of coordinate pairs")
        ),
    }
}

/// Parses well-known binary in either byte order.
pub fn parse_wkb(bytes: &[u8]) -> SinkResult<Geometry> {
    decode_wkb(bytes).map_err(|err| {
        if err.kind() == ErrorKind::IoError {
            sink_error!(
                ErrorKind::InvalidData,
                "Invalid well-known binary",
                format!("input ends after {} bytes", bytes.len())
            )
        } else {
            err
        }
    })
}

fn decode_wkb(bytes: &[u8]) -> SinkResult<Geometry> {
    let mut cursor = Cursor::new(bytes);
    match cursor.read_u8()? {
        0 => read_wkb::<BigEndian>(&mut cursor),
        1 => read_wkb::<LittleEndian>(&mut cursor),
        other => bail!(
            ErrorKind::InvalidData,
            "Invalid well-known binary",
            format!("unknown byte order marker {other}")
        ),
    }
}

fn read_wkb<B: byteorder::ByteOrder>(cursor: &mut Cursor<&[u8]>) -> SinkResult<Geometry> {
    fn read_point<B: byteorder::ByteOrder>(cursor: &mut Cursor<&[u8]>) -> SinkResult<Point> {
        Ok(Point::new(cursor.read_f64::<B>()?, cursor.read_f64::<B>()?))
    }

    fn read_points<B: byteorder::ByteOrder>(cursor: &mut Cursor<&[u8]>) -> SinkResult<Vec<Point>> {
        let count = cursor.read_u32::<B>()? as usize;
        let remaining = cursor.get_ref().len() - cursor.position() as usize;
        if count > remaining / 16 {
            bail!(
                ErrorKind::InvalidData,
                "Invalid well-known binary",
                format!("{count} points declared but only {remaining} bytes left")
            );
        }
        (0..count).map(|_| read_point::<B>(cursor)).collect()
    }

    let geometry = match cursor.read_u32::<B>()? {
        WKB_POINT => Geometry::Point(read_point::<B>(cursor)?),
        WKB_LINE_STRING => Geometry::LineString(LineString {
            points: read_points::<B>(cursor)?,
        }),
        WKB_POLYGON => {
            let count = cursor.read_u32::<B>()? as usize;
            let mut rings = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                rings.push(read_points::<B>(cursor)?);
            }
            Geometry::Polygon(Polygon { rings })
        }
        other => bail!(
            ErrorKind::InvalidData,
            "Unsupported geometry type",
            format!("well-known binary type {other} is not supported")
        ),
    };

    Ok(geometry)
}
