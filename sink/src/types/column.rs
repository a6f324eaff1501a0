use std::fmt;

/// Bit width and signedness of a fixed-width integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerType {
    pub bits: u8,
    pub signed: bool,
}

impl IntegerType {
    pub const TINYINT: IntegerType = IntegerType::signed(8);
    pub const SMALLINT: IntegerType = IntegerType::signed(16);
    pub const INT: IntegerType = IntegerType::signed(32);
    pub const BIGINT: IntegerType = IntegerType::signed(64);

    pub const fn signed(bits: u8) -> Self {
        Self { bits, signed: true }
    }

    pub const fn unsigned(bits: u8) -> Self {
        Self {
            bits,
            signed: false,
        }
    }

    /// Smallest representable value.
    pub fn min(&self) -> i128 {
        if self.signed {
            -(1i128 << (self.bits - 1))
        } else {
            0
        }
    }

    /// Largest representable value.
    pub fn max(&self) -> i128 {
        if self.signed {
            (1i128 << (self.bits - 1)) - 1
        } else {
            (1i128 << self.bits) - 1
        }
    }

    pub fn contains(&self, value: i128) -> bool {
        value >= self.min() && value <= self.max()
    }
}

impl fmt::Display for IntegerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.bits, self.signed) {
            (8, true) => f.write_str("tinyint"),
            (16, true) => f.write_str("smallint"),
            (32, true) => f.write_str("int"),
            (64, true) => f.write_str("bigint"),
            (bits, true) => write!(f, "int{bits}"),
            (bits, false) => write!(f, "uint{bits}"),
        }
    }
}

/// Native type of a destination column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Integer(IntegerType),
    /// 64-bit counter, only written through increments.
    Counter,
    /// Arbitrary-precision integer.
    VarInt,
    Float,
    Double,
    Decimal,
    Text,
    Ascii,
    Blob,
    Inet,
    /// Days since the epoch.
    Date,
    /// Nanoseconds since midnight.
    Time,
    /// Milliseconds since the epoch.
    Timestamp,
    Uuid,
    /// Version 1 UUID.
    TimeUuid,
    Point,
    LineString,
    Polygon,
    List(Box<ColumnType>),
    Set(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Tuple(Vec<ColumnType>),
    Udt {
        name: String,
        fields: Vec<(String, ColumnType)>,
    },
}

impl ColumnType {
    pub fn list(element: ColumnType) -> Self {
        ColumnType::List(Box::new(element))
    }

    pub fn set(element: ColumnType) -> Self {
        ColumnType::Set(Box::new(element))
    }

    pub fn map(key: ColumnType, value: ColumnType) -> Self {
        ColumnType::Map(Box::new(key), Box::new(value))
    }

    pub fn udt(name: impl Into<String>, fields: Vec<(&str, ColumnType)>) -> Self {
        ColumnType::Udt {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(field, column_type)| (field.to_string(), column_type))
                .collect(),
        }
    }

    /// Returns `true` for collection, tuple and user-defined types.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            ColumnType::List(_)
                | ColumnType::Set(_)
                | ColumnType::Map(_, _)
                | ColumnType::Tuple(_)
                | ColumnType::Udt { .. }
        )
    }

    /// Returns `true` for every type holding a number.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer(_)
                | ColumnType::Counter
                | ColumnType::VarInt
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::Decimal
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::Time | ColumnType::Timestamp
        )
    }

    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            ColumnType::Point | ColumnType::LineString | ColumnType::Polygon
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Ascii)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => f.write_str("boolean"),
            ColumnType::Integer(integer) => integer.fmt(f),
            ColumnType::Counter => f.write_str("counter"),
            ColumnType::VarInt => f.write_str("varint"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Double => f.write_str("double"),
            ColumnType::Decimal => f.write_str("decimal"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Ascii => f.write_str("ascii"),
            ColumnType::Blob => f.write_str("blob"),
            ColumnType::Inet => f.write_str("inet"),
            ColumnType::Date => f.write_str("date"),
            ColumnType::Time => f.write_str("time"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Uuid => f.write_str("uuid"),
            ColumnType::TimeUuid => f.write_str("timeuuid"),
            ColumnType::Point => f.write_str("'PointType'"),
            ColumnType::LineString => f.write_str("'LineStringType'"),
            ColumnType::Polygon => f.write_str("'PolygonType'"),
            ColumnType::List(element) => write!(f, "list<{element}>"),
            ColumnType::Set(element) => write!(f, "set<{element}>"),
            ColumnType::Map(key, value) => write!(f, "map<{key}, {value}>"),
            ColumnType::Tuple(elements) => {
                f.write_str("tuple<")?;
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    element.fmt(f)?;
                }
                f.write_str(">")
            }
            ColumnType::Udt { name, .. } => write!(f, "frozen<{name}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bounds() {
        assert_eq!(IntegerType::TINYINT.min(), -128);
        assert_eq!(IntegerType::TINYINT.max(), 127);
        assert_eq!(IntegerType::unsigned(16).max(), 65_535);
        assert_eq!(IntegerType::BIGINT.max(), i64::MAX as i128);
        assert!(!IntegerType::TINYINT.contains(128));
        assert!(IntegerType::TINYINT.contains(-128));
    }

    #[test]
    fn display_uses_cql_names() {
        let column_type = ColumnType::map(
            ColumnType::Text,
            ColumnType::list(ColumnType::Integer(IntegerType::INT)),
        );
        assert_eq!(column_type.to_string(), "map<text, list<int>>");
        assert_eq!(
            ColumnType::Tuple(vec![ColumnType::Text, ColumnType::Timestamp]).to_string(),
            "tuple<text, timestamp>"
        );
    }
}
