use std::fmt;

/// A two-dimensional point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An open or closed sequence of at least two points.
#[derive(Debug, Clone, PartialEq)]
pub struct LineString {
    pub points: Vec<Point>,
}

/// A polygon described by its exterior ring followed by its interior rings.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub rings: Vec<Vec<Point>>,
}

fn write_coordinates(f: &mut fmt::Formatter<'_>, points: &[Point]) -> fmt::Result {
    for (index, point) in points.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{} {}", point.x, point.y)?;
    }
    Ok(())
}

/// Well-known text rendering.
impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT ({} {})", self.x, self.y)
    }
}

/// Well-known text rendering.
impl fmt::Display for LineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LINESTRING (")?;
        write_coordinates(f, &self.points)?;
        f.write_str(")")
    }
}

/// Well-known text rendering.
impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("POLYGON (")?;
        for (index, ring) in self.rings.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str("(")?;
            write_coordinates(f, ring)?;
            f.write_str(")")?;
        }
        f.write_str(")")
    }
}
