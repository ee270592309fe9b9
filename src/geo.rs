//! Spherical measurement, arc interpolation and projection primitives.
//!
//! Every length in the pipeline is a haversine length over WGS84 geometry;
//! lateral work (lane offsets) happens on projected coordinates obtained
//! through a [`Projection`]. The projection is a pluggable provider: the
//! pipeline only requires that it is deterministic. [`WebMercator`] is the
//! default implementation.

use geo::HaversineDistance;
use geo::HaversineIntermediate;
use geo::{Coord, LineString, Point};

/// Distance in meters between two WGS84 points.
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    a.haversine_distance(&b)
}

/// Haversine length in meters of a WGS84 linestring.
pub fn haversine_length(line: &LineString<f64>) -> f64 {
    line.0
        .windows(2)
        .map(|w| Point::from(w[0]).haversine_distance(&Point::from(w[1])))
        .sum()
}

/// Point at `distance` meters along `line`, measured by haversine arc length
/// with great-circle interpolation inside the containing segment. Clamps to
/// the endpoints.
pub fn point_along_line(line: &LineString<f64>, distance: f64) -> Point<f64> {
    let pts = &line.0;
    let first = match pts.first() {
        Some(c) => Point::from(*c),
        None => return Point::new(0.0, 0.0),
    };
    if distance <= 0.0 {
        return first;
    }
    let mut travelled = 0.0;
    for w in pts.windows(2) {
        let a = Point::from(w[0]);
        let b = Point::from(w[1]);
        let seg = a.haversine_distance(&b);
        if seg > 0.0 && travelled + seg >= distance {
            let fraction = (distance - travelled) / seg;
            return a.haversine_intermediate(&b, fraction);
        }
        travelled += seg;
    }
    match pts.last() {
        Some(c) => Point::from(*c),
        None => first,
    }
}

/// Arc-length midpoint of a linestring.
///
/// Returns the index of the vertex that starts the segment containing the
/// midpoint, plus the interpolated midpoint itself. The caller composes
/// half-geometries as `[mid] ++ line[idx+1..]` and `line[..=idx] ++ [mid]`.
pub fn arc_midpoint(line: &LineString<f64>) -> (usize, Point<f64>) {
    let pts = &line.0;
    if pts.len() < 2 {
        let p = pts.first().copied().unwrap_or(Coord { x: 0.0, y: 0.0 });
        return (0, Point::from(p));
    }
    let half = haversine_length(line) / 2.0;
    let mut travelled = 0.0;
    for (idx, w) in pts.windows(2).enumerate() {
        let a = Point::from(w[0]);
        let b = Point::from(w[1]);
        let seg = a.haversine_distance(&b);
        if seg > 0.0 && travelled + seg >= half {
            let fraction = (half - travelled) / seg;
            return (idx, a.haversine_intermediate(&b, fraction));
        }
        travelled += seg;
    }
    (pts.len() - 2, Point::from(pts[pts.len() - 1]))
}

/// Sub-linestring between two arc-length positions (meters) along `line`.
///
/// Interior vertices strictly inside the window are preserved; both cut
/// points are interpolated. `from` and `to` are clamped to `[0, length]`.
pub fn line_substring(line: &LineString<f64>, from: f64, to: f64) -> LineString<f64> {
    let start = point_along_line(line, from);
    let end = point_along_line(line, to);
    let mut coords: Vec<Coord<f64>> = vec![start.0];

    let mut travelled = 0.0;
    for w in line.0.windows(2) {
        let a = Point::from(w[0]);
        let b = Point::from(w[1]);
        travelled += a.haversine_distance(&b);
        if travelled > from && travelled < to {
            coords.push(w[1]);
        }
    }
    if coords.last() != Some(&end.0) {
        coords.push(end.0);
    }
    if coords.len() < 2 {
        coords.push(end.0);
    }
    LineString::new(coords)
}

/// Reversed copy of a linestring.
pub fn reverse_line(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    coords.reverse();
    LineString::new(coords)
}

/// Parallel offset of a projected (Euclidean) linestring.
///
/// Positive `offset` shifts to the left of the travel direction, negative to
/// the right. Vertex count is preserved: each vertex moves along the
/// normalized average of its adjacent segment normals.
pub fn offset_curve(line: &LineString<f64>, offset: f64) -> LineString<f64> {
    let pts = &line.0;
    if pts.len() < 2 || offset == 0.0 {
        return line.clone();
    }

    // Unit left normals per segment.
    let mut normals: Vec<(f64, f64)> = Vec::with_capacity(pts.len() - 1);
    for w in pts.windows(2) {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        let len = (dx * dx + dy * dy).sqrt();
        if len > 0.0 {
            normals.push((-dy / len, dx / len));
        } else {
            normals.push((0.0, 0.0));
        }
    }

    let mut out: Vec<Coord<f64>> = Vec::with_capacity(pts.len());
    for i in 0..pts.len() {
        let (nx, ny) = if i == 0 {
            normals[0]
        } else if i == pts.len() - 1 {
            normals[i - 1]
        } else {
            let (ax, ay) = normals[i - 1];
            let (bx, by) = normals[i];
            let sx = ax + bx;
            let sy = ay + by;
            let len = (sx * sx + sy * sy).sqrt();
            if len > 1e-12 {
                (sx / len, sy / len)
            } else {
                normals[i - 1]
            }
        };
        out.push(Coord {
            x: pts[i].x + nx * offset,
            y: pts[i].y + ny * offset,
        });
    }
    LineString::new(out)
}

/// Spherical↔Euclidean conversion provider.
///
/// Implementations must be deterministic: the pipeline's reproducibility
/// guarantee extends only as far as the projection's. `Sync` because lane
/// geometry sampling fans out across macroscopic links.
pub trait Projection: Sync {
    fn to_euclidean(&self, point: Point<f64>) -> Point<f64>;
    fn to_spherical(&self, point: Point<f64>) -> Point<f64>;

    fn line_to_euclidean(&self, line: &LineString<f64>) -> LineString<f64> {
        LineString::new(
            line.0
                .iter()
                .map(|c| self.to_euclidean(Point::from(*c)).0)
                .collect(),
        )
    }

    fn line_to_spherical(&self, line: &LineString<f64>) -> LineString<f64> {
        LineString::new(
            line.0
                .iter()
                .map(|c| self.to_spherical(Point::from(*c)).0)
                .collect(),
        )
    }
}

const WGS84_EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// Spherical Web-Mercator projection, the default [`Projection`] provider.
///
/// Meters are true at the equator only, which is fine for the lateral
/// offsets this pipeline needs (meter-scale, locally consistent).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn to_euclidean(&self, point: Point<f64>) -> Point<f64> {
        let x = WGS84_EQUATORIAL_RADIUS_M * point.x().to_radians();
        let y = WGS84_EQUATORIAL_RADIUS_M
            * (std::f64::consts::FRAC_PI_4 + point.y().to_radians() / 2.0)
                .tan()
                .ln();
        Point::new(x, y)
    }

    fn to_spherical(&self, point: Point<f64>) -> Point<f64> {
        let lon = (point.x() / WGS84_EQUATORIAL_RADIUS_M).to_degrees();
        let lat = (point.y() / WGS84_EQUATORIAL_RADIUS_M)
            .sinh()
            .atan()
            .to_degrees();
        Point::new(lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::new(coords.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    #[test]
    fn haversine_length_of_one_longitude_degree() {
        let l = line(&[(0.0, 0.0), (1.0, 0.0)]);
        let len = haversine_length(&l);
        assert!((len - 111_195.0).abs() < 100.0, "got {len}");
    }

    #[test]
    fn midpoint_of_two_segment_line() {
        // 0.001° ≈ 111.2 m, so the midpoint sits inside the first segment
        // when that segment is the longer one.
        let l = line(&[(0.0, 0.0), (0.002, 0.0), (0.003, 0.0)]);
        let (idx, mid) = arc_midpoint(&l);
        assert_eq!(idx, 0);
        assert!((mid.x() - 0.0015).abs() < 1e-6);
    }

    #[test]
    fn point_along_line_clamps() {
        let l = line(&[(0.0, 0.0), (0.001, 0.0)]);
        let before = point_along_line(&l, -5.0);
        let after = point_along_line(&l, 1e9);
        assert_eq!(before.x(), 0.0);
        assert!((after.x() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn substring_preserves_interior_vertices() {
        let l = line(&[(0.0, 0.0), (0.001, 0.0), (0.002, 0.0)]);
        let total = haversine_length(&l);
        let sub = line_substring(&l, total * 0.25, total * 0.75);
        assert!(sub.0.len() >= 3);
        let sub_len = haversine_length(&sub);
        assert!((sub_len - total / 2.0).abs() < 0.01);
    }

    #[test]
    fn offset_curve_shifts_left() {
        // East-bound line in projected meters; left is +y.
        let l = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let shifted = offset_curve(&l, 2.0);
        assert_eq!(shifted.0.len(), 2);
        assert!((shifted.0[0].y - 2.0).abs() < 1e-9);
        assert!((shifted.0[1].y - 2.0).abs() < 1e-9);
        let right = offset_curve(&l, -2.0);
        assert!((right.0[0].y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn web_mercator_roundtrip() {
        let p = Point::new(7.4246, 43.7384);
        let proj = WebMercator;
        let back = proj.to_spherical(proj.to_euclidean(p));
        assert!((back.x() - p.x()).abs() < 1e-9);
        assert!((back.y() - p.y()).abs() < 1e-9);
    }
}
