//! Convex hull extraction: facet outlines and triangulated surface meshes.
//!
//! Outlines are the boundaries of the hull's planar facets (coplanar hull
//! triangles merged into one loop) and are what collision scenes render as
//! wireframes. [`HullExtractor::mesh`] turns any set of planar loops back into
//! a closed, outward-wound triangle mesh with averaged vertex normals.

use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};
use parry3d_f64::transformation::try_convex_hull;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CellviewError, Result};
use crate::pose::Transform;

/// A closed planar loop. The closing segment back to the first point is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HullPolygon {
    pub points: Vec<Point3<f64>>,
}

impl HullPolygon {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Newell normal; its direction follows the winding, its length is twice the area.
    pub fn normal(&self) -> Vector3<f64> {
        let n = self.points.len();
        (0..n).fold(Vector3::zeros(), |acc, i| {
            acc + self.points[i].coords.cross(&self.points[(i + 1) % n].coords)
        })
    }

    pub fn centroid(&self) -> Point3<f64> {
        centroid(&self.points)
    }

    /// The loop as a line strip, first point repeated at the end.
    pub fn closed_strip(&self) -> Vec<Point3<f64>> {
        let mut strip = self.points.clone();
        if let Some(first) = self.points.first() {
            strip.push(*first);
        }
        strip
    }

    /// Applies a rigid transform to every point.
    pub fn transformed(&self, t: &Transform) -> Self {
        Self::new(self.points.iter().map(|p| t.transform_point(p)).collect())
    }
}

/// Transforms a whole outline set.
pub fn transform_polygons(polygons: &[HullPolygon], t: &Transform) -> Vec<HullPolygon> {
    polygons.iter().map(|p| p.transformed(t)).collect()
}

/// Triangle surface with per-vertex normals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HullMesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
    pub normals: Vec<Vector3<f64>>,
}

impl HullMesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn centroid(&self) -> Point3<f64> {
        centroid(&self.vertices)
    }

    /// Unnormalized normal of a triangle, following its vertex order.
    pub fn face_normal(&self, triangle: &[u32; 3]) -> Vector3<f64> {
        let a = self.vertices[triangle[0] as usize];
        let b = self.vertices[triangle[1] as usize];
        let c = self.vertices[triangle[2] as usize];
        (b - a).cross(&(c - a))
    }
}

/// Convex hull outline and surface builder.
#[derive(Debug, Clone, Copy)]
pub struct HullExtractor {
    /// Relative tolerance for coplanarity, collinearity and vertex welding
    tolerance: f64,
}

impl Default for HullExtractor {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

impl HullExtractor {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Facet outlines of the convex hull, or an empty list for degenerate input.
    pub fn outlines(&self, points: &[Point3<f64>]) -> Vec<HullPolygon> {
        match self.try_outlines(points) {
            Ok(polygons) => polygons,
            Err(e) => {
                debug!("Hull outlines skipped: {}", e);
                Vec::new()
            }
        }
    }

    /// Facet outlines of the convex hull.
    ///
    /// Fails with [`CellviewError::DegenerateHull`] when the points do not span
    /// a volume (fewer than 4 points, coincident, collinear or coplanar).
    pub fn try_outlines(&self, points: &[Point3<f64>]) -> Result<Vec<HullPolygon>> {
        let points = self.weld(points)?;
        let eps = self.check_spanning(&points)?;

        let (vertices, triangles) = try_convex_hull(&points)
            .map_err(|e| CellviewError::degenerate(format!("convex hull failed: {:?}", e)))?;
        if triangles.is_empty() {
            return Err(CellviewError::degenerate("convex hull has no faces"));
        }

        let center = centroid(&vertices);
        let mut facets: Vec<Facet> = Vec::new();

        for tri in triangles {
            let a = vertices[tri[0] as usize];
            let b = vertices[tri[1] as usize];
            let c = vertices[tri[2] as usize];

            let raw = (b - a).cross(&(c - a));
            let area2 = raw.norm();
            if area2 <= eps * eps {
                continue;
            }

            // Orient outward so merged loops wind counter-clockwise seen from outside
            let (normal, tri) = if raw.dot(&(a - center)) < 0.0 {
                (-raw / area2, [tri[0], tri[2], tri[1]])
            } else {
                (raw / area2, tri)
            };
            let offset = normal.dot(&a.coords);

            let coplanar = |f: &&mut Facet| {
                1.0 - f.normal.dot(&normal) <= self.tolerance && (f.offset - offset).abs() <= eps
            };
            match facets.iter_mut().find(coplanar) {
                Some(facet) => facet.triangles.push(tri),
                None => facets.push(Facet {
                    normal,
                    offset,
                    triangles: vec![tri],
                }),
            }
        }

        let polygons: Vec<HullPolygon> = facets
            .iter()
            .filter_map(|facet| facet_boundary(&facet.triangles))
            .map(|ids| {
                let loop_points: Vec<Point3<f64>> =
                    ids.iter().map(|&i| vertices[i as usize]).collect();
                HullPolygon::new(self.drop_collinear(loop_points))
            })
            .filter(|p| p.len() >= 3)
            .collect();

        if polygons.is_empty() {
            return Err(CellviewError::degenerate("no facet outlines could be traced"));
        }

        Ok(polygons)
    }

    /// Triangulates planar loops into a closed mesh with outward winding.
    ///
    /// Loops with four or more points are fan-triangulated (they are convex
    /// hull facets). Shared vertices are welded so their normals average the
    /// adjacent faces.
    pub fn mesh(&self, polygons: &[HullPolygon]) -> HullMesh {
        let all_points: Vec<Point3<f64>> =
            polygons.iter().flat_map(|p| p.points.iter().copied()).collect();
        if all_points.is_empty() {
            return HullMesh::default();
        }

        let center = centroid(&all_points);
        let quantum = self.tolerance * extent(&all_points).max(1.0);

        let mut mesh = HullMesh::default();
        let mut welded: HashMap<[i64; 3], u32> = HashMap::new();
        let mut faces: Vec<(Vec<u32>, Vector3<f64>)> = Vec::new();

        for polygon in polygons.iter().filter(|p| p.len() >= 3) {
            let mut normal = polygon.normal();
            let length = normal.norm();
            if length <= f64::EPSILON {
                continue;
            }

            let mut points = polygon.points.clone();
            if normal.dot(&(polygon.centroid() - center)) < 0.0 {
                points.reverse();
                normal = -normal;
            }

            let mut ids: Vec<u32> = Vec::with_capacity(points.len());
            for p in &points {
                let key = quantize(p, quantum);
                let id = *welded.entry(key).or_insert_with(|| {
                    mesh.vertices.push(*p);
                    (mesh.vertices.len() - 1) as u32
                });
                if ids.last() != Some(&id) && ids.first() != Some(&id) {
                    ids.push(id);
                }
            }
            if ids.len() < 3 {
                continue;
            }

            for i in 1..ids.len() - 1 {
                mesh.triangles.push([ids[0], ids[i], ids[i + 1]]);
            }
            faces.push((ids, normal / length));
        }

        mesh.normals = average_normals(
            mesh.vertices.len(),
            faces.iter().map(|(ids, normal)| (ids.as_slice(), *normal)),
        );
        mesh
    }

    /// Removes exact and near duplicates, rejecting non-finite input.
    fn weld(&self, points: &[Point3<f64>]) -> Result<Vec<Point3<f64>>> {
        if points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(CellviewError::degenerate("non-finite point"));
        }

        let quantum = self.tolerance * extent(points).max(1.0);
        let mut seen = HashSet::new();
        Ok(points
            .iter()
            .filter(|p| seen.insert(quantize(p, quantum)))
            .copied()
            .collect())
    }

    /// Checks that the points span a volume; returns the absolute tolerance.
    fn check_spanning(&self, points: &[Point3<f64>]) -> Result<f64> {
        if points.len() < 4 {
            return Err(CellviewError::degenerate(format!(
                "need at least 4 distinct points, got {}",
                points.len()
            )));
        }

        let eps = self.tolerance * extent(points).max(f64::MIN_POSITIVE);
        let p0 = points[0];

        let p1 = farthest(points, |p| (p - p0).norm());
        let axis = p1 - p0;
        if axis.norm() <= eps {
            return Err(CellviewError::degenerate("all points coincide"));
        }
        let axis = axis.normalize();

        let p2 = farthest(points, |p| (p - p0).cross(&axis).norm());
        let normal = (p1 - p0).cross(&(p2 - p0));
        if (p2 - p0).cross(&axis).norm() <= eps {
            return Err(CellviewError::degenerate("points are collinear"));
        }
        let normal = normal.normalize();

        let p3 = farthest(points, |p| normal.dot(&(p - p0)).abs());
        if normal.dot(&(p3 - p0)).abs() <= eps {
            return Err(CellviewError::degenerate("points are coplanar"));
        }

        Ok(eps)
    }

    fn drop_collinear(&self, points: Vec<Point3<f64>>) -> Vec<Point3<f64>> {
        let n = points.len();
        if n <= 3 {
            return points;
        }

        (0..n)
            .filter(|&i| {
                let prev = points[(i + n - 1) % n];
                let next = points[(i + 1) % n];
                let a = points[i] - prev;
                let b = next - points[i];
                a.cross(&b).norm() > self.tolerance * a.norm() * b.norm()
            })
            .map(|i| points[i])
            .collect()
    }
}

/// Unit per-vertex normals, each the average of the unit normals of the
/// faces using that vertex. Vertices on no face get a zero normal.
pub fn average_normals<'a>(
    vertex_count: usize,
    faces: impl IntoIterator<Item = (&'a [u32], Vector3<f64>)>,
) -> Vec<Vector3<f64>> {
    let mut sums = vec![Vector3::zeros(); vertex_count];
    for (ids, normal) in faces {
        for &id in ids {
            if let Some(sum) = sums.get_mut(id as usize) {
                *sum += normal;
            }
        }
    }
    sums.into_iter()
        .map(|n| n.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros))
        .collect()
}

struct Facet {
    normal: Vector3<f64>,
    offset: f64,
    triangles: Vec<[u32; 3]>,
}

/// Traces the outer boundary of a set of consistently wound coplanar triangles.
fn facet_boundary(triangles: &[[u32; 3]]) -> Option<Vec<u32>> {
    let directed: HashSet<(u32, u32)> = triangles
        .iter()
        .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
        .collect();

    let next: HashMap<u32, u32> = directed
        .iter()
        .filter(|(u, v)| !directed.contains(&(*v, *u)))
        .map(|&(u, v)| (u, v))
        .collect();

    let start = *next.keys().min()?;
    let mut boundary = vec![start];
    let mut current = start;

    loop {
        let following = *next.get(&current)?;
        if following == start {
            break;
        }
        if boundary.len() > next.len() {
            return None;
        }
        boundary.push(following);
        current = following;
    }

    Some(boundary)
}

fn farthest<F: Fn(&Point3<f64>) -> f64>(points: &[Point3<f64>], metric: F) -> Point3<f64> {
    points
        .iter()
        .copied()
        .max_by(|a, b| metric(a).total_cmp(&metric(b)))
        .unwrap_or_else(Point3::origin)
}

fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}

/// Largest side of the axis-aligned bounding box.
fn extent(points: &[Point3<f64>]) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points.iter().fold((first.coords, first.coords), |(lo, hi), p| {
        (lo.inf(&p.coords), hi.sup(&p.coords))
    });
    (max - min).max()
}

fn quantize(p: &Point3<f64>, quantum: f64) -> [i64; 3] {
    [
        (p.x / quantum).round() as i64,
        (p.y / quantum).round() as i64,
        (p.z / quantum).round() as i64,
    ]
}
