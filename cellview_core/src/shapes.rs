//! Primitive collision shapes and the geometry the sink can render.
//!
//! Every shape kind goes through one exhaustive `match` to produce a
//! [`RenderableGeometry`]. Curved and hull shapes are sampled into a point
//! cloud first and then reuse the hull outline and hull mesh path.

use nalgebra::{Point3, Vector3};
use parry3d_f64::shape::{Ball, Capsule};
use serde::{Deserialize, Serialize};

use crate::config::HullConfig;
use crate::error::{CellviewError, Result};
use crate::hull::{average_normals, HullExtractor, HullMesh, HullPolygon};
use crate::pose::Transform;

/// Collision shape descriptor. Lengths in mm.
///
/// Capsules are centered on their origin with the cylinder axis along Z;
/// `cylinder_height` excludes the two hemispherical caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape_type", rename_all = "snake_case")]
pub enum Shape {
    Sphere { radius: f64 },
    Box { half_extents: [f64; 3] },
    Capsule { radius: f64, cylinder_height: f64 },
    ConvexHull { vertices: Vec<[f64; 3]> },
    Compound { children: Vec<Shape> },
}

/// How hull-derived shapes are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStyle {
    /// Closed triangle mesh (robot link geometry)
    Solid,
    /// Facet outlines (collision scenes, safety zones)
    Wireframe,
}

/// Triangle mesh as handed to the sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<[f32; 3]>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_colors: Option<Vec<[u8; 4]>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albedo: Option<[u8; 3]>,
}

impl TriangleMesh {
    pub fn from_hull(mesh: &HullMesh) -> Self {
        Self {
            vertices: mesh.vertices.iter().map(|p| to_f32(&p.coords)).collect(),
            triangles: mesh.triangles.clone(),
            normals: Some(mesh.normals.iter().map(to_f32).collect()),
            vertex_colors: None,
            albedo: None,
        }
    }

    /// Fills in missing normals by averaging the faces around each vertex.
    ///
    /// Triangles with out-of-range indices or no area do not contribute.
    pub fn with_vertex_normals(mut self) -> Self {
        if self.normals.is_some() {
            return self;
        }

        let points: Vec<Point3<f64>> = self
            .vertices
            .iter()
            .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
            .collect();
        let faces = self.triangles.iter().filter_map(|tri| {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| points.get(i as usize));
            let normal = (b? - a?).cross(&(c? - a?)).try_normalize(f64::EPSILON)?;
            Some((&tri[..], normal))
        });

        self.normals = Some(average_normals(points.len(), faces).iter().map(to_f32).collect());
        self
    }

    pub fn with_albedo(mut self, albedo: [u8; 3]) -> Self {
        self.albedo = Some(albedo);
        self
    }

    /// Multiplies every vertex coordinate by `scale` (unit conversion).
    pub fn scaled(mut self, scale: f64) -> Self {
        for v in &mut self.vertices {
            for c in v.iter_mut() {
                *c = (*c as f64 * scale) as f32;
            }
        }
        self
    }
}

fn to_f32(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

/// Geometry record registered once per entity path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderableGeometry {
    Mesh(TriangleMesh),
    Ellipsoid { half_sizes: [f64; 3] },
    Box { half_sizes: [f64; 3] },
    Outlines { polygons: Vec<HullPolygon> },
}

impl Shape {
    /// Rejects non-finite or non-positive dimensions.
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        match self {
            Shape::Sphere { radius } if !positive(*radius) => {
                Err(CellviewError::InvalidGeometry(format!("sphere radius {}", radius)))
            }
            Shape::Box { half_extents } if !half_extents.iter().all(|&h| positive(h)) => Err(
                CellviewError::InvalidGeometry(format!("box half extents {:?}", half_extents)),
            ),
            Shape::Capsule { radius, cylinder_height }
                if !positive(*radius)
                    || !(cylinder_height.is_finite() && *cylinder_height >= 0.0) =>
            {
                Err(CellviewError::InvalidGeometry(format!(
                    "capsule radius {} height {}",
                    radius, cylinder_height
                )))
            }
            Shape::ConvexHull { vertices } if vertices.iter().flatten().any(|c| !c.is_finite()) => {
                Err(CellviewError::InvalidGeometry("convex hull vertex is not finite".to_string()))
            }
            Shape::Compound { children } => children.iter().try_for_each(Shape::validate),
            _ => Ok(()),
        }
    }

    /// Copy with capsule radius and height multiplied by `factor`.
    pub fn shrunk(&self, factor: f64) -> Shape {
        match self {
            Shape::Capsule { radius, cylinder_height } => Shape::Capsule {
                radius: radius * factor,
                cylinder_height: cylinder_height * factor,
            },
            other => other.clone(),
        }
    }

    /// Surface sample in the shape's local frame.
    ///
    /// Spheres and capsules are tessellated by parry; boxes contribute their
    /// corners and hulls their vertices.
    pub fn surface_points(&self, config: &HullConfig) -> Vec<Point3<f64>> {
        match self {
            Shape::Sphere { radius } => {
                let segments = config.sphere_segments.max(4) as u32;
                Ball::new(*radius).to_trimesh(segments, (segments / 2).max(2)).0
            }
            Shape::Box { half_extents: [x, y, z] } => {
                let mut corners = Vec::with_capacity(8);
                for sx in [-1.0, 1.0] {
                    for sy in [-1.0, 1.0] {
                        for sz in [-1.0, 1.0] {
                            corners.push(Point3::new(sx * x, sy * y, sz * z));
                        }
                    }
                }
                corners
            }
            Shape::Capsule { radius, cylinder_height } => {
                let segments = config.capsule_segments.max(4) as u32;
                Capsule::new_z(cylinder_height / 2.0, *radius)
                    .to_trimesh(segments, (segments / 4).max(2))
                    .0
            }
            Shape::ConvexHull { vertices } => vertices.iter().map(|v| Point3::from(*v)).collect(),
            Shape::Compound { children } => {
                children.iter().flat_map(|c| c.surface_points(config)).collect()
            }
        }
    }

    /// Facet outlines of the shape placed by `pose`.
    pub fn outlines(
        &self,
        pose: &Transform,
        extractor: &HullExtractor,
        config: &HullConfig,
    ) -> Result<Vec<HullPolygon>> {
        self.validate()?;
        let points: Vec<Point3<f64>> = self
            .surface_points(config)
            .iter()
            .map(|p| pose.transform_point(p))
            .collect();
        extractor.try_outlines(&points)
    }

    /// Geometry to register for this shape in its local frame.
    pub fn renderable(
        &self,
        style: RenderStyle,
        extractor: &HullExtractor,
        config: &HullConfig,
    ) -> Result<RenderableGeometry> {
        self.validate()?;

        let geometry = match (self, style) {
            (Shape::Sphere { radius }, _) => RenderableGeometry::Ellipsoid {
                half_sizes: [*radius; 3],
            },
            (Shape::Box { half_extents }, _) => RenderableGeometry::Box {
                half_sizes: *half_extents,
            },
            (_, RenderStyle::Wireframe) => RenderableGeometry::Outlines {
                polygons: self.outlines(&Transform::identity(), extractor, config)?,
            },
            (_, RenderStyle::Solid) => {
                let polygons = self.outlines(&Transform::identity(), extractor, config)?;
                RenderableGeometry::Mesh(TriangleMesh::from_hull(&extractor.mesh(&polygons)))
            }
        };

        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose;
    use approx::assert_relative_eq;

    fn extractor() -> HullExtractor {
        HullExtractor::default()
    }

    #[test]
    fn test_shape_json_tags() {
        let shape: Shape =
            serde_json::from_str(r#"{"shape_type":"capsule","radius":50,"cylinder_height":200}"#)
                .unwrap();
        assert_eq!(shape, Shape::Capsule { radius: 50.0, cylinder_height: 200.0 });

        let shape: Shape = serde_json::from_str(
            r#"{"shape_type":"compound","children":[{"shape_type":"box","half_extents":[1,2,3]}]}"#,
        )
        .unwrap();
        assert!(matches!(shape, Shape::Compound { ref children } if children.len() == 1));
    }

    #[test]
    fn test_capsule_samples_stay_on_surface() {
        let config = HullConfig::default();
        let capsule = Shape::Capsule { radius: 10.0, cylinder_height: 40.0 };
        let points = capsule.surface_points(&config);

        assert!(!points.is_empty());
        for p in &points {
            let axis_z = p.z.clamp(-20.0, 20.0);
            let dist = ((p.x * p.x) + (p.y * p.y) + (p.z - axis_z).powi(2)).sqrt();
            assert_relative_eq!(dist, 10.0, epsilon = 1e-9);
        }
        let top = points.iter().map(|p| p.z).fold(f64::MIN, f64::max);
        let bottom = points.iter().map(|p| p.z).fold(f64::MAX, f64::min);
        assert_relative_eq!(top, 30.0, epsilon = 1e-9);
        assert_relative_eq!(bottom, -30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_short_wide_capsule_keeps_both_equators() {
        let config = HullConfig::default();
        let capsule = Shape::Capsule { radius: 100.0, cylinder_height: 2.0 };
        let points = capsule.surface_points(&config);

        let equator = |z: f64| {
            points
                .iter()
                .filter(|p| (p.z - z).abs() < 1e-9)
                .filter(|p| (p.x.hypot(p.y) - 100.0).abs() < 1e-9)
                .count()
        };
        assert!(equator(1.0) >= config.capsule_segments);
        assert_eq!(equator(1.0), equator(-1.0));

        // The hull reaches the full radius at both ends of the cylinder
        let polygons = capsule
            .outlines(&Transform::identity(), &extractor(), &config)
            .unwrap();
        let widest_at = |z: f64| {
            polygons
                .iter()
                .flat_map(|p| &p.points)
                .filter(|p| (p.z - z).abs() < 1e-6)
                .map(|p| p.x.hypot(p.y))
                .fold(0.0, f64::max)
        };
        assert_relative_eq!(widest_at(-1.0), 100.0, epsilon = 1e-6);
        assert_relative_eq!(widest_at(1.0), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sphere_samples_stay_on_surface() {
        let points = Shape::Sphere { radius: 7.0 }.surface_points(&HullConfig::default());
        assert!(points.len() > 8);
        for p in &points {
            assert_relative_eq!(p.coords.norm(), 7.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_primitives_dispatch() {
        let config = HullConfig::default();
        let sphere = Shape::Sphere { radius: 5.0 }
            .renderable(RenderStyle::Solid, &extractor(), &config)
            .unwrap();
        assert_eq!(sphere, RenderableGeometry::Ellipsoid { half_sizes: [5.0; 3] });

        let cube = Shape::Box { half_extents: [1.0, 2.0, 3.0] }
            .renderable(RenderStyle::Wireframe, &extractor(), &config)
            .unwrap();
        assert_eq!(cube, RenderableGeometry::Box { half_sizes: [1.0, 2.0, 3.0] });
    }

    #[test]
    fn test_capsule_solid_and_wireframe() {
        let config = HullConfig::default();
        let capsule = Shape::Capsule { radius: 50.0, cylinder_height: 100.0 };

        match capsule.renderable(RenderStyle::Solid, &extractor(), &config).unwrap() {
            RenderableGeometry::Mesh(mesh) => {
                assert!(!mesh.triangles.is_empty());
                assert_eq!(mesh.normals.as_ref().map(Vec::len), Some(mesh.vertices.len()));
            }
            other => panic!("expected mesh, got {:?}", other),
        }

        match capsule.renderable(RenderStyle::Wireframe, &extractor(), &config).unwrap() {
            RenderableGeometry::Outlines { polygons } => assert!(!polygons.is_empty()),
            other => panic!("expected outlines, got {:?}", other),
        }
    }

    #[test]
    fn test_compound_hull_covers_children() {
        let config = HullConfig::default();
        let compound = Shape::Compound {
            children: vec![
                Shape::Box { half_extents: [1.0, 1.0, 1.0] },
                Shape::ConvexHull { vertices: vec![[10.0, 0.0, 0.0]] },
            ],
        };
        let polygons = compound
            .outlines(&Transform::identity(), &extractor(), &config)
            .unwrap();
        let max_x = polygons
            .iter()
            .flat_map(|p| &p.points)
            .map(|p| p.x)
            .fold(f64::MIN, f64::max);
        assert_relative_eq!(max_x, 10.0);
    }

    #[test]
    fn test_outlines_follow_pose() {
        let config = HullConfig::default();
        let cube = Shape::Box { half_extents: [1.0, 1.0, 1.0] };
        let polygons = cube
            .outlines(&pose::translation(0.0, 0.0, 100.0), &extractor(), &config)
            .unwrap();
        assert_eq!(polygons.len(), 6);
        assert!(polygons.iter().flat_map(|p| &p.points).all(|p| p.z >= 99.0));
    }

    #[test]
    fn test_invalid_dimensions() {
        let config = HullConfig::default();
        let err = Shape::Sphere { radius: -1.0 }
            .renderable(RenderStyle::Solid, &extractor(), &config)
            .unwrap_err();
        assert!(matches!(err, CellviewError::InvalidGeometry(_)));
    }

    #[test]
    fn test_flat_hull_is_degenerate() {
        let config = HullConfig::default();
        let flat = Shape::ConvexHull {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
        };
        let err = flat.renderable(RenderStyle::Wireframe, &extractor(), &config).unwrap_err();
        assert!(matches!(err, CellviewError::DegenerateHull(_)));
    }

    #[test]
    fn test_shrink_only_affects_capsules() {
        let capsule = Shape::Capsule { radius: 100.0, cylinder_height: 200.0 }.shrunk(0.99);
        assert_eq!(capsule, Shape::Capsule { radius: 99.0, cylinder_height: 198.0 });
        let sphere = Shape::Sphere { radius: 1.0 };
        assert_eq!(sphere.shrunk(0.5), sphere);
    }
}
