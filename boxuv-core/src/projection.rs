/// Box (cube) UV projection
use nalgebra::{Point3, Vector2, Vector3};

use crate::geometry::{base_mesh_name, DerivedMesh, SourceMesh};
use crate::settings::{ProjectionSettings, ProjectionSpace};
use crate::transform::ObjectTransform;

/// One of the six cube faces a triangle can be projected onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl Direction {
    /// Evaluation order used for classification. Earlier entries win ties.
    pub const ALL: [Direction; 6] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::Forward,
        Direction::Back,
    ];

    pub fn axis(self) -> Vector3<f32> {
        match self {
            Direction::Up => Vector3::new(0.0, 1.0, 0.0),
            Direction::Down => Vector3::new(0.0, -1.0, 0.0),
            Direction::Left => Vector3::new(-1.0, 0.0, 0.0),
            Direction::Right => Vector3::new(1.0, 0.0, 0.0),
            Direction::Forward => Vector3::new(0.0, 0.0, 1.0),
            Direction::Back => Vector3::new(0.0, 0.0, -1.0),
        }
    }

    /// Pick the direction whose axis makes the smallest angle with `normal`.
    ///
    /// A later direction replaces the current best only when strictly
    /// closer, so a normal on a bisector resolves to the earlier direction.
    pub fn classify(normal: &Vector3<f32>) -> Self {
        let mut best = Direction::Up;
        let mut best_dot = normal.dot(&best.axis());
        for dir in &Self::ALL[1..] {
            let dot = normal.dot(&dir.axis());
            if dot > best_dot {
                best = *dir;
                best_dot = dot;
            }
        }
        best
    }

    /// Drop the axis this direction faces along and keep the other two.
    pub fn planar(self, p: &Point3<f32>) -> Vector2<f32> {
        match self {
            Direction::Up | Direction::Down => Vector2::new(p.x, p.z),
            Direction::Left | Direction::Right => Vector2::new(p.z, p.y),
            Direction::Forward | Direction::Back => Vector2::new(p.x, p.y),
        }
    }
}

/// Build a hard-split copy of `source` with box-projected UVs.
///
/// Positions and normals are copied through untouched; only the UV channels
/// are new. `source` must satisfy [`SourceMesh::is_well_formed`].
pub fn project(
    source: &SourceMesh,
    transform: &ObjectTransform,
    settings: &ProjectionSettings,
) -> DerivedMesh {
    let space = settings.space();
    let mut mesh = DerivedMesh::with_capacity(base_mesh_name(&source.name), source.triangle_count());

    for triangle in source.triangles() {
        let face_normal = triangle.mean_normal();
        let reference = match space {
            ProjectionSpace::World => transform.transform_direction(&face_normal),
            ProjectionSpace::LocalScaled => face_normal,
        };
        let direction = Direction::classify(&reference);

        let uvs = triangle.vertices.map(|vertex| {
            let point = match space {
                ProjectionSpace::World => transform.transform_point(&vertex.position),
                ProjectionSpace::LocalScaled => {
                    Point3::from(vertex.position.coords.component_mul(&transform.lossy_scale))
                }
            };
            settings.apply(direction.planar(&point))
        });

        mesh.push_triangle(triangle.vertices, uvs);
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{LocalTransform, RotationState};
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Vector2<f32>, b: Vector2<f32>) -> bool {
        (a - b).norm() < 1e-5
    }

    #[test]
    fn test_counts() {
        let cube = SourceMesh::cube(2.0);
        let out = project(&cube, &ObjectTransform::identity(), &ProjectionSettings::default());
        assert_eq!(out.triangle_count(), cube.triangle_count());
        assert_eq!(out.vertex_count(), 3 * cube.triangle_count());
        assert_eq!(out.uv0.len(), out.vertex_count());
        assert_eq!(out.uv0, out.uv1);
    }

    #[test]
    fn test_output_shares_no_vertices() {
        let cube = SourceMesh::cube(1.0);
        let out = project(&cube, &ObjectTransform::identity(), &ProjectionSettings::default());
        let expected: Vec<u32> = (0..out.vertex_count() as u32).collect();
        assert_eq!(out.indices, expected);
    }

    #[test]
    fn test_classify_axes() {
        for dir in Direction::ALL {
            assert_eq!(Direction::classify(&dir.axis()), dir);
        }
        assert_eq!(Direction::classify(&Vector3::new(0.2, 0.9, -0.3)), Direction::Up);
        assert_eq!(Direction::classify(&Vector3::new(-0.9, 0.2, 0.3)), Direction::Left);
    }

    #[test]
    fn test_classify_bisector_keeps_earlier_direction() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        assert_eq!(Direction::classify(&Vector3::new(s, s, 0.0)), Direction::Up);
        assert_eq!(Direction::classify(&Vector3::new(-s, -s, 0.0)), Direction::Down);
        assert_eq!(Direction::classify(&Vector3::new(s, 0.0, s)), Direction::Right);
        assert_eq!(Direction::classify(&Vector3::new(-s, 0.0, -s)), Direction::Left);
        assert_eq!(Direction::classify(&Vector3::new(0.0, -s, s)), Direction::Down);
        assert_eq!(Direction::classify(&Vector3::zeros()), Direction::Up);
    }

    #[test]
    fn test_unit_cube_uses_raw_world_coordinates() {
        let cube = SourceMesh::cube(1.0);
        let out = project(&cube, &ObjectTransform::identity(), &ProjectionSettings::default());

        for i in 0..out.vertex_count() {
            let p = out.positions[i];
            let n = out.normals[i];
            let expected = if n.y.abs() > 0.5 {
                Vector2::new(p.x, p.z)
            } else if n.x.abs() > 0.5 {
                Vector2::new(p.z, p.y)
            } else {
                Vector2::new(p.x, p.y)
            };
            assert!(close(out.uv0[i], expected), "vertex {i}: {:?} != {:?}", out.uv0[i], expected);
        }
    }

    #[test]
    fn test_positions_and_normals_carried_through() {
        let cube = SourceMesh::cube(1.0);
        let transform = ObjectTransform::from_local(&LocalTransform {
            translation: Vector3::new(3.0, 4.0, 5.0),
            ..LocalTransform::identity()
        });
        let out = project(&cube, &transform, &ProjectionSettings::default());

        for (k, index) in cube.indices.iter().enumerate() {
            assert_eq!(out.positions[k], cube.positions[*index as usize]);
            assert_eq!(out.normals[k], cube.normals[*index as usize]);
        }
    }

    #[test]
    fn test_tiling_and_offset_linearity() {
        let cube = SourceMesh::cube(1.0);
        let transform = ObjectTransform::from_local(&LocalTransform {
            scale: Vector3::new(3.0, 1.5, 2.0),
            ..LocalTransform::identity()
        });

        let mut base = ProjectionSettings::new(1.0, [0.25, 0.5], true);
        base.set_tiling_range(3);
        let mut doubled = base;
        doubled.set_tiling_factor(2.0);
        let mut shifted = base;
        shifted.set_uv_offset([0.75, 0.0]);

        let a = project(&cube, &transform, &base);
        let b = project(&cube, &transform, &doubled);
        let c = project(&cube, &transform, &shifted);

        let offset = base.uv_offset();
        let delta = shifted.uv_offset() - offset;
        for i in 0..a.vertex_count() {
            assert!(close(b.uv0[i] - offset, (a.uv0[i] - offset) * 2.0));
            assert!(close(c.uv0[i], a.uv0[i] + delta));
        }
    }

    #[test]
    fn test_world_mode_follows_object_rotation() {
        // A +X face rotated a quarter turn about Z faces up in the world.
        let cube = SourceMesh::cube(1.0);
        let transform = ObjectTransform::from_local(&LocalTransform {
            rotation: RotationState::new(0.0, 0.0, FRAC_PI_2),
            ..LocalTransform::identity()
        });
        let out = project(&cube, &transform, &ProjectionSettings::default());

        for i in 0..out.vertex_count() {
            if out.normals[i].x > 0.5 {
                let world = transform.transform_point(&out.positions[i]);
                assert!(close(out.uv0[i], Vector2::new(world.x, world.z)));
            }
        }
    }

    #[test]
    fn test_local_mode_ignores_rotation_but_applies_lossy_scale() {
        let cube = SourceMesh::cube(1.0);
        let transform = ObjectTransform::from_local(&LocalTransform {
            translation: Vector3::new(100.0, 0.0, 0.0),
            rotation: RotationState::new(0.3, 1.1, 0.0),
            scale: Vector3::new(2.0, 3.0, 4.0),
        });
        let settings = ProjectionSettings::new(1.0, [0.0, 0.0], false);
        let out = project(&cube, &transform, &settings);

        for i in 0..out.vertex_count() {
            let p = out.positions[i];
            let s = Point3::new(p.x * 2.0, p.y * 3.0, p.z * 4.0);
            let n = out.normals[i];
            let expected = if n.y.abs() > 0.5 {
                Vector2::new(s.x, s.z)
            } else if n.x.abs() > 0.5 {
                Vector2::new(s.z, s.y)
            } else {
                Vector2::new(s.x, s.y)
            };
            assert!(close(out.uv0[i], expected));
        }
    }

    #[test]
    fn test_name_is_cleaned() {
        let mut cube = SourceMesh::cube(1.0);
        cube.name = "Crate_AutoUV_1234".to_string();
        let out = project(&cube, &ObjectTransform::identity(), &ProjectionSettings::default());
        assert_eq!(out.name, "Crate");
    }

    #[test]
    fn test_empty_mesh_projects_to_empty() {
        let out = project(
            &SourceMesh::new("empty"),
            &ObjectTransform::identity(),
            &ProjectionSettings::default(),
        );
        assert_eq!(out.vertex_count(), 0);
        assert_eq!(out.triangle_count(), 0);
    }
}
