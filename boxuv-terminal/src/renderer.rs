/// ASCII rasterizer that shades meshes with a UV checker
use boxuv_core::{DerivedMesh, MeshAsset, ObjectTransform};
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use nalgebra::{Point3, Vector2, Vector3};
use std::io::Write;

use crate::camera::Camera;

/// Character luminosity ramp for shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Checker cells per UV unit
const CHECKS_PER_UNIT: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Empty,
    /// Mesh without texture coordinates
    Plain(u8),
    Checker { shade: u8, light: bool },
}

/// Triangle mesh in a form the rasterizer can draw
#[derive(Debug, Clone, Default)]
pub struct RenderMesh {
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<Vector2<f32>>>,
}

impl RenderMesh {
    pub fn bounds(&self, transform: &ObjectTransform) -> Option<(Point3<f32>, Point3<f32>)> {
        let mut points = self.positions.iter().map(|p| transform.transform_point(p));
        let first = points.next()?;
        Some(points.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p))))
    }
}

impl From<&MeshAsset> for RenderMesh {
    fn from(asset: &MeshAsset) -> Self {
        Self {
            positions: asset.positions.iter().map(|&[x, y, z]| Point3::new(x, y, z)).collect(),
            normals: asset.normals.iter().map(|&[x, y, z]| Vector3::new(x, y, z)).collect(),
            indices: asset.indices.clone(),
            uvs: (!asset.uv0.is_empty())
                .then(|| asset.uv0.iter().map(|&[u, v]| Vector2::new(u, v)).collect()),
        }
    }
}

impl From<&DerivedMesh> for RenderMesh {
    fn from(mesh: &DerivedMesh) -> Self {
        Self {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            indices: mesh.indices.clone(),
            uvs: Some(mesh.uv0.clone()),
        }
    }
}

struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    uv: Vector2<f32>,
}

/// ASCII renderer that converts 3D meshes to terminal characters
pub struct AsciiRenderer {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
    cells: Vec<Cell>,
}

impl AsciiRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; size],
            cells: vec![Cell::Empty; size],
        }
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        *self = Self::new(width, height);
    }

    pub fn clear(&mut self) {
        self.depth_buffer.fill(f32::INFINITY);
        self.cells.fill(Cell::Empty);
    }

    pub fn render_mesh(&mut self, mesh: &RenderMesh, transform: &ObjectTransform, camera: &Camera) {
        let view_projection = camera.view_projection();
        let light = camera.eye_direction();

        for tri in mesh.indices.chunks_exact(3) {
            let Some(corners) = self.project_triangle(mesh, tri, transform, camera, &view_projection) else {
                continue;
            };

            let normal = tri
                .iter()
                .filter_map(|&i| mesh.normals.get(i as usize))
                .fold(Vector3::zeros(), |acc, n| acc + transform.transform_direction(n));
            let brightness = normal.try_normalize(1e-6).map_or(0.0, |n| n.dot(&light).max(0.0));
            let shade = ((brightness * (LUMINOSITY_RAMP.len() - 1) as f32) as usize)
                .min(LUMINOSITY_RAMP.len() - 1) as u8;

            self.rasterize_triangle(&corners, shade, mesh.uvs.is_some());
        }
    }

    fn project_triangle(
        &self,
        mesh: &RenderMesh,
        tri: &[u32],
        transform: &ObjectTransform,
        camera: &Camera,
        view_projection: &nalgebra::Matrix4<f32>,
    ) -> Option<[ScreenVertex; 3]> {
        let vertex = |i: u32| -> Option<ScreenVertex> {
            let local = mesh.positions.get(i as usize)?;
            let world = transform.transform_point(local);
            let (x, y, depth) =
                camera.project_to_screen(view_projection, &world, self.width as u32, self.height as u32)?;
            let uv = mesh
                .uvs
                .as_ref()
                .and_then(|uvs| uvs.get(i as usize).copied())
                .unwrap_or_else(Vector2::zeros);
            Some(ScreenVertex { x, y, depth, uv })
        };
        Some([vertex(tri[0])?, vertex(tri[1])?, vertex(tri[2])?])
    }

    fn rasterize_triangle(&mut self, v: &[ScreenVertex; 3], shade: u8, textured: bool) {
        // Bounding box, clipped to the screen
        let min_x = v[0].x.min(v[1].x).min(v[2].x).floor().max(0.0) as i32;
        let max_x = (v[0].x.max(v[1].x).max(v[2].x).ceil() as i32).min(self.width as i32 - 1);
        let min_y = v[0].y.min(v[1].y).min(v[2].y).floor().max(0.0) as i32;
        let max_y = (v[0].y.max(v[1].y).max(v[2].y).ceil() as i32).min(self.height as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) = barycentric((v[0].x, v[0].y), (v[1].x, v[1].y), (v[2].x, v[2].y), p)
                else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
                let idx = y as usize * self.width + x as usize;
                if depth >= self.depth_buffer[idx] {
                    continue;
                }
                self.depth_buffer[idx] = depth;
                self.cells[idx] = if textured {
                    let uv = v[0].uv * w0 + v[1].uv * w1 + v[2].uv * w2;
                    Cell::Checker {
                        shade,
                        light: checker(uv),
                    }
                } else {
                    Cell::Plain(shade)
                };
            }
        }
    }

    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for row in self.cells.chunks(self.width.max(1)) {
            for cell in row {
                let (c, color) = match *cell {
                    Cell::Empty => (' ', Color::Reset),
                    Cell::Plain(shade) => (LUMINOSITY_RAMP[shade as usize], Color::DarkGrey),
                    Cell::Checker { shade, light: true } => (LUMINOSITY_RAMP[shade as usize], Color::Yellow),
                    Cell::Checker { shade, light: false } => {
                        (LUMINOSITY_RAMP[(shade as usize).saturating_sub(3)], Color::DarkMagenta)
                    }
                };
                writer.queue(SetForegroundColor(color))?;
                writer.queue(Print(c))?;
            }
            writer.queue(Print("\r\n"))?;
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

/// Whether `uv` falls in a light checker cell
fn checker(uv: Vector2<f32>) -> bool {
    let u = (uv.x * CHECKS_PER_UNIT).floor() as i64;
    let v = (uv.y * CHECKS_PER_UNIT).floor() as i64;
    (u + v).rem_euclid(2) == 0
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(v0: (f32, f32), v1: (f32, f32), v2: (f32, f32), p: (f32, f32)) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);
    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    Some((w0, w1, 1.0 - w0 - w1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxuv_core::{project, ProjectionSettings, SourceMesh};

    #[test]
    fn test_checker_alternates() {
        assert!(checker(Vector2::new(0.1, 0.1)));
        assert!(!checker(Vector2::new(0.6, 0.1)));
        assert!(checker(Vector2::new(0.6, 0.6)));
        assert!(!checker(Vector2::new(-0.1, 0.1)));
    }

    #[test]
    fn test_barycentric_degenerate() {
        assert!(barycentric((0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.5, 0.5)).is_none());
    }

    #[test]
    fn test_render_cube_fills_centre() {
        let mesh = project(
            &SourceMesh::cube(2.0),
            &ObjectTransform::identity(),
            &ProjectionSettings::default(),
        );
        let mut renderer = AsciiRenderer::new(40, 20);
        renderer.render_mesh(&RenderMesh::from(&mesh), &ObjectTransform::identity(), &Camera::new(40, 20));

        assert!(matches!(renderer.cells[10 * 40 + 20], Cell::Checker { .. }));
        assert_eq!(renderer.cells[0], Cell::Empty);
    }

    #[test]
    fn test_untextured_mesh_renders_plain() {
        let asset = MeshAsset::from(&SourceMesh::cube(2.0));
        let mesh = RenderMesh::from(&asset);
        assert!(mesh.uvs.is_none());

        let mut renderer = AsciiRenderer::new(40, 20);
        renderer.render_mesh(&mesh, &ObjectTransform::identity(), &Camera::new(40, 20));
        assert!(matches!(renderer.cells[10 * 40 + 20], Cell::Plain(_)));
    }

    #[test]
    fn test_bounds() {
        let mesh = RenderMesh::from(&MeshAsset::from(&SourceMesh::cube(2.0)));
        let (min, max) = mesh.bounds(&ObjectTransform::identity()).unwrap();
        assert_eq!(min, Point3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 1.0));
    }
}
