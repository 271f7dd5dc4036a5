/// Geometry primitives: indexed source meshes and hard-split derived meshes
use std::collections::HashMap;

use nalgebra::{Point3, Vector2, Vector3};

/// A 3D vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32, nx: f32, ny: f32, nz: f32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            normal: Vector3::new(nx, ny, nz),
        }
    }

    fn weld_key(&self) -> [u32; 6] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.normal.x.to_bits(),
            self.normal.y.to_bits(),
            self.normal.z.to_bits(),
        ]
    }
}

/// A triangle face defined by three vertices
#[derive(Debug, Clone)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Calculate the geometric face normal from the triangle's winding.
    /// Zero for triangles without area.
    pub fn calculate_normal(&self) -> Vector3<f32> {
        let v0 = self.vertices[0].position;
        let v1 = self.vertices[1].position;
        let v2 = self.vertices[2].position;

        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        edge1
            .cross(&edge2)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Mean of the three vertex normals, normalized.
    ///
    /// Exactly cancelling normals yield the zero vector.
    pub fn mean_normal(&self) -> Vector3<f32> {
        let sum = self.vertices[0].normal + self.vertices[1].normal + self.vertices[2].normal;
        (sum / 3.0)
            .try_normalize(1e-5)
            .unwrap_or_else(Vector3::zeros)
    }
}

/// Indexed triangle mesh in object-local space.
///
/// This is the geometry an object carries before projection. Normals are
/// per vertex and `indices` is a flat list of triangles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMesh {
    pub name: String,
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub indices: Vec<u32>,
}

impl SourceMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when there is nothing to project.
    pub fn is_degenerate(&self) -> bool {
        self.positions.is_empty() || self.triangle_count() == 0
    }

    /// Checks the invariants projection relies on.
    pub fn is_well_formed(&self) -> bool {
        self.normals.len() == self.positions.len()
            && self.indices.len() % 3 == 0
            && self
                .indices
                .iter()
                .all(|&i| (i as usize) < self.positions.len())
    }

    pub fn vertex(&self, index: u32) -> Vertex {
        let i = index as usize;
        Vertex {
            position: self.positions[i],
            normal: self.normals[i],
        }
    }

    /// Iterate over the triangles in index order.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|tri| Triangle::new(self.vertex(tri[0]), self.vertex(tri[1]), self.vertex(tri[2])))
    }

    /// Build an indexed mesh from a triangle soup, sharing vertices whose
    /// position and normal are bit-identical.
    pub fn from_triangles(name: impl Into<String>, triangles: &[Triangle]) -> Self {
        let mut mesh = Self::new(name);
        let mut welded: HashMap<[u32; 6], u32> = HashMap::new();

        for triangle in triangles {
            for vertex in &triangle.vertices {
                let next = mesh.positions.len() as u32;
                let index = *welded.entry(vertex.weld_key()).or_insert_with(|| {
                    mesh.positions.push(vertex.position);
                    mesh.normals.push(vertex.normal);
                    next
                });
                mesh.indices.push(index);
            }
        }

        mesh
    }

    /// Create an axis-aligned cube centred on the origin: 24 vertices,
    /// 12 triangles, one normal per face.
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        // (normal, four corners counter-clockwise seen from outside)
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]]),
            ([0.0, 0.0, -1.0], [[-h, -h, -h], [-h, h, -h], [h, h, -h], [h, -h, -h]]),
            ([0.0, 1.0, 0.0], [[-h, h, -h], [-h, h, h], [h, h, h], [h, h, -h]]),
            ([0.0, -1.0, 0.0], [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]]),
            ([1.0, 0.0, 0.0], [[h, -h, -h], [h, h, -h], [h, h, h], [h, -h, h]]),
            ([-1.0, 0.0, 0.0], [[-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]]),
        ];

        let mut triangles = Vec::with_capacity(12);
        for (n, c) in faces {
            let v = |p: [f32; 3]| Vertex::new(p[0], p[1], p[2], n[0], n[1], n[2]);
            triangles.push(Triangle::new(v(c[0]), v(c[1]), v(c[2])));
            triangles.push(Triangle::new(v(c[0]), v(c[2]), v(c[3])));
        }

        Self::from_triangles("Cube", &triangles)
    }
}

/// Hard-split mesh produced by box projection.
///
/// Every triangle owns three vertices of its own; `uv0` and `uv1` hold
/// identical coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedMesh {
    pub name: String,
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub uv0: Vec<Vector2<f32>>,
    pub uv1: Vec<Vector2<f32>>,
    pub indices: Vec<u32>,
}

impl DerivedMesh {
    pub fn with_capacity(name: impl Into<String>, triangle_count: usize) -> Self {
        let vertices = triangle_count * 3;
        Self {
            name: name.into(),
            positions: Vec::with_capacity(vertices),
            normals: Vec::with_capacity(vertices),
            uv0: Vec::with_capacity(vertices),
            uv1: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(vertices),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append one triangle with its own three vertices.
    pub fn push_triangle(&mut self, vertices: [Vertex; 3], uvs: [Vector2<f32>; 3]) {
        let base = self.positions.len() as u32;
        for (vertex, uv) in vertices.iter().zip(uvs) {
            self.positions.push(vertex.position);
            self.normals.push(vertex.normal);
            self.uv0.push(uv);
            self.uv1.push(uv);
        }
        self.indices.extend([base, base + 1, base + 2]);
    }
}

/// Strip earlier derivation suffixes from a mesh name.
///
/// `Wall_AutoUV_4821` becomes `Wall`, `Crate12` becomes `Crate`; a name that
/// cleans to nothing becomes `Mesh`.
pub fn base_mesh_name(name: &str) -> String {
    let cut = ["_BoxUV", "_AutoUV", "_Copy"]
        .iter()
        .filter_map(|marker| name.find(marker))
        .min();
    let stem = match cut {
        Some(at) => &name[..at],
        None => name.trim_end_matches(|c: char| c.is_ascii_digit()),
    };

    let mut clean = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c == '_' && clean.ends_with('_') {
            continue;
        }
        clean.push(c);
    }
    let clean = clean.trim_end_matches('_');

    if clean.is_empty() {
        "Mesh".to_string()
    } else {
        clean.to_string()
    }
}
