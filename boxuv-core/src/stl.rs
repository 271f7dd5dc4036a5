/// STL import for binary and ASCII files
use std::path::Path;

use nalgebra::Vector3;
use nom::{
    bytes::complete::tag,
    character::complete::{multispace0, multispace1, not_line_ending},
    multi::many0,
    number::complete::float,
    sequence::preceded,
    IResult,
};

use crate::geometry::{SourceMesh, Triangle, Vertex};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum StlError {
    #[error("file too small to be a valid STL ({0} bytes)")]
    TooSmall(usize),

    #[error("unexpected end of file: header declares {declared} triangles, data holds {found}")]
    Truncated { declared: usize, found: usize },

    #[error("failed to parse ASCII STL: {0}")]
    Ascii(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> Result<Vec<Triangle>, StlError> {
    if data.len() < HEADER_LEN + 4 {
        return Err(StlError::TooSmall(data.len()));
    }

    let data = &data[HEADER_LEN..];
    let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let body = &data[4..];

    let found = body.len() / FACET_LEN;
    if found < declared {
        return Err(StlError::Truncated { declared, found });
    }

    let triangles = body
        .chunks_exact(FACET_LEN)
        .take(declared)
        .map(|facet| {
            let n = read_vec3(facet, 0);
            let vertex = |at: usize| {
                let p = read_vec3(facet, at);
                Vertex::new(p[0], p[1], p[2], n[0], n[1], n[2])
            };
            // Trailing two bytes are the attribute count
            Triangle::new(vertex(12), vertex(24), vertex(36))
        })
        .collect();

    Ok(triangles)
}

fn read_vec3(bytes: &[u8], at: usize) -> [f32; 3] {
    let f = |i: usize| {
        let o = at + i * 4;
        f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
    };
    [f(0), f(1), f(2)]
}

/// Parse an ASCII STL file
pub fn parse_ascii_stl(input: &str) -> Result<Vec<Triangle>, StlError> {
    match parse_ascii_stl_impl(input) {
        Ok((_, triangles)) => Ok(triangles),
        Err(e) => Err(StlError::Ascii(format!("{e:?}"))),
    }
}

fn parse_ascii_stl_impl(input: &str) -> IResult<&str, Vec<Triangle>> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    let (input, _) = not_line_ending(input)?; // Optional name
    let (input, triangles) = many0(parse_facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;
    Ok((input, triangles))
}

fn parse_facet(input: &str) -> IResult<&str, Triangle> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = parse_vector3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, v1) = parse_vertex(input, normal)?;
    let (input, v2) = parse_vertex(input, normal)?;
    let (input, v3) = parse_vertex(input, normal)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((input, Triangle::new(v1, v2, v3)))
}

fn parse_vertex(input: &str, normal: (f32, f32, f32)) -> IResult<&str, Vertex> {
    let (input, _) = preceded(multispace0, tag("vertex"))(input)?;
    let (input, (x, y, z)) = parse_vector3(input)?;
    Ok((input, Vertex::new(x, y, z, normal.0, normal.1, normal.2)))
}

fn parse_vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}

/// Detect and parse STL data (binary or ASCII)
///
/// Facets stored with a zero normal get the normal of their winding.
pub fn parse_stl(data: &[u8]) -> Result<Vec<Triangle>, StlError> {
    // Binary files may also start with "solid", so fall back on failure
    let ascii = (data.len() > 5 && &data[0..5] == b"solid")
        .then(|| std::str::from_utf8(data).ok())
        .flatten()
        .and_then(|text| parse_ascii_stl(text).ok());

    let mut triangles = match ascii {
        Some(triangles) => triangles,
        None => parse_binary_stl(data)?,
    };
    for triangle in &mut triangles {
        if triangle.vertices.iter().all(|v| v.normal == Vector3::zeros()) {
            let normal = triangle.calculate_normal();
            for vertex in &mut triangle.vertices {
                vertex.normal = normal;
            }
        }
    }
    Ok(triangles)
}

/// Read an STL file into an indexed mesh named after the file stem.
///
/// STL stores one normal per facet, so vertices are only shared between
/// facets with identical normals.
pub fn load_stl(path: &Path) -> Result<SourceMesh, StlError> {
    let data = std::fs::read(path).map_err(|source| StlError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let triangles = parse_stl(&data)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Mesh");

    tracing::debug!(path = %path.display(), triangles = triangles.len(), "parsed STL");
    Ok(SourceMesh::from_triangles(name, &triangles))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_QUAD: &str = "solid quad
  facet normal 0 1 0
    outer loop
      vertex 0 0 0
      vertex 0 0 1
      vertex 1 0 1
    endloop
  endfacet
  facet normal 0 1 0
    outer loop
      vertex 0 0 0
      vertex 1 0 1
      vertex 1 0 0
    endloop
  endfacet
endsolid quad
";

    fn binary_stl(triangles: &[[[f32; 3]; 4]]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
        for facet in triangles {
            for v in facet {
                for c in v {
                    data.extend_from_slice(&c.to_le_bytes());
                }
            }
            data.extend_from_slice(&[0, 0]);
        }
        data
    }

    #[test]
    fn test_parse_binary_header() {
        let mut data = vec![0u8; 84];
        data[80..84].copy_from_slice(&0u32.to_le_bytes());

        let triangles = parse_binary_stl(&data).unwrap();
        assert!(triangles.is_empty());
    }

    #[test]
    fn test_parse_binary_facet() {
        let data = binary_stl(&[[
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
        ]]);
        let triangles = parse_binary_stl(&data).unwrap();
        assert_eq!(triangles.len(), 1);
        assert_eq!(triangles[0].vertices[2], Vertex::new(1.0, 1.0, 0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_binary_truncated() {
        let mut data = binary_stl(&[[[0.0; 3]; 4]]);
        data[80..84].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            parse_binary_stl(&data),
            Err(StlError::Truncated { declared: 2, found: 1 })
        ));
    }

    #[test]
    fn test_binary_too_small() {
        assert!(matches!(parse_binary_stl(&[0u8; 10]), Err(StlError::TooSmall(10))));
    }

    #[test]
    fn test_parse_named_ascii_solid() {
        let triangles = parse_stl(ASCII_QUAD.as_bytes()).unwrap();
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[1].vertices[2].position.x, 1.0);
        assert_eq!(triangles[0].vertices[0].normal.y, 1.0);
    }

    #[test]
    fn test_zero_normal_uses_winding() {
        let data = binary_stl(&[[
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ]]);
        let triangles = parse_stl(&data).unwrap();
        assert_eq!(triangles[0].vertices[0].normal, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_load_stl_welds_shared_corners() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("floor.stl");
        std::fs::write(&path, ASCII_QUAD).unwrap();

        let mesh = load_stl(&path).unwrap();
        assert_eq!(mesh.name, "floor");
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.is_well_formed());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_stl(&dir.path().join("nope.stl")),
            Err(StlError::Io { .. })
        ));
    }
}
