//! Wavefront OBJ export of derived meshes

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::geometry::DerivedMesh;

/// Write `mesh` as OBJ text. Only the first UV channel is written.
pub fn write_obj_to<W: Write>(out: &mut W, mesh: &DerivedMesh) -> io::Result<()> {
    writeln!(out, "o {}", mesh.name)?;

    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p.x, p.y, p.z)?;
    }
    for uv in &mesh.uv0 {
        writeln!(out, "vt {} {}", uv.x, uv.y)?;
    }
    for n in &mesh.normals {
        writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
    }

    // OBJ indices are 1-based; position, uv and normal share one index.
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] + 1, tri[1] + 1, tri[2] + 1];
        writeln!(out, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}")?;
    }
    Ok(())
}

pub fn write_obj(mesh: &DerivedMesh, path: &Path) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_obj_to(&mut file, mesh)?;
    file.flush()
}
