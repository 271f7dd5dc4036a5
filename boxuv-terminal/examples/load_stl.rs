/// Example: Import an STL file into a scratch project and view its box UVs
///
/// Usage: cargo run --example load_stl -- path/to/file.stl
use std::env;

use anyhow::Result;
use boxuv_core::SourceMesh;
use boxuv_terminal::{Project, Viewport};

fn main() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut project = Project::init(dir.path())?;

    match env::args().nth(1) {
        Some(path) => {
            println!("Loading STL file: {path}");
            project.import_stl(path.as_ref(), Some("model"), None)?;
        }
        None => {
            eprintln!("No STL file provided, using default cube...");
            project.add_mesh("model", None, &SourceMesh::cube(2.0))?;
        }
    }

    let report = project.generate(None)?;
    println!("Projected {} mesh(es) (press Q to quit)...", report.generated);
    std::thread::sleep(std::time::Duration::from_secs(1));

    let (width, height) = crossterm::terminal::size()?;
    Viewport::new(project, width, height).run()
}
