//! boxuv - box-projected UVs with reversible mesh bindings
//!
//! Every command works on a project directory holding `boxuv.toml`, a scene
//! file, an asset root and the binding store.

use anyhow::{bail, Context, Result};
use boxuv_core::{AssetStorage, BindingState, Refresh, Revert, SkipReason, SourceMesh};
use boxuv_terminal::{Project, Viewport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "boxuv")]
#[command(about = "Box-project UVs onto meshes and revert them later")]
#[command(version)]
struct Cli {
    /// Project directory
    #[arg(short, long, default_value = ".", global = true)]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create boxuv.toml and the asset root
    Init {
        /// Also add a demo cube object
        #[arg(long)]
        demo: bool,
    },

    /// Import an STL file as a new scene object
    Import {
        /// Input STL file (ASCII or binary)
        input: PathBuf,

        /// Object id (default: file stem)
        #[arg(long)]
        id: Option<String>,

        /// Parent object id
        #[arg(long)]
        parent: Option<String>,
    },

    /// Generate UVs for every object with geometry
    Generate {
        /// Only objects under this root
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Regenerate the UVs of one tracked object
    Refresh {
        id: String,
    },

    /// Set an object's scale and regenerate its UVs
    Scale {
        id: String,
        x: f32,
        y: f32,
        z: f32,
    },

    /// Restore original meshes
    Revert {
        /// Object to revert
        id: Option<String>,

        /// Revert every tracked object under this root
        #[arg(short, long, conflicts_with = "id")]
        root: Option<String>,

        /// Revert every tracked object
        #[arg(long, conflicts_with_all = ["id", "root"])]
        all: bool,
    },

    /// Change projection settings
    Set {
        #[arg(long)]
        tiling: Option<f32>,

        /// Tiling range index (0-4: max 0.01, 0.1, 1, 10, 100)
        #[arg(long)]
        range: Option<usize>,

        #[arg(long, num_args = 2, value_names = ["U", "V"])]
        offset: Option<Vec<f32>>,

        /// Project in world space (true) or follow object rotation (false)
        #[arg(long)]
        ignore_rotation: Option<bool>,

        /// Regenerate every tracked object with the new settings
        #[arg(long)]
        apply: bool,
    },

    /// Show settings and binding state of every object
    Status,

    /// Write an object's UV-mapped mesh as OBJ
    Export {
        id: String,

        /// Output .obj file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Open the interactive viewport
    View,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { demo } => {
            let mut project = Project::init(&cli.project)?;
            if demo {
                project.add_mesh("cube", None, &SourceMesh::cube(1.0))?;
            }
            println!("Initialized project in {}", project.dir().display());
        }

        Commands::Import { input, id, parent } => {
            let mut project = Project::open(&cli.project)?;
            let guid = project
                .import_stl(&input, id.as_deref(), parent.as_deref())
                .with_context(|| format!("Failed to import {}", input.display()))?;
            println!("Imported {} as {guid}", input.display());
        }

        Commands::Generate { root } => {
            let mut project = Project::open(&cli.project)?;
            let report = project.generate(root.as_deref())?;
            println!("Generated {} mesh(es)", report.generated);
            for (key, reason) in &report.skipped {
                let reason = match reason {
                    SkipReason::NoGeometry => "no geometry".to_string(),
                    SkipReason::Degenerate => "degenerate mesh".to_string(),
                    SkipReason::Failed(err) => err.clone(),
                };
                println!("  skipped {key}: {reason}");
            }
        }

        Commands::Refresh { id } => {
            let mut project = Project::open(&cli.project)?;
            match project.refresh(&id)? {
                Refresh::Applied(refreshed) => println!("Refreshed {id} -> {}", refreshed.slot),
                Refresh::NotTracked => println!("{id} is not tracked; run `boxuv generate` first"),
            }
        }

        Commands::Scale { id, x, y, z } => {
            let mut project = Project::open(&cli.project)?;
            if let Refresh::Applied(refreshed) = project.rescale(&id, [x, y, z])? {
                println!("Scaled {id}, UVs written to {}", refreshed.slot);
            }
        }

        Commands::Revert { id, root, all } => {
            let mut project = Project::open(&cli.project)?;
            if let Some(id) = id {
                match project.revert(&id)? {
                    Revert::Restored(original) => println!("Reverted {id} to {original}"),
                    Revert::NothingToRevert => println!("Nothing to revert for {id}"),
                }
            } else if root.is_some() || all {
                let restored = project.revert_all(root.as_deref())?;
                println!("Reverted {restored} object(s)");
            } else {
                bail!("Specify an object id, --root or --all");
            }
        }

        Commands::Set {
            tiling,
            range,
            offset,
            ignore_rotation,
            apply,
        } => {
            let mut project = Project::open(&cli.project)?;
            let settings = &mut project.config.projection;
            // Range first so the tiling factor is clamped into the new range
            if let Some(range) = range {
                settings.set_tiling_range(range);
            }
            if let Some(tiling) = tiling {
                settings.set_tiling_factor(tiling);
            }
            if let Some(offset) = offset {
                settings.set_uv_offset([offset[0], offset[1]]);
            }
            if let Some(ignore) = ignore_rotation {
                settings.set_ignore_object_rotation(ignore);
            }
            project.commit_settings()?;
            print_settings(&project);

            if apply {
                let refreshed = project.refresh_all()?;
                println!("Refreshed {refreshed} object(s)");
            }
        }

        Commands::Status => {
            let project = Project::open(&cli.project)?;
            print_settings(&project);
            for key in project.targets(None)? {
                let state = match project.session.state(&key) {
                    BindingState::Unbound => "unbound".to_string(),
                    BindingState::BoundNoDerived => "captured".to_string(),
                    BindingState::BoundWithDerived => match project.session.binding(&key) {
                        Some(binding) => format!(
                            "projected -> {}",
                            binding.derived.as_ref().map(ToString::to_string).unwrap_or_default()
                        ),
                        None => "projected".to_string(),
                    },
                };
                let name = project.scene.get(&key).map_or(key.as_str(), |o| o.display_name());
                println!("  {name} [{key}]: {state}");
            }
        }

        Commands::Export { id, output } => {
            let project = Project::open(&cli.project)?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{id}.obj")));
            project.export_obj(&id, &output)?;
            println!("Wrote {}", output.display());
        }

        Commands::View => {
            let project = Project::open(&cli.project)?;
            let (width, height) = crossterm::terminal::size()?;
            let mut viewport = Viewport::new(project, width, height);
            viewport.run()?;
        }
    }

    Ok(())
}

fn print_settings(project: &Project) {
    let settings = &project.config.projection;
    println!(
        "Tiling {} (max {}), offset ({}, {}), {} space",
        settings.tiling_factor(),
        settings.tiling_range_max(),
        settings.uv_offset().x,
        settings.uv_offset().y,
        if settings.ignore_object_rotation() { "world" } else { "local" },
    );
    let tracked = project.session.bindings().count();
    let missing = project
        .scene
        .objects
        .iter()
        .filter_map(|o| o.mesh.as_ref())
        .filter(|guid| project.session.storage().guid_to_path(guid).is_none())
        .count();
    println!("{tracked} tracked object(s)");
    if missing > 0 {
        println!("{missing} object(s) reference missing meshes");
    }
}
