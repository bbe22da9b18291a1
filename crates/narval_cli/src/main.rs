mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use narval_core::{FailurePolicy, ResourceRegistry, SceneDescription};
use narval_renderer::{render_scene, SceneBuilder, TreeMode};

use cli::{Args, Tree};

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.into())
        .init();

    log::info!("Starting Narval");

    let mut description = SceneDescription::from_path(&args.scene)
        .with_context(|| format!("failed to load scene {}", args.scene.display()))?;
    let settings = &mut description.settings;
    if let Some(spp) = args.spp {
        settings.spp = spp;
    }
    if let Some(bounces) = args.bounces {
        settings.bounces = bounces;
    }
    if let Some(threads) = args.threads {
        settings.threads = threads;
    }
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }

    let policy = if args.lenient {
        FailurePolicy::Lenient
    } else {
        FailurePolicy::Strict
    };
    let tree_mode = match args.tree {
        Tree::Octree => TreeMode::Octree,
        Tree::Binary => TreeMode::Binary,
    };

    // Meshes and image textures are registered by importers; the command
    // line renders built-in shapes and procedural volumes only.
    let registry = ResourceRegistry::new();
    let scene = SceneBuilder::new(&registry)
        .with_policy(policy)
        .with_tree_mode(tree_mode)
        .build(&description)
        .context("failed to build scene")?;

    let image = render_scene(&scene).context("render failed")?;

    let is_png = args
        .output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        image.save_png(&args.output)
    } else {
        image.save_ppm(&args.output)
    }
    .with_context(|| format!("failed to write {}", args.output.display()))?;

    Ok(())
}
