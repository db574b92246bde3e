//! Entry point for Orrery.
//! Logging + CLI, then either the windowed scene or a headless inspection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use asset::texture::ImageFileDecoder;
use clap::Parser;
use corelib::scene::SceneDesc;
use platform::RunOptions;
use renderer::{Model, RecordingContext};

/// Orrery command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "orrery", about = "Animated solar system built from OBJ/MTL models")]
struct Cli {
    /// auto | vulkan | dx12 | metal | gl
    #[arg(long, value_parser = parse_backend, default_value = "auto")]
    gpu_backend: wgpu::Backends,

    /// Window size as WxH.
    #[arg(long, value_parser = parse_size, default_value = "1200x800")]
    size: (u32, u32),

    /// Log frames per second once a second.
    #[arg(long)]
    show_fps: bool,

    /// Scene description (RON). Defaults to the built-in solar system.
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Directory that scene model paths are relative to.
    #[arg(long, default_value = "resources")]
    assets: PathBuf,

    /// Load every model without a window, log summaries, and exit.
    #[arg(long)]
    inspect: bool,

    /// Print the scene description as RON and exit.
    #[arg(long)]
    dump_scene: bool,
}

fn parse_backend(val: &str) -> Result<wgpu::Backends, String> {
    Ok(match val.to_ascii_lowercase().as_str() {
        "auto" => wgpu::Backends::all(),
        "vulkan" | "vk" => wgpu::Backends::VULKAN,
        "dx12" | "d3d12" => wgpu::Backends::DX12,
        "metal" | "mtl" => wgpu::Backends::METAL,
        "gl" | "opengl" | "gles" => wgpu::Backends::GL,
        other => {
            log::warn!("Unknown backend '{}', falling back to auto.", other);
            wgpu::Backends::all()
        }
    })
}

fn parse_size(val: &str) -> Result<(u32, u32), String> {
    let (w, h) = val
        .split_once('x')
        .or_else(|| val.split_once('X'))
        .ok_or_else(|| format!("expected WxH, got '{val}'"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok((w.max(1), h.max(1)))
}

fn load_scene(path: Option<&Path>) -> Result<SceneDesc> {
    Ok(match path {
        Some(path) => {
            log::info!("Scene: {}", path.display());
            SceneDesc::load(path)?
        }
        None => SceneDesc::solar_system(),
    })
}

/// Load each distinct model once into a recording context. Returns how many
/// loaded.
fn inspect(desc: &SceneDesc, assets: &Path) -> usize {
    let mut ctx = RecordingContext::new();
    let decoder = ImageFileDecoder;
    let mut seen = HashSet::new();
    let mut loaded = 0;

    for body in &desc.bodies {
        if !seen.insert(body.model.as_str()) {
            continue;
        }
        let model = Model::load(assets.join(&body.model), &mut ctx, &decoder);
        if model.is_loaded() {
            let s = model.stats();
            log::info!(
                "{}: {} commands, {} textures",
                body.name,
                s.commands,
                s.textures
            );
            loaded += 1;
        } else {
            log::warn!("{}: not loaded ({})", body.name, model.path().display());
        }
    }

    log::info!(
        "Inspected {} models ({} loaded, {} textures, {} lists)",
        seen.len(),
        loaded,
        ctx.texture_count(),
        ctx.list_count()
    );
    loaded
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (width, height) = cli.size;
    let desc = load_scene(cli.scene.as_deref())?;

    if cli.dump_scene {
        println!("{}", desc.to_ron()?);
        return Ok(());
    }

    if cli.inspect {
        inspect(&desc, &cli.assets);
        return Ok(());
    }

    log::info!(
        "Starting Orrery. Backend: {:?}, show_fps={}, window_size={}x{}, assets={}",
        cli.gpu_backend,
        cli.show_fps,
        width,
        height,
        cli.assets.display()
    );

    platform::run_with_renderer(
        RunOptions {
            backends: cli.gpu_backend,
            show_fps: cli.show_fps,
            width,
            height,
            assets: cli.assets,
        },
        desc,
    )?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn defaults_match_original_window() {
        let cli = Cli::try_parse_from(["orrery"]).unwrap();
        assert_eq!(cli.size, (1200, 800));
        assert_eq!(cli.gpu_backend, wgpu::Backends::all());
        assert_eq!(cli.assets, PathBuf::from("resources"));
        assert!(!cli.show_fps && !cli.inspect && cli.scene.is_none());
    }

    #[test]
    fn flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "orrery",
            "--gpu-backend=vk",
            "--size=640X480",
            "--show-fps",
            "--scene",
            "s.ron",
            "--inspect",
        ])
        .unwrap();
        assert_eq!(cli.gpu_backend, wgpu::Backends::VULKAN);
        assert_eq!(cli.size, (640, 480));
        assert!(cli.show_fps && cli.inspect);
        assert_eq!(cli.scene, Some(PathBuf::from("s.ron")));
    }

    #[test]
    fn bad_size_is_rejected() {
        assert!(parse_size("1200").is_err());
        assert!(parse_size("ax3").is_err());
        assert_eq!(parse_size("0x0").unwrap(), (1, 1));
        assert!(Cli::try_parse_from(["orrery", "--size=big"]).is_err());
    }

    #[test]
    fn unknown_backend_falls_back_to_auto() {
        assert_eq!(parse_backend("glide").unwrap(), wgpu::Backends::all());
        assert_eq!(parse_backend("GL").unwrap(), wgpu::Backends::GL);
    }

    #[test]
    fn inspect_loads_models_from_assets_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Models/Rock")).unwrap();
        fs::write(
            dir.path().join("Models/Rock/Rock.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
        let desc = SceneDesc {
            bodies: vec![
                corelib::scene::BodyDesc::new("Rock", "Models/Rock/Rock.obj"),
                corelib::scene::BodyDesc::new("Twin", "Models/Rock/Rock.obj"),
                corelib::scene::BodyDesc::new("Ghost", "Models/Ghost/Ghost.obj"),
            ],
            ..SceneDesc::solar_system()
        };
        assert_eq!(inspect(&desc, dir.path()), 1);
    }
}
