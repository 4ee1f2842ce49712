//! Scene viewer
//!
//! Opens a window, loads one model and renders it over a ground grid until
//! the window closes. Usage: `scene_viewer [model path]`.

mod window;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use thiserror::Error;

use window::{InputEvent, Window, WindowError};

const CONFIG_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/viewer.toml");
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Error, Debug)]
enum ViewerError {
    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    App(#[from] AppError),
}

/// Defaults, then the config file if present, then the command line
fn load_config(path: &Path, model_override: Option<PathBuf>) -> ViewerConfig {
    let mut config = if path.exists() {
        match ViewerConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Ignoring {}: {}", path.display(), e);
                ViewerConfig::default()
            }
        }
    } else {
        ViewerConfig::default()
    };

    if let Some(model) = model_override {
        config.scene.model_path = model;
    }
    config
}

fn dispatch(app: &mut SceneApplication, event: InputEvent) -> Result<(), AppError> {
    match event {
        InputEvent::Resized(resize) => app.on_resize(&resize)?,
        InputEvent::MouseMoved(motion) => app.on_mouse_moved(&motion),
        InputEvent::MouseWheel(wheel) => app.on_mouse_wheel(&wheel),
    }
    Ok(())
}

fn run(config: ViewerConfig) -> Result<(), ViewerError> {
    let title = config.window.title.clone();
    let mut window = Window::new(&config.window)?;

    let mut app = SceneApplication::new(config);
    app.initialize(&mut window)?;

    let mut timer = Timer::new();
    while !window.should_close() {
        for event in window.poll_events() {
            dispatch(&mut app, event)?;
        }

        if window.is_minimized() {
            window.wait_events();
            continue;
        }

        timer.tick();
        app.update(timer.delta_time())?;
        app.render()?;

        if timer.take_fps_update() {
            window.set_title(&format!("{} - {:.0} FPS", title, timer.fps()));
        }
    }

    log::info!(
        "Window closed after {} frames ({:.1}s)",
        timer.frame_count(),
        timer.total_time()
    );
    app.cleanup();
    Ok(())
}

fn main() -> ExitCode {
    let model_override = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(Path::new(CONFIG_PATH), model_override);

    logging::init(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER));
    log::info!("Model: {}", config.scene.model_path.display());

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/viewer.toml"), None);
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_command_line_overrides_model() {
        let config = load_config(
            Path::new("/nonexistent/viewer.toml"),
            Some(PathBuf::from("models/cube.obj")),
        );
        assert_eq!(config.scene.model_path, PathBuf::from("models/cube.obj"));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = ViewerConfig::load_from_file(CONFIG_PATH).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_filter.as_deref(), Some("info"));
    }
}
