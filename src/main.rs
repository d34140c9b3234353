//! Hand landmark demo.
//!
//! Usage: `handmark [IMAGE...]`
//!
//! Without arguments, frames come from the webcam. Otherwise the given images are played back as
//! a camera. See [`handmark::config::Config`] for the environment variables that configure it.

use std::{
    panic::resume_unwind,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{bail, Context};
use handmark::{
    config::Config,
    decision::UiState,
    nn::{ModelSlot, NeuralNetwork},
    overlay,
    pipeline::{run_camera, CameraStats, FrameProcessor},
    resize::ResizeOptions,
    ui::{self, RecvTimeoutError},
    video::{
        self,
        still::StillImages,
        webcam::{Webcam, WebcamOptions},
        FrameSource, Permission,
    },
};
use image::RgbImage;

fn main() -> anyhow::Result<()> {
    handmark::init_logger!();

    let config = Config::from_env()?;
    log::debug!("{config:?}");
    let images = std::env::args_os().skip(1).map(PathBuf::from).collect::<Vec<_>>();

    let model = ModelSlot::empty();
    let model_path = config.model_path()?.clone();
    let input_shape = ResizeOptions::default().tensor_shape();
    let loader = model.load_in_background("hand landmark", move || {
        let network = NeuralNetwork::from_path(&model_path)?.load()?;
        network.check_input(&input_shape)?;
        log::debug!("hand landmark network has {} outputs", network.num_outputs());
        Ok(network)
    })?;

    if images.is_empty() {
        match video::permission() {
            Permission::Granted => {}
            Permission::Denied => {
                bail!("camera access denied (is the user in the `video` group?)")
            }
            Permission::NoDevice => bail!("no camera found"),
        }
    } else {
        // A short clip would otherwise end before the model is ready.
        if let Err(payload) = loader.join() {
            resume_unwind(payload);
        }
        if !model.is_loaded() {
            bail!("failed to load the hand landmark model");
        }
    }

    let (ui_tx, ui_rx) = ui::channel();
    let processor = FrameProcessor::new(model, ui_tx, config.display)
        .decision_params(config.decision_params())
        .spawn()?;

    let camera_config = config.clone();
    let camera = thread::Builder::new()
        .name("camera".into())
        .spawn(move || -> anyhow::Result<CameraStats> {
            let mut source = open_source(&camera_config, &images)?;
            run_camera(&mut source, processor)
        })?;

    let mut label = None::<String>;
    let mut latest = UiState::no_hand();
    loop {
        match ui_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(state) => {
                if label.as_deref() != Some(&state.label) {
                    log::info!("{}", state.label);
                    label = Some(state.label.clone());
                    if let Some(path) = &config.snapshot {
                        save_snapshot(path, &config, &state)?;
                    }
                }
                latest = state;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = match camera.join() {
        Ok(res) => res?,
        Err(payload) => resume_unwind(payload),
    };
    log::info!(
        "done: {} frames processed, {} dropped",
        stats.submitted,
        stats.dropped
    );
    if let Some(path) = &config.snapshot {
        save_snapshot(path, &config, &latest)?;
    }
    Ok(())
}

fn open_source(config: &Config, images: &[PathBuf]) -> anyhow::Result<Box<dyn FrameSource>> {
    if !images.is_empty() {
        return Ok(Box::new(StillImages::open(images)?.fps(config.fps)));
    }

    let mut options = WebcamOptions::default()
        .resolution(config.display)
        .fps(config.fps)
        .prefer(config.prefer);
    if let Some(name) = &config.webcam_name {
        options = options.name(name.clone());
    }
    let webcam = Webcam::open(options).context("failed to open webcam")?;
    Ok(Box::new(webcam))
}

fn save_snapshot(path: &Path, config: &Config, state: &UiState) -> anyhow::Result<()> {
    let mut image = RgbImage::new(config.display.width(), config.display.height());
    overlay::draw(&mut image, state);
    image
        .save(path)
        .with_context(|| format!("failed to write snapshot to {}", path.display()))
}
