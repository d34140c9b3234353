//! End-to-end tests running still images through the threaded pipeline.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use handmark::{
    decision::NO_HAND_LABEL,
    nn::{tensor::Tensor, LandmarkModel, ModelSlot, Outputs},
    pipeline::{run_camera, FrameProcessor, FrameWorker},
    resolution::Resolution,
    ui,
    video::{still::StillImages, Frame},
};
use image::RgbImage;

/// Reports a hand whose landmarks all sit in the center of the 224x224 input.
struct CenteredHand {
    presence: f32,
    handedness: f32,
}

impl LandmarkModel for CenteredHand {
    fn infer(&self, input: &Tensor) -> anyhow::Result<Outputs> {
        assert_eq!(input.shape(), [1, 224, 224, 3]);
        Ok([
            Tensor::from_iter(&[1, 63], (0..63).map(|i| if i % 3 == 2 { 0.0 } else { 112.0 })),
            Tensor::from(self.presence),
            Tensor::from(self.handedness),
        ]
        .into_iter()
        .collect())
    }
}

/// Hands `frame` to the worker, waiting for it to become idle instead of dropping the frame.
fn submit(worker: &mut FrameWorker, mut frame: Frame) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while let Err(f) = worker.try_submit(frame) {
        assert!(Instant::now() < deadline, "frame processor never became idle");
        frame = f;
        thread::sleep(Duration::from_millis(1));
    }
}

fn frames(count: usize) -> Vec<RgbImage> {
    (0..count)
        .map(|_| RgbImage::from_fn(32, 32, |_, _| image::Rgb([fastrand::u8(..), 0, 0])))
        .collect()
}

#[test]
fn still_images_reach_the_ui() {
    let (tx, rx) = ui::channel();
    let model = ModelSlot::loaded(CenteredHand {
        presence: 0.8,
        handedness: 0.1,
    });
    let worker = FrameProcessor::new(model, tx, Resolution::new(448, 224))
        .spawn()
        .unwrap();

    let mut source = StillImages::new(frames(20)).fps(50);
    let stats = run_camera(&mut source, worker).unwrap();

    assert_eq!(stats.submitted + stats.dropped, 20);
    assert!(stats.submitted >= 1);

    let ui = rx.latest().expect("no UI update received");
    assert_eq!(ui.label, "Left");
    assert_eq!(ui.points.len(), 21);
    for p in &ui.points {
        approx::assert_relative_eq!(p.x, 224.0);
        approx::assert_relative_eq!(p.y, 112.0);
    }
}

#[test]
fn absent_hand_clears_the_overlay() {
    let (tx, rx) = ui::channel();
    let model = ModelSlot::loaded(CenteredHand {
        presence: 0.1,
        handedness: 0.9,
    });
    let worker = FrameProcessor::new(model, tx, Resolution::RES_720P)
        .spawn()
        .unwrap();
    run_camera(&mut StillImages::new(frames(10)).fps(50), worker).unwrap();

    let ui = rx.latest().expect("no UI update received");
    assert_eq!(ui.label, NO_HAND_LABEL);
    assert!(ui.points.is_empty());
}

#[test]
fn nothing_is_posted_before_the_model_loads() {
    let (tx, rx) = ui::channel();
    let model = ModelSlot::<CenteredHand>::empty();
    let worker = FrameProcessor::new(model.clone(), tx, Resolution::RES_720P)
        .spawn()
        .unwrap();
    let stats = run_camera(&mut StillImages::new(frames(5)).fps(100), worker).unwrap();

    assert_eq!(stats.submitted + stats.dropped, 5);
    assert!(!model.is_loaded());
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(10)),
        Err(ui::RecvTimeoutError::Disconnected)
    );
}

#[test]
fn dwell_fires_once_per_episode() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let (tx, _rx) = ui::channel();
    let model = ModelSlot::loaded(CenteredHand {
        presence: 0.9,
        handedness: 0.9,
    });
    let mut worker = FrameProcessor::new(model, tx, Resolution::RES_720P)
        .on_dwell(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .spawn()
        .unwrap();

    // 70 frames captured 20 ms apart span 1.38 seconds.
    let start = Instant::now();
    for (n, image) in frames(70).into_iter().enumerate() {
        let captured_at = start + Duration::from_millis(20 * n as u64);
        submit(&mut worker, Frame::new(image, captured_at));
    }
    worker.finish().unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

struct Broken;

impl LandmarkModel for Broken {
    fn infer(&self, _: &Tensor) -> anyhow::Result<Outputs> {
        anyhow::bail!("model crashed")
    }
}

#[test]
fn inference_failure_stops_the_camera() {
    let (tx, rx) = ui::channel();
    let worker = FrameProcessor::new(ModelSlot::loaded(Broken), tx, Resolution::RES_720P)
        .spawn()
        .unwrap();

    let err = run_camera(&mut StillImages::new(frames(10)).fps(100), worker).unwrap_err();
    assert!(format!("{err:#}").contains("model crashed"), "{err:#}");
    assert_eq!(rx.latest(), None);
}
