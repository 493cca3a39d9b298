//! Stereo-cam-capture binary: streams the stereo camera for as long as it is attached.

use stereo_cam_capture::config::FRAME_RATE;
use stereo_cam_capture::{ApplicationError, ErrorValue, FramePipeline, GrayView, StereoCamera, TracePresenter};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run() {
        error!(%err, "stereo capture stopped");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ErrorValue> {
    let mut pairs = 0u64;
    let pipeline = FramePipeline::new(
        move |left: &mut GrayView<'_>, right: &mut GrayView<'_>| -> Result<(), ApplicationError> {
            pairs += 1;
            // Roughly once a second.
            if pairs % u64::from(FRAME_RATE) == 0 {
                debug!(pairs, left = left.mean(), right = right.mean(), "stereo pairs received");
            }
            Ok(())
        },
        TracePresenter,
    );
    let camera = StereoCamera::open(pipeline)?;
    info!(state = ?camera.state(), "waiting for events");

    loop {
        camera.main_loop()?;
    }
}
