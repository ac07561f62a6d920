//! detectd - object detection service
//!
//! Serves one-shot upload detection, model status, and a live camera feed
//! over HTTP until Ctrl-C.

use anyhow::Result;
use std::sync::{mpsc, Arc};

use live_detect::{
    api::{ApiServer, AppState},
    config::DetectdConfig,
    Detector, DetectorConfig, LiveSession,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DetectdConfig::load()?;
    log::info!(
        "detectd {} starting: backend={:?} weights={} classes={}",
        env!("CARGO_PKG_VERSION"),
        config.model.backend,
        config.model.weights_path.display(),
        config.model.classes_path.display()
    );

    let detector = Arc::new(
        Detector::new(config.model.loader(DetectorConfig::UPLOAD.input_size))
            .with_classes_path(config.model.classes_path.clone()),
    );
    // A failed load leaves the service up; /status retries it.
    match detector.load() {
        Ok(status) => log::info!("{}", status.message()),
        Err(err) => log::error!("Error loading model: {:#}", err),
    }

    let session = Arc::new(LiveSession::new(config.session_opener()));
    let state = AppState {
        detector,
        session: session.clone(),
    };
    let api_handle = ApiServer::new(config.api_config(), state).spawn()?;
    log::info!("detectd serving on http://{}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("detectd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    session.stop();
    api_handle.stop()?;

    Ok(())
}
