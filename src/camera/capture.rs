use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CaptureConfig;
use crate::error::SessionError;
use crate::pose::{preprocess_for_landmarker, DetectedFrame, LandmarkSource, PoseLandmarker};

/// 検出スレッドから溜めておく結果の数
const RESULT_QUEUE: usize = 2;

/// 撮影だけを受け持つ VideoCapture のラッパー
pub struct OpenCvCamera {
    device: VideoCapture,
    index: i32,
    frame_size: (u32, u32),
}

impl OpenCvCamera {
    /// 希望の解像度で開く。実際の解像度はドライバ次第
    pub fn open(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut device = VideoCapture::new(index, videoio::CAP_ANY)
            .with_context(|| format!("camera {}: VideoCapture failed", index))?;
        anyhow::ensure!(device.is_opened()?, "camera {}: device did not open", index);

        for (prop, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, width as f64),
            (videoio::CAP_PROP_FRAME_HEIGHT, height as f64),
            // 古いフレームを溜めない
            (videoio::CAP_PROP_BUFFERSIZE, 1.0),
        ] {
            device.set(prop, value)?;
        }

        let frame_size = (
            device.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
            device.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
        );
        Ok(Self {
            device,
            index,
            frame_size,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.frame_size
    }

    /// 次の BGR フレーム
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let grabbed = self
            .device
            .read(&mut frame)
            .with_context(|| format!("camera {}: read failed", self.index))?;
        anyhow::ensure!(grabbed && !frame.empty(), "camera {}: no frame", self.index);
        Ok(frame)
    }
}

/// 別スレッドで撮影と姿勢検出を行うランドマークソース
///
/// 無効化すると新しいフレームは撮らないが、すでにキューにある検出結果は
/// `next_frame` でそのまま受け取れる。
pub struct CameraLandmarkSource {
    results: Receiver<DetectedFrame>,
    enabled: Arc<AtomicBool>,
    resolution: (u32, u32),
    _worker: thread::JoinHandle<()>,
}

impl CameraLandmarkSource {
    /// カメラとモデルを開いて検出スレッドを起動
    pub fn start(config: &CaptureConfig) -> Result<Self, SessionError> {
        let camera = OpenCvCamera::open(config.camera_index, config.width, config.height)
            .map_err(|e| SessionError::CaptureUnavailable(format!("{:#}", e)))?;
        let detector = PoseLandmarker::new(&config.model_path, config.presence_threshold)
            .map_err(|e| SessionError::CaptureUnavailable(format!("{:#}", e)))?;

        let resolution = camera.resolution();
        let enabled = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::sync_channel(RESULT_QUEUE);
        let enabled_ref = enabled.clone();
        let worker = thread::spawn(move || detection_loop(camera, detector, enabled_ref, tx));

        Ok(Self {
            results: rx,
            enabled,
            resolution,
            _worker: worker,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// 無効化中のポーリング間隔
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// 読み込みが続けて失敗したときの待ち時間。10ms から倍々で 160ms まで
fn read_retry_delay(failures: u32) -> Duration {
    IDLE_WAIT * (1u32 << failures.saturating_sub(1).min(4))
}

fn detection_loop(
    mut camera: OpenCvCamera,
    mut detector: PoseLandmarker,
    enabled: Arc<AtomicBool>,
    tx: SyncSender<DetectedFrame>,
) {
    let started = Instant::now();
    let mut failures = 0u32;
    loop {
        if !enabled.load(Ordering::Acquire) {
            thread::sleep(IDLE_WAIT);
            continue;
        }
        let frame = match camera.read_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(_) => {
                // 抜かれたカメラで空回りしない
                failures = failures.saturating_add(1);
                thread::sleep(read_retry_delay(failures));
                continue;
            }
        };
        let timestamp_ms = started.elapsed().as_millis() as u64;
        let skeletons = match preprocess_for_landmarker(&frame).and_then(|(input, letterbox)| detector.detect(input, &letterbox)) {
            Ok(skeletons) => skeletons,
            Err(_) => continue,
        };
        match tx.try_send(DetectedFrame {
            timestamp_ms,
            skeletons,
        }) {
            // 描画側が追いついていなければ捨てる
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
}

impl LandmarkSource for CameraLandmarkSource {
    /// キューに溜まった中で最新の結果
    fn next_frame(&mut self) -> Option<DetectedFrame> {
        let mut latest = None;
        while let Ok(frame) = self.results.try_recv() {
            latest = Some(frame);
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_retry_delay_backs_off() {
        assert_eq!(read_retry_delay(1), Duration::from_millis(10));
        assert_eq!(read_retry_delay(2), Duration::from_millis(20));
        assert_eq!(read_retry_delay(3), Duration::from_millis(40));
        assert_eq!(read_retry_delay(5), Duration::from_millis(160));
        assert_eq!(read_retry_delay(u32::MAX), Duration::from_millis(160));
        // 失敗が続く限り 0 にはならない
        assert!((1..100).all(|n| read_retry_delay(n) >= IDLE_WAIT));
    }
}
