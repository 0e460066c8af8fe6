//! 1ユーザー分の状態をまとめて持つセッション
//!
//! 検出結果は `frame_detected` で入り、描画は `tick` ごとにビルダーの
//! 等値面として出る。学習だけは別スレッドで走り、`tick` が結果を拾う。

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::blob::{BlobBuilder, SurfaceMesh};
use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::pose::{flatten, unflatten, FrameGate, PoseVector, Skeleton, SkeletonSmoother};
use crate::record::{Phase, RecordingController, RecordingEvent};
use crate::transformer::PoseTransformer;

/// 描画モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 検出した骨格をそのまま描く
    Live,
    /// 先頭の骨格と、そこから予測したパートナーを描く
    Dance,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingStatus {
    Untrained,
    Training,
    Ready,
    Failed(String),
}

/// バイナリ側でログに出す状態変化
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Recording(RecordingEvent),
    TrainingStarted { pairs: usize },
    TrainingFinished,
    TrainingFailed(String),
    ModeChanged(Mode),
    Reset,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Recording(RecordingEvent::Started(phase)) => write!(f, "Recording started: {:?}", phase),
            SessionEvent::Recording(RecordingEvent::Advanced { from, to }) => {
                write!(f, "Recording advanced: {:?} -> {:?}", from, to)
            }
            SessionEvent::Recording(RecordingEvent::Finished { phase, person1, person2 }) => write!(
                f,
                "Recording finished: {:?} (person1={}, person2={})",
                phase, person1, person2
            ),
            SessionEvent::Recording(RecordingEvent::Ready { person1, person2 }) => {
                write!(f, "Training data ready: person1={}, person2={}", person1, person2)
            }
            SessionEvent::TrainingStarted { pairs } => write!(f, "Training started on {} pairs", pairs),
            SessionEvent::TrainingFinished => write!(f, "Training finished"),
            SessionEvent::TrainingFailed(message) => write!(f, "Training failed: {}", message),
            SessionEvent::ModeChanged(mode) => write!(f, "Mode: {:?}", mode),
            SessionEvent::Reset => write!(f, "Session reset"),
        }
    }
}

type TrainingResult<M> = SessionResult<M>;

pub struct Session<T: PoseTransformer> {
    transformer: Arc<T>,
    recorder: RecordingController,
    builder: BlobBuilder,
    smoother: SkeletonSmoother,
    gate: FrameGate,
    model: Option<T::Model>,
    training: Option<Receiver<TrainingResult<T::Model>>>,
    last_failure: Option<String>,
    mode: Mode,
    current: Vec<Skeleton>,
    displayed: Vec<Skeleton>,
    events: Vec<SessionEvent>,
}

impl<T: PoseTransformer> Session<T> {
    pub fn new(config: &Config, transformer: T) -> Self {
        Self {
            transformer: Arc::new(transformer),
            recorder: RecordingController::new(&config.recording),
            builder: BlobBuilder::from_config(&config.blob),
            smoother: SkeletonSmoother::from_config(&config.smoothing),
            gate: FrameGate::new(),
            model: None,
            training: None,
            last_failure: None,
            mode: Mode::Live,
            current: Vec::new(),
            displayed: Vec::new(),
            events: Vec::new(),
        }
    }

    /// 新しい検出結果を受け取る。タイムスタンプが進んでいなければ捨てて false
    pub fn frame_detected(&mut self, skeletons: &[Skeleton], timestamp_ms: u64) -> bool {
        if !self.gate.accept(timestamp_ms) {
            return false;
        }
        let skeletons = self.smoother.apply(skeletons);
        self.recorder.record(&skeletons, timestamp_ms);
        self.current = skeletons;
        true
    }

    /// 1フレーム分進める: 学習結果の回収 → 記録の締め切り → 等値面の更新
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        self.poll_training();

        for event in self.recorder.tick(now) {
            let ready = matches!(event, RecordingEvent::Ready { .. });
            self.events.push(SessionEvent::Recording(event));
            if ready {
                if let Err(err) = self.train() {
                    self.events.push(SessionEvent::TrainingFailed(err.to_string()));
                }
            }
        }

        self.displayed = self.compose(now);
        self.builder.update(&self.displayed);

        std::mem::take(&mut self.events)
    }

    /// 今フレームに描く骨格
    fn compose(&self, now: Instant) -> Vec<Skeleton> {
        let mut skeletons = self.current.clone();

        // person2 の記録中は person1 をゴーストとして重ねる
        if let Some(ghost) = self.recorder.playback_frame(now) {
            skeletons.push(unflatten(ghost));
        }

        if self.mode == Mode::Dance {
            if let (Some(model), Some(lead)) = (self.model.as_ref(), self.current.first()) {
                if let Ok(partner) = self.transformer.predict(model, &flatten(lead)) {
                    skeletons.truncate(1);
                    skeletons.push(unflatten(&partner));
                }
            }
        }

        skeletons
    }

    /// 記録を開始する。映っている人数で1人ずつ/2人同時を選ぶ
    pub fn start_recording(&mut self, now: Instant, duration: Option<Duration>) -> SessionResult<Phase> {
        if self.training.is_some() {
            return Err(SessionError::TrainingInProgress);
        }
        let phase = self.recorder.start(now, self.current.len(), duration)?;
        self.events.push(SessionEvent::Recording(RecordingEvent::Started(phase)));
        Ok(phase)
    }

    /// 記録済みデータで学習を始める。データ不足なら何もしない
    pub fn train(&mut self) -> SessionResult<()> {
        if self.training.is_some() {
            return Err(SessionError::TrainingInProgress);
        }
        let pairs = self.recorder.training_pairs()?;
        let count = pairs.len();
        let transformer = Arc::clone(&self.transformer);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = transformer.train(&pairs);
            // セッションがリセットされていれば受け手はもう居ない
            let _ = tx.send(result);
        });
        self.training = Some(rx);
        self.last_failure = None;
        self.events.push(SessionEvent::TrainingStarted { pairs: count });
        Ok(())
    }

    fn poll_training(&mut self) {
        let Some(rx) = self.training.as_ref() else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(SessionError::Training("training thread exited".to_string())),
        };
        self.finish_training(result);
    }

    fn finish_training(&mut self, result: TrainingResult<T::Model>) {
        self.training = None;
        match result {
            Ok(model) => {
                self.model = Some(model);
                self.events.push(SessionEvent::TrainingFinished);
            }
            Err(err) => {
                let message = err.to_string();
                self.last_failure = Some(message.clone());
                self.events.push(SessionEvent::TrainingFailed(message));
            }
        }
    }

    /// 学習が終わるまで待つ（ヘッドレス実行とテスト用）。終わったら true
    pub fn wait_for_training(&mut self, timeout: Duration) -> bool {
        let Some(rx) = self.training.as_ref() else {
            return false;
        };
        let result = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => {
                Err(SessionError::Training("training thread exited".to_string()))
            }
        };
        self.finish_training(result);
        true
    }

    /// バッファ・モデル・学習中の結果をすべて破棄
    pub fn reset(&mut self) {
        self.recorder.reset();
        self.model = None;
        self.training = None;
        self.last_failure = None;
        self.smoother.reset();
        if self.mode != Mode::Live {
            self.mode = Mode::Live;
            self.events.push(SessionEvent::ModeChanged(Mode::Live));
        }
        self.events.push(SessionEvent::Reset);
    }

    /// 予測に使えるモデルがある
    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn training_status(&self) -> TrainingStatus {
        if self.training.is_some() {
            TrainingStatus::Training
        } else if self.model.is_some() {
            TrainingStatus::Ready
        } else if let Some(message) = &self.last_failure {
            TrainingStatus::Failed(message.clone())
        } else {
            TrainingStatus::Untrained
        }
    }

    pub fn start_dance(&mut self) -> SessionResult<()> {
        if !self.is_ready() {
            return Err(SessionError::Untrained);
        }
        if self.mode != Mode::Dance {
            self.mode = Mode::Dance;
            self.events.push(SessionEvent::ModeChanged(Mode::Dance));
        }
        Ok(())
    }

    pub fn stop_dance(&mut self) {
        if self.mode != Mode::Live {
            self.mode = Mode::Live;
            self.events.push(SessionEvent::ModeChanged(Mode::Live));
        }
    }

    pub fn predict(&self, input: &PoseVector) -> SessionResult<PoseVector> {
        let model = self.model.as_ref().ok_or(SessionError::Untrained)?;
        self.transformer.predict(model, input)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.recorder.phase()
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    pub fn builder(&self) -> &BlobBuilder {
        &self.builder
    }

    pub fn mesh(&self) -> &SurfaceMesh {
        self.builder.mesh()
    }

    /// 直近の検出結果（平滑化後）
    pub fn current_skeletons(&self) -> &[Skeleton] {
        &self.current
    }

    /// 直近の tick で描いた骨格（ゴースト・予測を含む）
    pub fn displayed_skeletons(&self) -> &[Skeleton] {
        &self.displayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::synthetic::dancer;
    use crate::transformer::{MlpTransformer, TrainingPair};
    use crate::config::TransformerConfig;

    /// 平均の平行移動だけを覚える学習器
    struct ShiftTransformer;

    impl PoseTransformer for ShiftTransformer {
        type Model = f32;

        fn train(&self, pairs: &[TrainingPair]) -> SessionResult<f32> {
            let sum: f32 = pairs
                .iter()
                .map(|p| p.output.as_slice()[0] - p.input.as_slice()[0])
                .sum();
            Ok(sum / pairs.len() as f32)
        }

        fn predict(&self, model: &f32, input: &PoseVector) -> SessionResult<PoseVector> {
            let shifted = input
                .as_slice()
                .chunks_exact(2)
                .flat_map(|xy| [xy[0] + model, xy[1]])
                .collect();
            PoseVector::from_vec(shifted)
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.blob.resolution = 16;
        config.blob.interpolation_points = 2;
        config.recording.duration_secs = 1.0;
        config.recording.min_samples = 3;
        config
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_stale_frames_are_skipped() {
        let mut session = Session::new(&config(), ShiftTransformer);
        assert!(session.frame_detected(&[dancer(0.0, 0.0)], 10));
        assert!(!session.frame_detected(&[dancer(0.0, 0.0), dancer(0.0, 0.2)], 10));
        assert_eq!(session.current_skeletons().len(), 1);
    }

    #[test]
    fn test_full_cycle() {
        let t0 = Instant::now();
        let mut session = Session::new(&config(), ShiftTransformer);
        let per_actor = session.builder().expected_ball_count();

        session.frame_detected(&[dancer(0.0, 0.0)], 1);
        assert_eq!(session.start_recording(t0, None).unwrap(), Phase::RecordingPerson1);

        for i in 0..10u64 {
            session.frame_detected(&[dancer(i as f32 * 0.1, -0.1)], 2 + i);
            session.tick(t0 + ms(i * 90));
        }
        assert_eq!(session.recorder().person1().len(), 10);

        let events = session.tick(t0 + ms(1000));
        assert!(events.contains(&SessionEvent::Recording(RecordingEvent::Advanced {
            from: Phase::RecordingPerson1,
            to: Phase::RecordingPerson2,
        })));

        // 本人 + person1 のゴースト
        for i in 0..5u64 {
            session.frame_detected(&[dancer(i as f32 * 0.1, 0.1)], 100 + i);
            session.tick(t0 + ms(1000 + i * 150));
            assert_eq!(session.displayed_skeletons().len(), 2);
            assert_eq!(session.builder().metaballs().len(), per_actor * 2);
        }

        let events = session.tick(t0 + ms(2000));
        assert!(events.contains(&SessionEvent::TrainingStarted { pairs: 5 }));
        assert_eq!(session.training_status(), TrainingStatus::Training);
        // ゴーストは消える
        assert_eq!(session.displayed_skeletons().len(), 1);

        assert!(session.wait_for_training(Duration::from_secs(5)));
        assert!(session.is_ready());

        let input = flatten(&dancer(0.0, 0.0));
        let output = session.predict(&input).unwrap();
        assert!((output.as_slice()[0] - input.as_slice()[0] - 0.2).abs() < 1e-4);

        session.start_dance().unwrap();
        let events = session.tick(t0 + ms(2100));
        assert!(events.contains(&SessionEvent::ModeChanged(Mode::Dance)));
        assert_eq!(session.displayed_skeletons().len(), 2);
        assert_eq!(session.builder().metaballs().len(), per_actor * 2);

        session.reset();
        assert!(!session.is_ready());
        assert_eq!(session.mode(), Mode::Live);
        assert!(matches!(session.start_dance(), Err(SessionError::Untrained)));
        assert!(matches!(session.predict(&input), Err(SessionError::Untrained)));
        assert!(session.recorder().person1().is_empty());
    }

    #[test]
    fn test_insufficient_data_is_reported() {
        let t0 = Instant::now();
        let mut session = Session::new(&config(), ShiftTransformer);
        session.frame_detected(&[dancer(0.0, 0.0)], 1);
        session.start_recording(t0, None).unwrap();
        session.frame_detected(&[dancer(0.1, 0.0)], 2);
        session.tick(t0 + ms(1000));
        session.frame_detected(&[dancer(0.2, 0.0)], 3);
        let events = session.tick(t0 + ms(2000));

        // Ready が来ないので学習は始まらない
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::TrainingStarted { .. })));
        assert!(matches!(session.train(), Err(SessionError::InsufficientData { .. })));
        assert_eq!(session.training_status(), TrainingStatus::Untrained);
    }

    #[test]
    fn test_recording_both_with_two_actors() {
        let t0 = Instant::now();
        let mut session = Session::new(&config(), ShiftTransformer);
        session.frame_detected(&[dancer(0.0, -0.2), dancer(0.0, 0.2)], 1);
        assert_eq!(session.start_recording(t0, None).unwrap(), Phase::RecordingBoth);
        assert!(matches!(
            session.start_recording(t0 + ms(10), None),
            Err(SessionError::RecordingInProgress(Phase::RecordingBoth))
        ));

        for i in 0..6u64 {
            session.frame_detected(&[dancer(0.0, -0.2), dancer(0.0, 0.2)], 2 + i);
        }
        let events = session.tick(t0 + ms(1000));
        assert!(events.contains(&SessionEvent::TrainingStarted { pairs: 6 }));
        assert!(session.wait_for_training(Duration::from_secs(5)));
        // 右側の人は 0.4 右にずれている
        let input = flatten(&dancer(0.0, 0.0));
        let output = session.predict(&input).unwrap();
        assert!((output.as_slice()[0] - input.as_slice()[0] - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_with_mlp_transformer() {
        let t0 = Instant::now();
        let mut cfg = config();
        cfg.transformer = TransformerConfig {
            epochs: 2,
            seed: Some(1),
            ..TransformerConfig::default()
        };
        let mut session = Session::new(&cfg, MlpTransformer::from_config(&cfg.transformer));
        session.frame_detected(&[dancer(0.0, -0.2), dancer(0.0, 0.2)], 1);
        session.start_recording(t0, None).unwrap();
        for i in 0..8u64 {
            let t = i as f32 * 0.1;
            session.frame_detected(&[dancer(t, -0.2), dancer(t, 0.2)], 2 + i);
        }
        session.tick(t0 + ms(1000));
        assert!(session.wait_for_training(Duration::from_secs(30)));
        assert_eq!(session.training_status(), TrainingStatus::Ready);
        let output = session.predict(&flatten(&dancer(0.3, 0.0))).unwrap();
        assert!(output.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_event_log_lines() {
        let event = SessionEvent::Recording(RecordingEvent::Advanced {
            from: Phase::RecordingPerson1,
            to: Phase::RecordingPerson2,
        });
        assert_eq!(event.to_string(), "Recording advanced: RecordingPerson1 -> RecordingPerson2");
        assert_eq!(SessionEvent::TrainingStarted { pairs: 12 }.to_string(), "Training started on 12 pairs");
        assert_eq!(SessionEvent::ModeChanged(Mode::Dance).to_string(), "Mode: Dance");
    }
}
