//! 2人分のポーズ記録と、記録中のゴースト再生
//!
//! 状態は `phase` ひとつだけで持つので、記録セッションは同時に1つしか走らない。
//! 時刻は呼び出し側が `now` で渡す（テストでは仮想時計を使う）。

use std::time::{Duration, Instant};

use crate::config::RecordingConfig;
use crate::error::{SessionError, SessionResult};
use crate::pose::{flatten, PoseVector, Skeleton};
use crate::transformer::TrainingPair;

/// 記録フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RecordingPerson1,
    RecordingPerson2,
    /// 2人同時。両方が映っているフレームだけ記録する
    RecordingBoth,
}

impl Phase {
    pub fn is_recording(self) -> bool {
        self != Phase::Idle
    }
}

/// 追記専用のポーズ列。タイムスタンプが進まないフレームは捨てる
#[derive(Debug, Clone, Default)]
pub struct RecordingBuffer {
    samples: Vec<PoseVector>,
    last_timestamp_ms: Option<u64>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追記できたら true
    pub fn push(&mut self, vector: PoseVector, timestamp_ms: u64) -> bool {
        if !self.accepts(timestamp_ms) {
            return false;
        }
        self.samples.push(vector);
        self.last_timestamp_ms = Some(timestamp_ms);
        true
    }

    pub fn accepts(&self, timestamp_ms: u64) -> bool {
        self.last_timestamp_ms.map_or(true, |last| timestamp_ms > last)
    }

    pub fn samples(&self) -> &[PoseVector] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&PoseVector> {
        self.samples.get(index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_timestamp_ms = None;
    }
}

/// 正規化時間による再生位置
///
/// `index = floor(elapsed / duration * len)` を `len - 1` で頭打ちにする。
#[derive(Debug, Clone, Copy)]
pub struct Playback {
    started: Instant,
    duration: Duration,
    len: usize,
}

impl Playback {
    pub fn new(started: Instant, duration: Duration, len: usize) -> Self {
        Self {
            started,
            duration,
            len,
        }
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }

    /// 表示するフレーム。終了後と空のときは None
    pub fn frame_index(&self, now: Instant) -> Option<usize> {
        if self.len == 0 || self.is_finished(now) {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let progress = elapsed / self.duration.as_secs_f64().max(f64::EPSILON);
        let index = (progress * self.len as f64).floor() as usize;
        Some(index.min(self.len - 1))
    }
}

/// 記録状態の変化
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Started(Phase),
    /// person1 の記録が終わってそのまま person2 へ
    Advanced { from: Phase, to: Phase },
    Finished {
        phase: Phase,
        person1: usize,
        person2: usize,
    },
    /// 学習に十分なデータが揃った
    Ready { person1: usize, person2: usize },
}

pub struct RecordingController {
    phase: Phase,
    deadline: Option<Instant>,
    /// `start` で長さを指定しなかったときの長さ
    default_duration: Duration,
    /// 進行中の記録の長さ
    take_duration: Duration,
    /// ゴースト再生はこの長さに合わせる
    person1_duration: Option<Duration>,
    min_samples: usize,
    auto_advance: bool,
    person1: RecordingBuffer,
    person2: RecordingBuffer,
    playback: Option<Playback>,
}

impl RecordingController {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            phase: Phase::Idle,
            deadline: None,
            default_duration: config.duration(),
            take_duration: config.duration(),
            person1_duration: None,
            min_samples: config.min_samples,
            auto_advance: config.auto_advance,
            person1: RecordingBuffer::new(),
            person2: RecordingBuffer::new(),
            playback: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn person1(&self) -> &RecordingBuffer {
        &self.person1
    }

    pub fn person2(&self) -> &RecordingBuffer {
        &self.person2
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// 記録を開始する
    ///
    /// - 2人映っていれば `RecordingBoth`（両バッファを作り直す）
    /// - person1 だけ記録済みなら `RecordingPerson2`
    /// - それ以外は最初から `RecordingPerson1`
    ///
    /// `duration` はこの記録だけに効く。
    pub fn start(
        &mut self,
        now: Instant,
        live_actors: usize,
        duration: Option<Duration>,
    ) -> SessionResult<Phase> {
        if self.phase.is_recording() {
            return Err(SessionError::RecordingInProgress(self.phase));
        }
        let take = duration.unwrap_or(self.default_duration);

        let phase = if live_actors >= 2 {
            self.person1.clear();
            self.person2.clear();
            Phase::RecordingBoth
        } else if !self.person1.is_empty() && self.person2.is_empty() {
            Phase::RecordingPerson2
        } else {
            self.person1.clear();
            self.person2.clear();
            Phase::RecordingPerson1
        };

        self.enter(phase, now, take);
        Ok(phase)
    }

    fn enter(&mut self, phase: Phase, now: Instant, take: Duration) {
        self.phase = phase;
        self.deadline = Some(now + take);
        self.take_duration = take;
        self.playback = None;
        match phase {
            Phase::RecordingPerson1 | Phase::RecordingBoth => self.person1_duration = Some(take),
            Phase::RecordingPerson2 => {
                let original = self.person1_duration.unwrap_or(take);
                self.playback = Some(Playback::new(now, original, self.person1.len()));
            }
            Phase::Idle => {}
        }
    }

    /// 今フレームの骨格を記録する。追記したサンプル数を返す
    pub fn record(&mut self, skeletons: &[Skeleton], timestamp_ms: u64) -> usize {
        match self.phase {
            Phase::Idle => 0,
            Phase::RecordingPerson1 => match skeletons.first() {
                Some(s) => self.person1.push(flatten(s), timestamp_ms) as usize,
                None => 0,
            },
            Phase::RecordingPerson2 => match skeletons.first() {
                Some(s) => self.person2.push(flatten(s), timestamp_ms) as usize,
                None => 0,
            },
            Phase::RecordingBoth => {
                // 片方しか映っていないフレームは対応が崩れるので捨てる
                let [a, b, ..] = skeletons else { return 0 };
                if !self.person1.accepts(timestamp_ms) || !self.person2.accepts(timestamp_ms) {
                    return 0;
                }
                self.person1.push(flatten(a), timestamp_ms);
                self.person2.push(flatten(b), timestamp_ms);
                2
            }
        }
    }

    /// 締め切りを確認して状態を進める
    pub fn tick(&mut self, now: Instant) -> Vec<RecordingEvent> {
        let mut events = Vec::new();
        let Some(deadline) = self.deadline else {
            return events;
        };
        if now < deadline {
            return events;
        }

        let finished = self.phase;
        if finished == Phase::RecordingPerson1 && self.auto_advance {
            self.enter(Phase::RecordingPerson2, now, self.take_duration);
            events.push(RecordingEvent::Advanced {
                from: finished,
                to: Phase::RecordingPerson2,
            });
            return events;
        }

        self.phase = Phase::Idle;
        self.deadline = None;
        self.playback = None;
        events.push(RecordingEvent::Finished {
            phase: finished,
            person1: self.person1.len(),
            person2: self.person2.len(),
        });
        if finished != Phase::RecordingPerson1 && self.has_training_data() {
            events.push(RecordingEvent::Ready {
                person1: self.person1.len(),
                person2: self.person2.len(),
            });
        }
        events
    }

    /// 両バッファとも最小サンプル数を超えている
    pub fn has_training_data(&self) -> bool {
        self.person1.len() > self.min_samples && self.person2.len() > self.min_samples
    }

    /// 学習ペアを作る
    ///
    /// 長さが違う場合は時間で正規化して対応付ける:
    /// person2 の j 番目 ↔ person1 の `floor(j * len1 / len2)` 番目。
    pub fn training_pairs(&self) -> SessionResult<Vec<TrainingPair>> {
        if !self.has_training_data() {
            return Err(SessionError::InsufficientData {
                person1: self.person1.len(),
                person2: self.person2.len(),
                minimum: self.min_samples,
            });
        }
        let len1 = self.person1.len();
        let len2 = self.person2.len();
        Ok(self
            .person2
            .samples()
            .iter()
            .enumerate()
            .map(|(j, output)| TrainingPair {
                input: self.person1.samples()[(j * len1 / len2).min(len1 - 1)].clone(),
                output: output.clone(),
            })
            .collect())
    }

    /// person2 の記録中に重ねる person1 のポーズ
    pub fn playback_frame(&self, now: Instant) -> Option<&PoseVector> {
        if self.phase != Phase::RecordingPerson2 {
            return None;
        }
        let index = self.playback.as_ref()?.frame_index(now)?;
        self.person1.get(index)
    }

    /// 記録の残り時間
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// バッファと状態を無条件に破棄
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.deadline = None;
        self.playback = None;
        self.person1_duration = None;
        self.person1.clear();
        self.person2.clear();
    }
}
