use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::landmark::Skeleton;
use super::synthetic;

/// 検出器が1フレームで返した結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFrame {
    /// 検出器クロックのタイムスタンプ（ミリ秒）
    pub timestamp_ms: u64,
    /// 0〜2人分の骨格
    #[serde(default)]
    pub skeletons: Vec<Skeleton>,
}

/// ランドマーク供給源
///
/// カメラ + 検出器、記録ファイルの再生、合成データなど。
pub trait LandmarkSource {
    /// 次のフレーム。新しいフレームがなければ None
    fn next_frame(&mut self) -> Option<DetectedFrame>;
}

/// タイムスタンプが進んでいないフレームを捨てるゲート
#[derive(Debug, Default, Clone)]
pub struct FrameGate {
    last_timestamp: Option<u64>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 処理すべき新しいフレームなら true
    pub fn accept(&mut self, timestamp_ms: u64) -> bool {
        match self.last_timestamp {
            Some(last) if timestamp_ms <= last => false,
            _ => {
                self.last_timestamp = Some(timestamp_ms);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_timestamp = None;
    }
}

/// JSONに保存されたフレーム列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFile {
    pub frames: Vec<DetectedFrame>,
}

/// 記録済みフレームの再生。ループ時はタイムスタンプを単調増加させ続ける
pub struct ReplaySource {
    frames: Vec<DetectedFrame>,
    cursor: usize,
    looping: bool,
    loop_offset_ms: u64,
}

impl ReplaySource {
    pub fn new(frames: Vec<DetectedFrame>, looping: bool) -> Self {
        Self {
            frames,
            cursor: 0,
            looping,
            loop_offset_ms: 0,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P, looping: bool) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let replay: ReplayFile =
            serde_json::from_str(&content).context("Failed to parse replay file")?;
        anyhow::ensure!(!replay.frames.is_empty(), "Replay file has no frames");
        Ok(Self::new(replay.frames, looping))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl LandmarkSource for ReplaySource {
    fn next_frame(&mut self) -> Option<DetectedFrame> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return None;
            }
            // 1周分の長さ + 1フレームぶんずらして次の周へ
            let first = self.frames.first().map_or(0, |f| f.timestamp_ms);
            let last = self.frames.last().map_or(0, |f| f.timestamp_ms);
            self.loop_offset_ms += last.saturating_sub(first) + 1;
            self.cursor = 0;
        }
        let mut frame = self.frames[self.cursor].clone();
        frame.timestamp_ms += self.loop_offset_ms;
        self.cursor += 1;
        Some(frame)
    }
}

/// 手続き的に踊る骨格を生成するソース
pub struct SyntheticSource {
    actors: usize,
    frame_interval_ms: u64,
    timestamp_ms: u64,
}

impl SyntheticSource {
    pub fn new(actors: usize, fps: u32) -> Self {
        Self {
            actors: actors.min(2),
            frame_interval_ms: (1000 / fps.max(1)) as u64,
            timestamp_ms: 0,
        }
    }

    pub fn set_actors(&mut self, actors: usize) {
        self.actors = actors.min(2);
    }
}

impl LandmarkSource for SyntheticSource {
    fn next_frame(&mut self) -> Option<DetectedFrame> {
        self.timestamp_ms += self.frame_interval_ms;
        let t = self.timestamp_ms as f32 / 1000.0;
        let skeletons = (0..self.actors)
            .map(|slot| {
                let offset = if self.actors == 2 { slot as f32 * 0.4 - 0.2 } else { 0.0 };
                synthetic::dancer(t + slot as f32 * 0.7, offset)
            })
            .collect();
        Some(DetectedFrame {
            timestamp_ms: self.timestamp_ms,
            skeletons,
        })
    }
}
