use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// フレームループの目標FPS
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// カメラの代わりに再生するランドマークJSON
    #[serde(default)]
    pub replay_file: Option<String>,
    /// 合成ソースの人数 (1〜2)
    #[serde(default = "default_synthetic_actors")]
    pub synthetic_actors: usize,
}

fn default_target_fps() -> u32 { 30 }
fn default_synthetic_actors() -> usize { 1 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            replay_file: None,
            synthetic_actors: default_synthetic_actors(),
        }
    }
}

/// 1種類のメタボールの強さと減衰
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct BallConfig {
    /// 場への影響の大きさ
    pub strength: f32,
    /// 影響がゼロになるまでの減衰量
    pub subtract: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    /// ボクセルグリッドの一辺のサンプル数
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    /// 等値面のしきい値
    #[serde(default = "default_isolation")]
    pub isolation: f32,
    /// 1フレームあたりの最大三角形数
    #[serde(default = "default_max_triangles")]
    pub max_triangles: usize,
    /// 四肢セグメントごとの中間点数 (2〜12)
    #[serde(default = "default_interpolation_points")]
    pub interpolation_points: usize,
    /// これ未満の可視度の関節は欠損扱い
    #[serde(default)]
    pub min_visibility: f32,
    /// ランドマークzの奥行きへの寄与（0で平面）
    #[serde(default)]
    pub depth_scale: f32,
    #[serde(default = "default_joint_ball")]
    pub joint: BallConfig,
    #[serde(default = "default_head_ball")]
    pub head: BallConfig,
    #[serde(default = "default_torso_ball")]
    pub torso: BallConfig,
    #[serde(default = "default_limb_ball")]
    pub limb: BallConfig,
}

fn default_resolution() -> usize { 48 }
fn default_isolation() -> f32 { 80.0 }
fn default_max_triangles() -> usize { 60_000 }
fn default_interpolation_points() -> usize { 6 }
fn default_joint_ball() -> BallConfig { BallConfig { strength: 0.05, subtract: 12.0 } }
fn default_head_ball() -> BallConfig { BallConfig { strength: 0.5, subtract: 12.0 } }
fn default_torso_ball() -> BallConfig { BallConfig { strength: 0.25, subtract: 12.0 } }
fn default_limb_ball() -> BallConfig { BallConfig { strength: 0.05, subtract: 12.0 } }

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            isolation: default_isolation(),
            max_triangles: default_max_triangles(),
            interpolation_points: default_interpolation_points(),
            min_visibility: 0.0,
            depth_scale: 0.0,
            joint: default_joint_ball(),
            head: default_head_ball(),
            torso: default_torso_ball(),
            limb: default_limb_ball(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    /// 1回の記録の長さ（秒）
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f32,
    /// 学習に必要な最小フレーム数（これを超える必要がある）
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// person1の記録後そのままperson2の記録に入る
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
}

fn default_duration_secs() -> f32 { 10.0 }
fn default_min_samples() -> usize { 10 }
fn default_auto_advance() -> bool { true }

impl RecordingConfig {
    /// 記録の長さ。負・無限大・NaN ならデフォルトの長さ
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f32(self.duration_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f32(default_duration_secs()))
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            min_samples: default_min_samples(),
            auto_advance: default_auto_advance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransformerConfig {
    /// 隠れ層のユニット数
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// 指定すると初期化とシャッフルが再現可能になる
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_hidden_layers() -> Vec<usize> { vec![128, 64, 32] }
fn default_epochs() -> usize { 50 }
fn default_batch_size() -> usize { 32 }
fn default_learning_rate() -> f32 { 0.001 }

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            hidden_layers: default_hidden_layers(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothingConfig {
    /// 移動平均の窓サイズ（1で無効）
    #[serde(default = "default_smoothing_window")]
    pub window: usize,
}

fn default_smoothing_window() -> usize { 1 }

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: default_smoothing_window(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default)]
    pub camera_index: i32,
    #[serde(default = "default_capture_width")]
    pub width: u32,
    #[serde(default = "default_capture_height")]
    pub height: u32,
    /// 33点ランドマークモデル
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// 人物フラグの閾値
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

fn default_capture_width() -> u32 { 640 }
fn default_capture_height() -> u32 { 480 }
fn default_model_path() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_presence_threshold() -> f32 { 0.5 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: default_capture_width(),
            height: default_capture_height(),
            model_path: default_model_path(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// 骨格線を重ねて描く
    #[serde(default = "default_show_skeleton")]
    pub show_skeleton: bool,
    #[serde(default = "default_view_size")]
    pub view_width: usize,
    #[serde(default = "default_view_size")]
    pub view_height: usize,
}

fn default_show_skeleton() -> bool { true }
fn default_view_size() -> usize { 720 }

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            show_skeleton: default_show_skeleton(),
            view_width: default_view_size(),
            view_height: default_view_size(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが無ければ None。あるのに読めない・不正ならエラー
    pub fn load_if_exists<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))
            .map(Some)
    }

    pub fn validate(&self) -> Result<()> {
        let blob = &self.blob;
        anyhow::ensure!(blob.resolution >= 4, "blob.resolution must be at least 4, got {}", blob.resolution);
        anyhow::ensure!(
            (2..=12).contains(&blob.interpolation_points),
            "blob.interpolation_points must be within 2..=12, got {}",
            blob.interpolation_points
        );
        for (name, ball) in [("joint", blob.joint), ("head", blob.head), ("torso", blob.torso), ("limb", blob.limb)] {
            anyhow::ensure!(ball.subtract > 0.0, "blob.{}.subtract must be positive", name);
        }
        anyhow::ensure!(
            self.recording.duration_secs.is_finite() && self.recording.duration_secs > 0.0,
            "recording.duration_secs must be a positive number, got {}",
            self.recording.duration_secs
        );
        anyhow::ensure!(self.transformer.batch_size > 0, "transformer.batch_size must be positive");
        anyhow::ensure!(self.app.target_fps > 0, "app.target_fps must be positive");
        Ok(())
    }
}
