use anyhow::Result;
use ndarray::Array4;
use opencv::{
    core::{self, AlgorithmHint, Mat, Scalar, Size},
    imgproc,
    prelude::*,
};

/// ランドマークモデルの入力サイズ（正方形）
pub const LANDMARKER_INPUT_SIZE: i32 = 256;

/// 正方形へのレターボックス変換の情報
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// 元画像 → モデル入力の拡大率
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub frame_width: f32,
    pub frame_height: f32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        let size = LANDMARKER_INPUT_SIZE as f32;
        let (w, h) = (frame_width.max(1) as f32, frame_height.max(1) as f32);
        let scale = size / w.max(h);
        Self {
            scale,
            pad_x: ((size - w * scale) / 2.0).floor(),
            pad_y: ((size - h * scale) / 2.0).floor(),
            frame_width: w,
            frame_height: h,
        }
    }

    /// モデル入力のピクセル座標 → 元画像の正規化座標 (x, y, z)
    ///
    /// z は x と同じく画像幅で正規化する。
    pub fn to_frame(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        (
            (x - self.pad_x) / self.scale / self.frame_width,
            (y - self.pad_y) / self.scale / self.frame_height,
            z / self.scale / self.frame_width,
        )
    }
}

/// OpenCV Mat をランドマークモデル用の入力テンソルに変換
///
/// BGR → RGB、縦横比を保って 256x256 に黒帯付きで収め、
/// [1, 256, 256, 3] の f32 テンソル (0.0-1.0) にする。
pub fn preprocess_for_landmarker(frame: &Mat) -> Result<(Array4<f32>, Letterbox)> {
    let letterbox = Letterbox::new(frame.cols() as u32, frame.rows() as u32);
    let inner_w = (letterbox.frame_width * letterbox.scale).round() as i32;
    let inner_h = (letterbox.frame_height * letterbox.scale).round() as i32;

    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;

    let mut scaled = Mat::default();
    imgproc::resize(&rgb, &mut scaled, Size::new(inner_w, inner_h), 0.0, 0.0, imgproc::INTER_AREA)?;

    let left = letterbox.pad_x as i32;
    let top = letterbox.pad_y as i32;
    let mut padded = Mat::default();
    core::copy_make_border(
        &scaled,
        &mut padded,
        top,
        (LANDMARKER_INPUT_SIZE - inner_h - top).max(0),
        left,
        (LANDMARKER_INPUT_SIZE - inner_w - left).max(0),
        core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    let size = LANDMARKER_INPUT_SIZE as usize;
    let rows = (padded.rows() as usize).min(size);
    let cols = (padded.cols() as usize).min(size);
    let data = padded.data_bytes()?;
    let step = padded.mat_step().get(0);

    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for y in 0..rows {
        for x in 0..cols {
            let px = y * step + x * 3;
            for c in 0..3 {
                tensor[[0, y, x, c]] = data[px + c] as f32 / 255.0;
            }
        }
    }

    Ok((tensor, letterbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::new(640, 480);
        assert!((lb.scale - 0.4).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 32.0);

        // 入力の中心は元画像の中心
        let (x, y, _) = lb.to_frame(128.0, 128.0, 0.0);
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);

        // 黒帯の端は元画像の上端
        let (_, y, _) = lb.to_frame(0.0, 32.0, 0.0);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_depth_uses_width() {
        let lb = Letterbox::new(480, 640);
        let (_, _, z) = lb.to_frame(0.0, 0.0, 40.0);
        assert!((z - 40.0 / lb.scale / 480.0).abs() < 1e-6);
    }
}
