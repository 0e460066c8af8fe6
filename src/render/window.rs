use anyhow::{Context, Result};
use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};

use super::canvas::Canvas;

/// Canvas を表示するデバッグウィンドウ
pub struct MinifbRenderer {
    window: Window,
    title: String,
}

impl MinifbRenderer {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let options = WindowOptions {
            scale: Scale::X1,
            ..WindowOptions::default()
        };
        let mut window = Window::new(title, width, height, options)
            .with_context(|| format!("Failed to create {}x{} window", width, height))?;
        // フレームレートは bevy 側のループで決める
        window.set_target_fps(0);
        Ok(Self {
            window,
            title: title.to_string(),
        })
    }

    /// 閉じられたか Esc が押されたら false
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn pressed_keys(&self) -> Vec<Key> {
        self.window.get_keys_pressed(KeyRepeat::No)
    }

    /// 変わったときだけタイトルを更新
    pub fn set_title(&mut self, title: &str) {
        if self.title != title {
            self.window.set_title(title);
            self.title = title.to_string();
        }
    }

    pub fn present(&mut self, canvas: &Canvas) -> Result<()> {
        self.window
            .update_with_buffer(canvas.pixels(), canvas.width(), canvas.height())
            .context("Failed to present canvas")
    }
}
