use nalgebra::{Point3, Vector3};

use crate::blob::SurfaceMesh;
use crate::math::scale_value;
use crate::render::skeleton::{BoneLine, JOINT_RADIUS};

/// 画面上の点 (x, y) と深度（大きいほど手前）
type ScreenPoint = (f32, f32, f32);

/// 環境光の割合
const AMBIENT: f32 = 0.25;

/// 深度バッファ付きのソフトウェア描画面
///
/// 場の座標 [0,1]³ を正射影で描く。x は右、y は上、z は手前が大きい。
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
    depth: Vec<f32>,
    light: Vector3<f32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
            depth: vec![f32::NEG_INFINITY; width * height],
            light: Vector3::new(0.3, 0.5, 1.0).normalize(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }

    pub fn clear(&mut self, color: u32) {
        self.pixels.fill(color);
        self.depth.fill(f32::NEG_INFINITY);
    }

    /// 場の座標 → 画面座標
    pub fn project(&self, p: &Point3<f32>) -> ScreenPoint {
        (
            scale_value(p.x, 0.0, 1.0, 0.0, (self.width - 1) as f32),
            scale_value(p.y, 0.0, 1.0, (self.height - 1) as f32, 0.0),
            p.z,
        )
    }

    /// 等値面を平坦シェーディングで描く
    pub fn draw_mesh(&mut self, mesh: &SurfaceMesh) {
        for tri in mesh.triangles() {
            let normal = tri[0].normal + tri[1].normal + tri[2].normal;
            // 奥向きの面は隠れる
            if normal.z < 0.0 {
                continue;
            }
            let normal = normal.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
            let shade = AMBIENT + (1.0 - AMBIENT) * normal.dot(&self.light).max(0.0);
            let color: [f32; 3] =
                std::array::from_fn(|k| (tri[0].color[k] + tri[1].color[k] + tri[2].color[k]) / 3.0 * shade);

            let a = self.project(&tri[0].position);
            let b = self.project(&tri[1].position);
            let c = self.project(&tri[2].position);
            self.fill_triangle(a, b, c, pack_rgb(color));
        }
    }

    /// 骨格線と関節を重ねる（深度テストなし）
    pub fn draw_bones(&mut self, lines: &[BoneLine], color: u32) {
        for line in lines {
            let (x0, y0, _) = self.project(&line.from);
            let (x1, y1, _) = self.project(&line.to);
            let (x0, y0, x1, y1) = (x0.round() as i32, y0.round() as i32, x1.round() as i32, y1.round() as i32);
            self.draw_line(x0, y0, x1, y1, color);
            self.draw_circle(x0, y0, JOINT_RADIUS, color);
            self.draw_circle(x1, y1, JOINT_RADIUS, color);
        }
    }

    /// 深度テスト付きで三角形を塗る
    pub fn fill_triangle(&mut self, a: ScreenPoint, b: ScreenPoint, c: ScreenPoint, color: u32) {
        let area = edge(a, b, c.0, c.1);
        if area.abs() < f32::EPSILON {
            return;
        }

        let min_x = a.0.min(b.0).min(c.0).floor().max(0.0) as usize;
        let min_y = a.1.min(b.1).min(c.1).floor().max(0.0) as usize;
        let max_x = a.0.max(b.0).max(c.0).ceil().min((self.width - 1) as f32);
        let max_y = a.1.max(b.1).max(c.1).ceil().min((self.height - 1) as f32);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }

        for y in min_y..=max_y as usize {
            for x in min_x..=max_x as usize {
                let (px, py) = (x as f32, y as f32);
                let w0 = edge(b, c, px, py) / area;
                let w1 = edge(c, a, px, py) / area;
                let w2 = edge(a, b, px, py) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * a.2 + w1 * b.2 + w2 * c.2;
                let idx = y * self.width + x;
                if z > self.depth[idx] {
                    self.depth[idx] = z;
                    self.pixels[idx] = color;
                }
            }
        }
    }

    /// Bresenhamのアルゴリズムで線を描画
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.pixels[y as usize * self.width + x as usize] = color;
        }
    }
}

/// 辺 (a→b) に対する点 (px, py) の符号付き面積の2倍
fn edge(a: ScreenPoint, b: ScreenPoint, px: f32, py: f32) -> f32 {
    (b.0 - a.0) * (py - a.1) - (b.1 - a.1) * (px - a.0)
}

/// 0〜1 の RGB → 0xRRGGBB
pub fn pack_rgb(color: [f32; 3]) -> u32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(color[0]) << 16) | (channel(color[1]) << 8) | channel(color[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobBuilder, Metaball, MetaballField};
    use crate::config::BlobConfig;
    use crate::pose::synthetic::dancer;

    #[test]
    fn test_pack_rgb() {
        assert_eq!(pack_rgb([1.0, 0.0, 0.0]), 0xFF0000);
        assert_eq!(pack_rgb([0.0, 1.0, 0.0]), 0x00FF00);
        assert_eq!(pack_rgb([0.0, 0.0, 2.0]), 0x0000FF);
        assert_eq!(pack_rgb([-1.0, 0.0, 0.0]), 0);
    }

    #[test]
    fn test_depth_test_keeps_nearest() {
        let mut canvas = Canvas::new(20, 20);
        canvas.clear(0);
        let near = 0.8;
        let far = 0.2;
        canvas.fill_triangle((0.0, 0.0, near), (19.0, 0.0, near), (0.0, 19.0, near), 0x00FF00);
        canvas.fill_triangle((0.0, 0.0, far), (19.0, 0.0, far), (0.0, 19.0, far), 0xFF0000);
        assert_eq!(canvas.pixel(3, 3), 0x00FF00);
        // 三角形の外は背景のまま
        assert_eq!(canvas.pixel(18, 18), 0);
    }

    #[test]
    fn test_winding_does_not_matter() {
        let mut canvas = Canvas::new(10, 10);
        canvas.fill_triangle((0.0, 0.0, 0.5), (0.0, 9.0, 0.5), (9.0, 0.0, 0.5), 0xABCDEF);
        assert_eq!(canvas.pixel(2, 2), 0xABCDEF);
    }

    #[test]
    fn test_draw_line_endpoints() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line(1, 1, 8, 5, 0xFFFFFF);
        assert_eq!(canvas.pixel(1, 1), 0xFFFFFF);
        assert_eq!(canvas.pixel(8, 5), 0xFFFFFF);
        // 画面外は無視
        canvas.draw_line(-5, -5, 20, 20, 0x111111);
    }

    #[test]
    fn test_projection_flips_y() {
        let canvas = Canvas::new(101, 51);
        let (x, y, z) = canvas.project(&Point3::new(0.25, 1.0, 0.7));
        assert!((x - 25.0).abs() < 1e-4);
        assert!(y.abs() < 1e-4);
        assert!((z - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_draw_mesh_lights_sphere() {
        let mut field = MetaballField::new(32, 80.0, 100_000);
        field.add_ball(Metaball::new(Point3::new(0.5, 0.5, 0.5), 0.5, 12.0, [1.0, 1.0, 1.0]));
        field.update();

        let mut canvas = Canvas::new(64, 64);
        canvas.clear(0);
        canvas.draw_mesh(field.mesh());
        // 正面中央は照らされている
        assert_ne!(canvas.pixel(32, 32), 0);
        // 隅は背景
        assert_eq!(canvas.pixel(0, 0), 0);
    }

    #[test]
    fn test_draw_blob_avatar() {
        let config = BlobConfig {
            resolution: 32,
            ..BlobConfig::default()
        };
        let mut builder = BlobBuilder::from_config(&config);
        builder.update(&[dancer(0.0, 0.0)]);
        let mut canvas = Canvas::new(80, 80);
        canvas.clear(0);
        canvas.draw_mesh(builder.mesh());
        assert!(canvas.pixels().iter().any(|p| *p != 0));
    }
}
