use anyhow::Result;
use std::time::{Duration, Instant};

use bevy::app::{App, AppExit, ScheduleRunnerPlugin, Update};
use bevy::ecs::prelude::*;

use pose_blob::camera::CameraLandmarkSource;
use pose_blob::config::Config;
use pose_blob::log;
use pose_blob::logging::{open_log_file, LogFile};
use pose_blob::pose::{LandmarkSource, ReplaySource, SyntheticSource};
use pose_blob::record::Phase;
use pose_blob::render::{bone_lines, Canvas, Key, MinifbRenderer, BACKGROUND_COLOR, GHOST_COLOR, SKELETON_COLOR};
use pose_blob::session::{Mode, Session};
use pose_blob::transformer::MlpTransformer;

const CONFIG_PATH: &str = "config.toml";

// --- Bevy Resources ---

#[derive(Resource)]
struct LogFileRes(LogFile);

#[derive(Resource)]
struct FpsCounter {
    frame_count: u32,
    detection_count: u32,
    timer: Instant,
}

/// ランドマーク入力。カメラが無ければ再生ファイルか合成ダンサー
enum Input {
    Camera(CameraLandmarkSource),
    Replay(ReplaySource),
    Synthetic(SyntheticSource, usize),
}

impl Input {
    fn source(&mut self) -> &mut dyn LandmarkSource {
        match self {
            Input::Camera(s) => s,
            Input::Replay(s) => s,
            Input::Synthetic(s, _) => s,
        }
    }
}

/// セッションと入力（mpsc の受け手を持つので NonSend）
struct ViewerState {
    session: Session<MlpTransformer>,
    input: Input,
}

struct DebugView {
    renderer: MinifbRenderer,
    canvas: Canvas,
    show_skeleton: bool,
    min_visibility: f32,
    depth_scale: f32,
}

fn main() -> Result<()> {
    let logfile = open_log_file("blob_viewer")?;
    log!(logfile, "Blob Viewer ({})", env!("GIT_VERSION"));

    let config = match Config::load_if_exists(CONFIG_PATH)? {
        Some(config) => config,
        None => {
            log!(logfile, "WARN: {} not found, using defaults", CONFIG_PATH);
            Config::default()
        }
    };
    log!(logfile, "Target FPS: {}", config.app.target_fps);
    log!(
        logfile,
        "Grid: {}^3, isolation {}, max {} triangles",
        config.blob.resolution,
        config.blob.isolation,
        config.blob.max_triangles
    );

    // カメラが使えなくても描画は続ける
    let input = match CameraLandmarkSource::start(&config.capture) {
        Ok(camera) => {
            let (w, h) = camera.resolution();
            log!(logfile, "Camera {}: {}x{}", config.capture.camera_index, w, h);
            Input::Camera(camera)
        }
        Err(e) => {
            log!(logfile, "WARN: {}", e);
            fallback_input(&config, &logfile)
        }
    };

    let renderer = MinifbRenderer::new("pose blob", config.debug.view_width, config.debug.view_height)?;
    let view = DebugView {
        renderer,
        canvas: Canvas::new(config.debug.view_width, config.debug.view_height),
        show_skeleton: config.debug.show_skeleton,
        min_visibility: config.blob.min_visibility,
        depth_scale: config.blob.depth_scale,
    };
    let state = ViewerState {
        session: Session::new(&config, MlpTransformer::from_config(&config.transformer)),
        input,
    };

    log!(logfile, "");
    log!(logfile, "操作: [R] 記録  [D] ダンス切替  [X] リセット  [C] カメラ切替  [S] 骨格表示  [B] 合成人数  [Esc] 終了");
    log!(logfile, "");

    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);

    let mut app = App::new();
    app.add_plugins(ScheduleRunnerPlugin::run_loop(frame_duration))
        .insert_resource(FpsCounter {
            frame_count: 0,
            detection_count: 0,
            timer: Instant::now(),
        })
        .insert_resource(LogFileRes(logfile.clone()))
        .insert_non_send_resource(state)
        .insert_non_send_resource(view)
        .add_systems(
            Update,
            (input_system, detection_system, session_system, render_system, fps_system).chain(),
        );

    app.run();

    log!(logfile, "Shutting down...");
    Ok(())
}

fn fallback_input(config: &Config, logfile: &LogFile) -> Input {
    if let Some(path) = &config.app.replay_file {
        match ReplaySource::load(path, true) {
            Ok(replay) => {
                log!(logfile, "Replaying {} frames from {}", replay.len(), path);
                return Input::Replay(replay);
            }
            Err(e) => log!(logfile, "WARN: replay unavailable ({:#})", e),
        }
    }
    log!(logfile, "Using synthetic dancers");
    let actors = config.app.synthetic_actors.min(2);
    Input::Synthetic(SyntheticSource::new(actors, config.app.target_fps), actors)
}

// --- Systems ---

fn input_system(
    mut state: NonSendMut<ViewerState>,
    mut view: NonSendMut<DebugView>,
    lf: Res<LogFileRes>,
    mut exit: EventWriter<AppExit>,
) {
    if !view.renderer.is_open() {
        exit.send(AppExit::Success);
        return;
    }

    let state = &mut *state;
    for key in view.renderer.pressed_keys() {
        match key {
            Key::R => match state.session.start_recording(Instant::now(), None) {
                Ok(phase) => log!(lf.0, "Recording: {:?}", phase),
                Err(e) => log!(lf.0, "WARN: {}", e),
            },
            Key::D => {
                if state.session.mode() == Mode::Dance {
                    state.session.stop_dance();
                } else if let Err(e) = state.session.start_dance() {
                    log!(lf.0, "WARN: {}", e);
                }
            }
            Key::X => state.session.reset(),
            Key::C => match &state.input {
                Input::Camera(camera) => {
                    let enabled = !camera.is_enabled();
                    camera.set_enabled(enabled);
                    log!(lf.0, "Camera {}", if enabled { "enabled" } else { "disabled" });
                }
                _ => log!(lf.0, "WARN: no camera"),
            },
            Key::B => {
                if let Input::Synthetic(source, actors) = &mut state.input {
                    *actors = if *actors == 2 { 1 } else { 2 };
                    source.set_actors(*actors);
                    log!(lf.0, "Synthetic actors: {}", actors);
                }
            }
            Key::S => view.show_skeleton = !view.show_skeleton,
            _ => {}
        }
    }
}

fn detection_system(mut state: NonSendMut<ViewerState>, mut fps: ResMut<FpsCounter>) {
    let state = &mut *state;
    if let Some(frame) = state.input.source().next_frame() {
        if state.session.frame_detected(&frame.skeletons, frame.timestamp_ms) {
            fps.detection_count += 1;
        }
    }
}

fn session_system(mut state: NonSendMut<ViewerState>, lf: Res<LogFileRes>) {
    for event in state.session.tick(Instant::now()) {
        log!(lf.0, "{}", event);
    }
}

fn render_system(state: NonSend<ViewerState>, mut view: NonSendMut<DebugView>) {
    let view = &mut *view;
    view.canvas.clear(BACKGROUND_COLOR);
    view.canvas.draw_mesh(state.session.mesh());

    if view.show_skeleton {
        let live = state.session.current_skeletons().len();
        for (slot, skeleton) in state.session.displayed_skeletons().iter().enumerate() {
            let lines = bone_lines(skeleton, view.min_visibility, view.depth_scale);
            let color = if slot < live { SKELETON_COLOR } else { GHOST_COLOR };
            view.canvas.draw_bones(&lines, color);
        }
    }

    let phase = state.session.phase();
    let title = match state.session.recorder().remaining(Instant::now()) {
        Some(remaining) if phase != Phase::Idle => {
            format!("pose blob - {:?} {:.1}s", phase, remaining.as_secs_f32())
        }
        _ => format!("pose blob - {:?} / {:?}", state.session.mode(), state.session.training_status()),
    };
    view.renderer.set_title(&title);
    let _ = view.renderer.present(&view.canvas);
}

fn fps_system(mut fps: ResMut<FpsCounter>, state: NonSend<ViewerState>, lf: Res<LogFileRes>) {
    fps.frame_count += 1;
    let elapsed = fps.timer.elapsed().as_secs_f32();
    if elapsed >= 5.0 {
        let mesh = state.session.mesh();
        log!(
            lf.0,
            "FPS: {:.1} (detect: {}) | actors={} balls={} triangles={}{}",
            fps.frame_count as f32 / elapsed,
            fps.detection_count,
            state.session.current_skeletons().len(),
            state.session.builder().metaballs().len(),
            mesh.triangle_count(),
            if mesh.truncated { " (truncated)" } else { "" }
        );
        fps.frame_count = 0;
        fps.detection_count = 0;
        fps.timer = Instant::now();
    }
}
