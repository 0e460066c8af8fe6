use anyhow::Result;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use pose_blob::config::Config;
use pose_blob::log;
use pose_blob::math::distance_2d;
use pose_blob::logging::{open_log_file, LogFile};
use pose_blob::pose::{LandmarkSource, ReplaySource, SyntheticSource};
use pose_blob::session::Session;
use pose_blob::topology::LandmarkIndex;
use pose_blob::transformer::MlpTransformer;

const CONFIG_PATH: &str = "config.toml";

/// カメラなしのランドマーク入力
enum Source {
    Synthetic(SyntheticSource),
    Replay(ReplaySource),
}

impl Source {
    fn as_source(&mut self) -> &mut dyn LandmarkSource {
        match self {
            Source::Synthetic(s) => s,
            Source::Replay(s) => s,
        }
    }
}

/// 仮想時計で進めるヘッドレス実行
struct Headless {
    session: Session<MlpTransformer>,
    source: Source,
    clock_origin: Instant,
    elapsed: Duration,
    frame_interval: Duration,
    actors: usize,
    logfile: LogFile,
}

impl Headless {
    fn now(&self) -> Instant {
        self.clock_origin + self.elapsed
    }

    /// 指定した時間ぶんフレームを回す
    fn run(&mut self, duration: Duration) {
        let frames = duration.as_millis().div_ceil(self.frame_interval.as_millis().max(1)) as usize;
        for _ in 0..frames {
            if let Some(frame) = self.source.as_source().next_frame() {
                self.session.frame_detected(&frame.skeletons, frame.timestamp_ms);
            }
            self.elapsed += self.frame_interval;
            let now = self.now();
            for event in self.session.tick(now) {
                log!(self.logfile, "[{:>7.2}s] {}", self.elapsed.as_secs_f32(), event);
            }
        }
        let mesh = self.session.mesh();
        log!(
            self.logfile,
            "[{:>7.2}s] balls={} triangles={}{}",
            self.elapsed.as_secs_f32(),
            self.session.builder().metaballs().len(),
            mesh.triangle_count(),
            if mesh.truncated { " (truncated)" } else { "" }
        );
    }

    fn status(&self) {
        let recorder = self.session.recorder();
        log!(self.logfile, "phase:    {:?}", self.session.phase());
        log!(self.logfile, "mode:     {:?}", self.session.mode());
        log!(self.logfile, "training: {:?}", self.session.training_status());
        log!(
            self.logfile,
            "recorded: person1={} person2={} (need more than {})",
            recorder.person1().len(),
            recorder.person2().len(),
            recorder.min_samples()
        );
        if let Some(remaining) = recorder.remaining(self.now()) {
            log!(self.logfile, "remaining: {:.1}s", remaining.as_secs_f32());
        }
        log!(self.logfile, "actors:   {}", self.session.current_skeletons().len());
        for (slot, skeleton) in self.session.current_skeletons().iter().enumerate() {
            let span = distance_2d(
                skeleton.get(LandmarkIndex::LeftShoulder),
                skeleton.get(LandmarkIndex::RightShoulder),
            );
            if let Some(span) = span {
                log!(self.logfile, "  #{} shoulder span {:.3}", slot, span);
            }
        }
    }
}

/// コマンド引数の秒数。正の有限値だけ受け付ける
fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let secs: f32 = arg.parse().map_err(|_| format!("not a number: {}", arg))?;
    if !(secs > 0.0) {
        return Err(format!("seconds must be positive: {}", arg));
    }
    Duration::try_from_secs_f32(secs).map_err(|e| format!("{}: {}", arg, e))
}

fn main() -> Result<()> {
    let logfile = open_log_file("pose_blob")?;
    log!(logfile, "=== Pose Blob ({}) ===", env!("GIT_VERSION"));

    let config = match Config::load_if_exists(CONFIG_PATH)? {
        Some(config) => config,
        None => {
            log!(logfile, "WARN: {} not found, using defaults", CONFIG_PATH);
            Config::default()
        }
    };
    log!(
        logfile,
        "grid {}^3, {} interpolation points, {:.1}s recordings",
        config.blob.resolution,
        config.blob.interpolation_points,
        config.recording.duration_secs
    );

    let source = match &config.app.replay_file {
        Some(path) => match ReplaySource::load(path, true) {
            Ok(replay) => {
                log!(logfile, "Replaying {} frames from {}", replay.len(), path);
                Source::Replay(replay)
            }
            Err(e) => {
                log!(logfile, "WARN: replay unavailable ({:#}), using synthetic dancers", e);
                Source::Synthetic(SyntheticSource::new(config.app.synthetic_actors, config.app.target_fps))
            }
        },
        None => Source::Synthetic(SyntheticSource::new(config.app.synthetic_actors, config.app.target_fps)),
    };

    let mut app = Headless {
        session: Session::new(&config, MlpTransformer::from_config(&config.transformer)),
        source,
        clock_origin: Instant::now(),
        elapsed: Duration::ZERO,
        frame_interval: Duration::from_millis(1000 / config.app.target_fps.max(1) as u64),
        actors: config.app.synthetic_actors.min(2),
        logfile,
    };

    println!();
    println!("コマンド:");
    println!("  run [秒]      - フレームを進める (既定 1秒)");
    println!("  r [秒]        - 記録開始 (2人映っていれば同時記録)");
    println!("  t             - 記録済みデータで学習");
    println!("  w             - 学習完了を待つ");
    println!("  d / l         - ダンスモード / ライブモード");
    println!("  b             - 合成ソースの人数を 1/2 で切替");
    println!("  x             - リセット");
    println!("  s             - 状態表示");
    println!("  q             - 終了");
    println!();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "run" => match parts.get(1).map(|s| parse_seconds(s)).transpose() {
                Ok(duration) => app.run(duration.unwrap_or(Duration::from_secs(1))),
                Err(e) => log!(app.logfile, "WARN: {}", e),
            },
            "r" => {
                let duration = match parts.get(1).map(|s| parse_seconds(s)).transpose() {
                    Ok(duration) => duration,
                    Err(e) => {
                        log!(app.logfile, "WARN: {}", e);
                        continue;
                    }
                };
                let now = app.now();
                match app.session.start_recording(now, duration) {
                    Ok(phase) => log!(app.logfile, "Recording: {:?}", phase),
                    Err(e) => log!(app.logfile, "WARN: {}", e),
                }
            }
            "t" => {
                if let Err(e) = app.session.train() {
                    log!(app.logfile, "WARN: {}", e);
                }
            }
            "w" => {
                if app.session.wait_for_training(Duration::from_secs(120)) {
                    log!(app.logfile, "Training: {:?}", app.session.training_status());
                } else {
                    log!(app.logfile, "No training finished");
                }
            }
            "d" => match app.session.start_dance() {
                Ok(()) => log!(app.logfile, "Dance mode"),
                Err(e) => log!(app.logfile, "WARN: {}", e),
            },
            "l" => {
                app.session.stop_dance();
                log!(app.logfile, "Live mode");
            }
            "b" => match &mut app.source {
                Source::Synthetic(synthetic) => {
                    app.actors = if app.actors == 2 { 1 } else { 2 };
                    synthetic.set_actors(app.actors);
                    log!(app.logfile, "Synthetic actors: {}", app.actors);
                }
                Source::Replay(_) => log!(app.logfile, "WARN: actor count is fixed by the replay file"),
            },
            "x" => {
                app.session.reset();
                log!(app.logfile, "Reset");
            }
            "s" => app.status(),
            "q" => {
                log!(app.logfile, "終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("2.5"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_seconds("4"), Ok(Duration::from_secs(4)));
        for bad in ["-1", "0", "inf", "nan", "NaN", "1e30", "abc", ""] {
            assert!(parse_seconds(bad).is_err(), "{} accepted", bad);
        }
    }
}
