use anyhow::Result;
use std::fs;
use std::io::BufWriter;
use std::sync::{Arc, Mutex};

/// バイナリ共通のログファイル
pub type LogFile = Arc<Mutex<BufWriter<fs::File>>>;

/// `logs/<name>_YYYYmmdd_HHMMSS.log` を作って開く
pub fn open_log_file(name: &str) -> Result<LogFile> {
    fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/{}_{}.log", name, ts);
    let file = fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(BufWriter::new(file))))
}

/// 標準出力とログファイルの両方に書く
#[macro_export]
macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        use ::std::io::Write as _;
        let msg = format!($($arg)*);
        println!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}
