use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::Dispatch;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "bakery_queue.log";

/// Sets up the global logger for the queue engine: a compact colored console
/// stream plus a full-timestamp file under `logs/`.
///
/// Call once at startup. The level comes from `RUST_LOG` (default `info`);
/// chatty dependency targets are pinned to `warn` so per-bread and per-ticket
/// traffic stays readable. A second call is a no-op.
pub fn init() {
    let level = std::env::var("RUST_LOG").ok().and_then(|value| value.parse::<LevelFilter>().ok()).unwrap_or(LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack);

    // Console lines stay short: time of day, padded level, target, message.
    let console = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("{} {:<5} [{}] {}", Local::now().format("%H:%M:%S"), colors.color(record.level()), record.target(), message))
        })
        .chain(std::io::stderr());

    let mut root = Dispatch::new().level(level).level_for("tokio", LevelFilter::Warn).level_for("serde", LevelFilter::Warn).chain(console);

    // The file sink is best effort; a read-only working directory must not
    // keep the engine from starting.
    match open_log_file() {
        Ok(file) => {
            let file_sink = Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!("{} {} {}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.target(), message))
                })
                .chain(file);

            root = root.chain(file_sink);
        }
        Err(e) => eprintln!("Queue log file unavailable ({}); logging to console only.", e),
    }

    if root.apply().is_err() {
        // Already initialized, e.g. by a second engine in the same process.
        return;
    }

    log::info!("Logging to console and {}.", log_file_path().display());
}

fn log_file_path() -> PathBuf {
    Path::new(LOG_DIR).join(LOG_FILE)
}

fn open_log_file() -> std::io::Result<fs::File> {
    fs::create_dir_all(LOG_DIR)?;
    fern::log_file(log_file_path())
}
