use crate::peer::types::IceCandidate;
use log::{LevelFilter, Log, Metadata, Record};

/// Бэкенд для `log`: строки вида `RUST: [время] LEVEL target: сообщение`
struct RoomLogger;

static LOGGER: RoomLogger = RoomLogger;

impl Log for RoomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now();
        println!(
            "RUST: [{}] {:<5} {}: {}",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Устанавливает логгер. Повторный вызов только меняет уровень
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        log::debug!("logger already installed, updating level to {level}");
    }
    log::set_max_level(level);
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    log::debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
        cand.candidate,
        cand.sdp_mid,
        cand.sdp_mline_index,
        cand.username_fragment
    );
}
