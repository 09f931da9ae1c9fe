//! 預設的日誌匯出：每個事件一行，寫往標準輸出。
//!
//! 引擎內部一律透過 `log` 門面發出事件；宿主程式若已安裝自己的
//! 日誌器，本模組可以完全不用。

use log::{LevelFilter, Log, Metadata, Record};

/// 將 `LEVEL message` 逐行寫到標準輸出的極簡日誌器。
pub struct StdoutLogger;

static LOGGER: StdoutLogger = StdoutLogger;

impl Log for StdoutLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        println!("{} {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// 安裝 [`StdoutLogger`] 並設定等級上限。
///
/// 已有其他日誌器時本呼叫不做任何事，因此重複初始化是無害的。
pub fn init(max_level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(max_level);
    }
}
