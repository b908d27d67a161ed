//! Central kernel logging with optional in-memory capture for later dump.
//!
//! [`init`] installs a `log` backend. Every record goes to the sink (the
//! serial writer on hardware) and, while capture is enabled, into a fixed
//! buffer as `target|message` lines.

use core::fmt::{self, Write as _};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Mutex, Once};

const CAPTURE_BUF_SIZE: usize = 16 * 1024;

/// Receives one formatted, newline-terminated log line.
pub type LogSink = fn(fmt::Arguments<'_>);

struct LogState {
    capture_enabled: bool,
    capture_len: usize,
    capture_overflow: bool,
    capture_buf: [u8; CAPTURE_BUF_SIZE],
}

static CAPTURE: Mutex<LogState> = Mutex::new(LogState {
    capture_enabled: false,
    capture_len: 0,
    capture_overflow: false,
    capture_buf: [0; CAPTURE_BUF_SIZE],
});

static SINK: Once<LogSink> = Once::new();

static LOGGER: KernelLogger = KernelLogger;

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink(format_args!(
                "[{:<5}] {}: {}\n",
                record.level(),
                record.target(),
                record.args()
            ));
        }
        capture_target_line(record.target(), *record.args());
    }

    fn flush(&self) {}
}

struct BufferWriter<'a> {
    state: &'a mut LogState,
}

impl fmt::Write for BufferWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self
            .state
            .capture_buf
            .len()
            .saturating_sub(self.state.capture_len);
        let write_len = remaining.min(bytes.len());

        if write_len > 0 {
            let start = self.state.capture_len;
            let end = start + write_len;
            self.state.capture_buf[start..end].copy_from_slice(&bytes[..write_len]);
            self.state.capture_len = end;
        }

        if write_len < bytes.len() {
            self.state.capture_overflow = true;
        }
        Ok(())
    }
}

fn capture_target_line(target: &str, args: fmt::Arguments<'_>) {
    // An interrupt handler logging while the interrupted code holds the
    // buffer drops its line instead of deadlocking.
    let Some(mut state) = CAPTURE.try_lock() else {
        return;
    };
    if !state.capture_enabled {
        return;
    }

    let mut writer = BufferWriter { state: &mut *state };
    let _ = writer.write_str(target);
    let _ = writer.write_char('|');
    let _ = fmt::write(&mut writer, args);
    let _ = writer.write_char('\n');
}

/// Installs the kernel logger writing to `sink` at `level`.
///
/// Fails if a logger is already installed; the sink of the first call stays.
pub fn init(sink: LogSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Enable/disable capture buffer and reset it.
pub fn set_capture_enabled(enabled: bool) {
    let mut state = CAPTURE.lock();
    state.capture_enabled = enabled;
    state.capture_len = 0;
    state.capture_overflow = false;
}

/// Whether captured output was truncated since capture was last reset.
pub fn capture_overflowed() -> bool {
    CAPTURE.lock().capture_overflow
}

/// Calls `f` with every captured message logged under `target`, oldest
/// first.
pub fn for_each_captured(target: &str, mut f: impl FnMut(&str)) {
    let state = CAPTURE.lock();
    let Ok(text) = core::str::from_utf8(&state.capture_buf[..state.capture_len]) else {
        return;
    };

    for raw_line in text.split('\n') {
        if raw_line.is_empty() {
            continue;
        }
        let Some((line_target, msg)) = raw_line.split_once('|') else {
            continue;
        };
        if line_target == target {
            f(msg);
        }
    }
}
