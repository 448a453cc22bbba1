//! Output sink behind the `print` statement.
//!
//! The interpreter writes through this seam instead of a hardwired
//! console call, so embedders route program output wherever they like and
//! tests capture it.

use std::sync::Mutex;

pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes program output to stdout.
#[derive(Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects program output in memory.
#[derive(Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("output buffer poisoned").clone()
    }
}

impl OutputSink for BufferSink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .expect("output buffer poisoned")
            .push(line.to_string());
    }
}
