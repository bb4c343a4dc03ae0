use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

/// Free text trace stream. Each station owns one, the network has its own.
pub trait TraceSink: Send {
    /// Appends one line of text
    fn append(&mut self, text: &str);
}

/// [TraceSink] forwarding every line to the [log] facade.
#[derive(Debug, Clone, Default)]
pub struct LogTrace {
    /// Prefixes every line
    pub name: String,
}

impl LogTrace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl TraceSink for LogTrace {
    fn append(&mut self, text: &str) {
        debug!("[{}] {}", self.name, text);
    }
}

/// In memory [TraceSink]. Clones share the same buffer, so one end
/// may be handed over to a station while the other one is inspected.
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Recorded lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// True if one recorded line contains `pattern`
    pub fn contains(&self, pattern: &str) -> bool {
        self.lock().iter().any(|line| line.contains(pattern))
    }
}

impl TraceSink for TraceBuffer {
    fn append(&mut self, text: &str) {
        self.lock().push(text.to_string());
    }
}
