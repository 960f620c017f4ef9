//! Output sinks for user-facing progress lines

use std::sync::{Arc, Mutex};

/// Line-oriented progress reporting
pub trait Output: Send + Sync {
    fn writeln(&self, line: &str);
}

/// Writes every line to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn writeln(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects lines in memory; clones share the same buffer
#[derive(Debug, Default, Clone)]
pub struct BufferedOutput {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any collected line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    pub fn clear(&self) {
        match self.lines.lock() {
            Ok(mut lines) => lines.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Output for BufferedOutput {
    fn writeln(&self, line: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line.to_string()),
            Err(poisoned) => poisoned.into_inner().push(line.to_string()),
        }
    }
}
