use std::collections::VecDeque;

use chrono::DateTime;

use crate::lib::backend::types::{LogLine, LogStreamKind};

pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// Bounded log view for one container. Oldest lines drop off first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
    pub follow: bool,
    pub show_timestamps: bool,
}

impl Default for LogBuffer {
    fn default() -> Self {
        LogBuffer::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        LogBuffer {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
            follow: true,
            show_timestamps: true,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn extend(&mut self, lines: impl IntoIterator<Item = LogLine>) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn toggle_follow(&mut self) {
        self.follow = !self.follow;
    }

    pub fn toggle_timestamps(&mut self) {
        self.show_timestamps = !self.show_timestamps;
    }

    pub fn render_line(&self, line: &LogLine) -> String {
        let marker = match line.stream {
            LogStreamKind::Stdout => "",
            LogStreamKind::Stderr => "[err] ",
        };
        match (&line.timestamp, self.show_timestamps) {
            (Some(ts), true) => format!("{} {}{}", clock_time(ts), marker, line.content),
            _ => format!("{}{}", marker, line.content),
        }
    }

    pub fn render(&self) -> Vec<String> {
        self.lines.iter().map(|line| self.render_line(line)).collect()
    }
}

/// `HH:MM:SS` of an RFC3339 timestamp, or the raw text when it does not parse.
fn clock_time(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> LogLine {
        LogLine {
            stream: LogStreamKind::Stdout,
            content: format!("line {}", n),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn drops_oldest_over_capacity() {
        let mut buffer = LogBuffer::with_capacity(3);
        buffer.extend((0..5).map(line));
        assert_eq!(buffer.len(), 3);
        assert_eq!(
            buffer.render(),
            vec!["00:00:00 line 2", "00:00:00 line 3", "00:00:00 line 4"]
        );
    }

    #[test]
    fn timestamps_and_stderr_marker() {
        let mut buffer = LogBuffer::default();
        let err = LogLine {
            stream: LogStreamKind::Stderr,
            content: "boom".to_string(),
            timestamp: None,
        };
        assert!(buffer.show_timestamps);
        assert_eq!(buffer.render_line(&err), "[err] boom");
        assert_eq!(buffer.render_line(&line(1)), "00:00:00 line 1");

        let late = LogLine {
            timestamp: Some("2024-01-01T13:45:07.123456789Z".to_string()),
            ..err.clone()
        };
        assert_eq!(buffer.render_line(&late), "13:45:07 [err] boom");
        let odd = LogLine {
            timestamp: Some("yesterday".to_string()),
            ..line(2)
        };
        assert_eq!(buffer.render_line(&odd), "yesterday line 2");

        buffer.toggle_timestamps();
        assert_eq!(buffer.render_line(&line(1)), "line 1");
        assert!(buffer.follow);
    }
}
