//! Normalized error extraction from raw log output.
//!
//! Two shapes are recovered: multi-line tracebacks (`Traceback (most
//! recent call last): ... File "x", line N ... SomeError: message`) and
//! single-line records carrying `SomeError: message (file:line)`.

use regex::Regex;

/// One recovered error record.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub error_class: String,
    pub file: String,
    pub line: u32,
    pub message: String,
    pub stack: Vec<String>,
}

pub struct LogParser {
    single_line: Regex,
    frame: Regex,
    terminal: Regex,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        Self {
            single_line: Regex::new(
                r"(?P<class>\w+(?:Error|Exception|Warning)):\s*(?P<msg>.*?)\s*\((?P<file>[^\s:()]+):(?P<line>\d+)\)\s*$",
            )
            .expect("static regex"),
            frame: Regex::new(r#"^\s*File "(?P<file>[^"]+)", line (?P<line>\d+)"#)
                .expect("static regex"),
            terminal: Regex::new(r"^(?P<class>\w+(?:Error|Exception)):\s*(?P<msg>.*)$")
                .expect("static regex"),
        }
    }

    /// Parse a block of log text into error records.
    pub fn parse(&self, text: &str) -> Vec<ErrorRecord> {
        let mut records = Vec::new();
        let mut traceback: Option<TracebackState> = None;

        for line in text.lines() {
            if line.trim_start().starts_with("Traceback (most recent call last):") {
                traceback = Some(TracebackState::default());
                continue;
            }

            if let Some(state) = traceback.as_mut() {
                if let Some(captures) = self.frame.captures(line) {
                    state.frames.push(line.trim_end().to_string());
                    state.last_file = Some((
                        captures["file"].to_string(),
                        captures["line"].parse().unwrap_or(0),
                    ));
                    continue;
                }
                if let Some(captures) = self.terminal.captures(line) {
                    let (file, line_no) =
                        state.last_file.clone().unwrap_or((String::new(), 0));
                    records.push(ErrorRecord {
                        error_class: captures["class"].to_string(),
                        file,
                        line: line_no,
                        message: captures["msg"].trim().to_string(),
                        stack: std::mem::take(&mut state.frames),
                    });
                    traceback = None;
                    continue;
                }
                // Interleaved source echo lines stay in the stack.
                if !line.trim().is_empty() {
                    state.frames.push(line.trim_end().to_string());
                }
                continue;
            }

            if let Some(captures) = self.single_line.captures(line) {
                records.push(ErrorRecord {
                    error_class: captures["class"].to_string(),
                    file: captures["file"].to_string(),
                    line: captures["line"].parse().unwrap_or(0),
                    message: captures["msg"].trim().to_string(),
                    stack: vec![line.trim_end().to_string()],
                });
            }
        }
        records
    }
}

#[derive(Default)]
struct TracebackState {
    frames: Vec<String>,
    last_file: Option<(String, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_records() {
        let parser = LogParser::new();
        let records = parser.parse(
            "2025-07-01 12:00:00 ERROR worker TimeoutError: request timed out (src/client.py:88)\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error_class, "TimeoutError");
        assert_eq!(records[0].file, "src/client.py");
        assert_eq!(records[0].line, 88);
        assert_eq!(records[0].message, "request timed out");
    }

    #[test]
    fn parses_tracebacks() {
        let parser = LogParser::new();
        let text = r#"Traceback (most recent call last):
  File "src/app.py", line 10, in main
    run()
  File "src/worker.py", line 42, in run
    result = await fetch()
TypeError: object dict can't be used in 'await' expression
"#;
        let records = parser.parse(text);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.error_class, "TypeError");
        assert_eq!(record.file, "src/worker.py");
        assert_eq!(record.line, 42);
        assert!(record.message.contains("await"));
        assert!(record.stack.len() >= 2);
    }

    #[test]
    fn mixed_blocks_yield_all_records() {
        let parser = LogParser::new();
        let text = r#"INFO starting
Traceback (most recent call last):
  File "src/a.py", line 3, in f
AttributeError: 'Worker' object has no attribute 'drain'
WARN something
ValueError: bad input (src/b.py:7)
"#;
        let records = parser.parse(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].error_class, "AttributeError");
        assert_eq!(records[1].error_class, "ValueError");
    }

    #[test]
    fn plain_lines_produce_nothing() {
        let parser = LogParser::new();
        assert!(parser.parse("INFO all good\nDEBUG ticking\n").is_empty());
    }
}
