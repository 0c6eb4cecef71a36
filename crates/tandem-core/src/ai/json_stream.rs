//! Incremental splitter for streams of concatenated JSON objects
//!
//! Gemini returns either one JSON array or an unbounded run of objects with
//! no delimiter other than balanced braces. The scanner tracks brace depth and
//! string state so braces inside strings are ignored, and skips array
//! punctuation between top-level objects. Scanning is byte-wise; every
//! structural character is ASCII and never occurs inside a UTF-8 sequence.

/// Yields each complete top-level JSON object as it becomes available
#[derive(Debug, Default)]
pub struct JsonObjectScanner {
    current: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonObjectScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every object it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut objects = Vec::new();
        for &byte in chunk {
            if self.depth == 0 {
                // Between objects: '[', ']', ',' and whitespace are skipped
                if byte == b'{' {
                    self.depth = 1;
                    self.current.clear();
                    self.current.push(byte);
                }
                continue;
            }

            self.current.push(byte);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let object = std::mem::take(&mut self.current);
                        objects.push(String::from_utf8_lossy(&object).into_owned());
                    }
                }
                _ => {}
            }
        }
        objects
    }

    /// True when an object was started but never closed
    pub fn has_partial(&self) -> bool {
        self.depth > 0
    }
}
