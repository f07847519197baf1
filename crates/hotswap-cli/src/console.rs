//! Console output for diagnostic lines

use hotswap_plugins::hot_reload::LogSink;

/// Prints diagnostic lines to stdout, wrapping long ones.
///
/// Continuation lines are indented and shortened by the indent so every
/// printed line fits in `width` columns.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    width: usize,
    indent: usize,
}

impl Default for Console {
    fn default() -> Self {
        Self {
            width: 70,
            indent: 4,
        }
    }
}

impl Console {
    pub fn new(width: usize, indent: usize) -> Self {
        Self { width, indent }
    }

    pub fn wrap(&self, line: &str) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let pad = " ".repeat(self.indent);
        let mut width = self.width.max(1);
        let mut rest = chars.as_slice();
        let mut first = true;
        let mut lines = Vec::new();

        loop {
            let prefix = if first { "" } else { pad.as_str() };
            if rest.len() <= width {
                lines.push(format!("{}{}", prefix, rest.iter().collect::<String>()));
                return lines;
            }
            let (head, tail) = rest.split_at(width);
            lines.push(format!("{}{}", prefix, head.iter().collect::<String>()));
            rest = tail;
            if first {
                first = false;
                width = self.width.saturating_sub(self.indent).max(1);
            }
        }
    }

    pub fn print(&self, line: &str) {
        for wrapped in self.wrap(line) {
            println!("{}", wrapped);
        }
    }

    /// A sink that prints through this console.
    pub fn sink(&self) -> LogSink {
        let console = *self;
        LogSink::new(move |line| console.print(line))
    }
}
