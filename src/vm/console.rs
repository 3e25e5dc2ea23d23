//! Line-oriented I/O used by the read/write opcodes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// Source of input lines and sink for output text.
pub trait Console {
    /// Next input line without its line terminator, `None` at end of input.
    fn read_line(&mut self) -> Option<String>;

    fn write(&mut self, text: &str);
}

/// Process stdin/stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(strip_newline(line)),
        }
    }

    fn write(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        // Output failures are not visible to programs.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// In-memory console for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct BufferedConsole {
    input: VecDeque<String>,
    output: String,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// A console whose input is the lines of `input`.
    pub fn with_input(input: &str) -> Self {
        Self {
            input: input.lines().map(str::to_string).collect(),
            output: String::new(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl Console for BufferedConsole {
    fn read_line(&mut self) -> Option<String> {
        self.input.pop_front()
    }

    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

/// Shared handle, so the embedder can inspect a console the VM owns.
impl<C: Console> Console for Rc<RefCell<C>> {
    fn read_line(&mut self) -> Option<String> {
        self.borrow_mut().read_line()
    }

    fn write(&mut self, text: &str) {
        self.borrow_mut().write(text)
    }
}

fn strip_newline(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_buffered_console() {
        let mut console = BufferedConsole::with_input("one\r\ntwo\n");
        assert_eq!(console.read_line().as_deref(), Some("one"));
        assert_eq!(console.read_line().as_deref(), Some("two"));
        assert_eq!(console.read_line(), None);
        console.write("a");
        console.write("b\n");
        assert_eq!(console.take_output(), "ab\n");
        assert_eq!(console.output(), "");
    }

    #[test]
    fn test_shared_console_sees_writes() {
        let console = Rc::new(RefCell::new(BufferedConsole::new()));
        let mut handle: Box<dyn Console> = Box::new(Rc::clone(&console));
        handle.write("hi");
        assert_eq!(console.borrow().output(), "hi");
    }

    #[test]
    fn test_strip_newline() {
        assert_eq!(strip_newline("x\r\n".into()), "x");
        assert_eq!(strip_newline("x".into()), "x");
    }
}
