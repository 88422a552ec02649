use std::io::Write;

/// Trait for handling output from the `print()` builtin function.
///
/// Implement this trait to capture or redirect print output from runtime code.
/// The default implementation `StdPrint` writes to stdout.
pub trait PrintWriter: Send {
    /// Writes one complete `print()` line, without the trailing newline.
    fn write_line(&mut self, line: &str);

    /// Returns and clears captured output, for writers that capture.
    fn take_output(&mut self) -> Option<String> {
        None
    }
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        // a closed stdout is not the runtime's problem
        let _ = writeln!(stdout, "{line}");
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_line(&mut self, _line: &str) {}
}

/// `PrintWriter` that collects all output into a string.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_line(&mut self, line: &str) {
        self.0.push_str(line);
        self.0.push('\n');
    }

    fn take_output(&mut self) -> Option<String> {
        Some(std::mem::take(&mut self.0))
    }
}
