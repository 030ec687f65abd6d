/// Sink for user-facing progress and report lines
pub trait Reporter {
    /// Always shown
    fn line(&mut self, text: &str);

    /// Per-image progress, shown in verbose mode only
    fn progress(&mut self, text: &str);
}

/// Writes to stdout, or stderr when stdout carries machine-readable output
pub struct ConsoleReporter {
    verbose: bool,
    stderr: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            stderr: false,
        }
    }

    pub fn stderr(verbose: bool) -> Self {
        Self {
            verbose,
            stderr: true,
        }
    }

    fn print(&self, text: &str) {
        if self.stderr {
            eprintln!("{}", text);
        } else {
            println!("{}", text);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn line(&mut self, text: &str) {
        self.print(text);
    }

    fn progress(&mut self, text: &str) {
        if self.verbose {
            self.print(text);
        }
    }
}

/// Keeps every line in memory
#[cfg(test)]
#[derive(Default)]
pub struct MemoryReporter {
    pub lines: Vec<String>,
    pub progress: Vec<String>,
}

#[cfg(test)]
impl MemoryReporter {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

#[cfg(test)]
impl Reporter for MemoryReporter {
    fn line(&mut self, text: &str) {
        self.lines.extend(text.lines().map(str::to_string));
    }

    fn progress(&mut self, text: &str) {
        self.progress.push(text.to_string());
    }
}
