//! Terminal output formatting.
//!
//! Status lines go to stdout, errors to stderr. Colors follow
//! [`colors::ColorSupport`] detection.

pub mod colors;
pub mod errors;

use keel_core::types::ResolutionReport;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    /// Create a new output handler
    pub fn new() -> Self {
        Self {
            colors: colors::ColorSupport::detect(),
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.colors.red("✗"), message);
    }

    /// Print the rendered report, marking problem lines
    pub fn report(&self, report: &ResolutionReport) {
        for line in report.render().lines() {
            if is_problem(line) {
                self.warn(line);
            } else {
                println!("{}", line);
            }
        }
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_problem(line: &str) -> bool {
    const PREFIXES: [&str; 4] = ["Platforms:", "Installed features:", "Prepared features:", "Already installed:"];
    !PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}
