//! Classification of the tool's stderr output

use crate::config::StderrConfig;
use crate::error::{Error, Result};
use regex::Regex;

/// What a stderr line means for the run's outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrClass {
    /// Matches a configured ignorable message; dropped
    Ignored,
    /// A warning; raises the outcome to Warning
    Warning,
    /// Debug chatter; dropped
    Debug,
    /// Anything else; raises the outcome to Error
    Error,
}

/// Compiled stderr patterns
///
/// Lines are tested in a fixed order: ignorable patterns, then the warning
/// pattern, then the debug pattern. Unmatched lines are errors.
#[derive(Debug, Clone)]
pub struct StderrClassifier {
    ignore: Vec<Regex>,
    warning: Regex,
    debug: Regex,
}

impl StderrClassifier {
    /// Compile the patterns from configuration
    pub fn from_config(config: &StderrConfig) -> Result<Self> {
        let ignore = config
            .ignore_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    Error::config(
                        "stderr.ignore_patterns",
                        format!("invalid pattern '{}': {}", pattern, e),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let warning = Regex::new(&config.warning_pattern).map_err(|e| {
            Error::config("stderr.warning_pattern", format!("invalid pattern: {}", e))
        })?;
        let debug = Regex::new(&config.debug_pattern).map_err(|e| {
            Error::config("stderr.debug_pattern", format!("invalid pattern: {}", e))
        })?;

        Ok(Self {
            ignore,
            warning,
            debug,
        })
    }

    /// Classify one stderr line
    pub fn classify(&self, line: &str) -> StderrClass {
        if self.ignore.iter().any(|re| re.is_match(line)) {
            StderrClass::Ignored
        } else if self.warning.is_match(line) {
            StderrClass::Warning
        } else if self.debug.is_match(line) {
            StderrClass::Debug
        } else {
            StderrClass::Error
        }
    }
}
