//! Recoverable-warning channel: warnings are surfaced to the caller but
//! never change generated code.

use crate::SourceLoc;

#[derive(Clone, Debug)]
pub struct Warning {
    pub message: String,
    pub loc: Option<SourceLoc>,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{loc}: warning: {}", self.message),
            None => write!(f, "warning: {}", self.message),
        }
    }
}

/// Collects non-fatal diagnostics produced while analyzing or lowering a
/// system. Every push is also logged at `warn` level so a CLI run shows
/// them without the caller having to drain the collector.
#[derive(Default, Debug)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn<S: Into<String>>(&mut self, message: S) {
        let warning = Warning {
            message: message.into(),
            loc: None,
        };
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warn_at<S: Into<String>>(&mut self, message: S, loc: SourceLoc) {
        let warning = Warning {
            message: message.into(),
            loc: Some(loc),
        };
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
