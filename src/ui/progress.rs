//! Progress indicators for the publish loop
//!
//! Uses `linya`, which draws to stderr. Bars are only shown on a terminal.

use linya::{Bar, Progress};
use std::io::IsTerminal;

/// Progress bar over the tags being pushed
pub struct PublishProgress {
  inner: Option<(Progress, Bar)>,
}

impl PublishProgress {
  /// A bar is drawn only when `enabled` and stderr is a terminal
  pub fn new(total: usize, label: impl Into<String>, enabled: bool) -> Self {
    let inner = (enabled && total > 0 && std::io::stderr().is_terminal()).then(|| {
      let mut progress = Progress::new();
      let bar = progress.bar(total, label.into());
      (progress, bar)
    });
    Self { inner }
  }

  /// Increment progress by 1
  pub fn inc(&mut self) {
    if let Some((progress, bar)) = &mut self.inner {
      progress.inc_and_draw(bar, 1);
    }
  }
}
