use std::time::Duration;

/// Deep enough for any real discussion; deeper branches wait for `expand`.
pub const DEFAULT_MAX_DEPTH: usize = 32;
/// Boost failures are a transient marker on the control, not a dialog.
pub const BOOST_ERROR_TTL_SECS: u64 = 5;

pub const TICK_RATE_MS: u64 = 100;
/// Long enough to read; short enough to not permanently obscure the tree.
pub const ERROR_TTL_SECS: u64 = 10;
pub const NOTIFICATION_TTL_SECS: u64 = 4;
/// Must match the length of `BRAILLE_FRAMES` in `tui::spinner`.
pub const SPINNER_FRAME_COUNT: usize = 10;
/// Below 60 cols, author and age columns are dropped.
pub const NARROW_WIDTH_THRESHOLD: u16 = 60;
/// Columns of indentation per tree level.
pub const INDENT_WIDTH: usize = 2;

/// Immutable once the controller is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Nodes at this depth (root = 0) are created but not auto-expanded.
    pub max_depth: usize,
    pub boost_error_ttl: Duration,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            boost_error_ttl: Duration::from_secs(BOOST_ERROR_TTL_SECS),
        }
    }
}

impl TreeConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
