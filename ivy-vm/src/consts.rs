//! VM parameters.

/// Maximum number of live call frames, `__main__` included. The call
/// opcodes raise `RuntimeError` instead of pushing past this.
pub const CALL_DEPTH_LIMIT: usize = 100;

/// Live gc entries allowed before a `tag` triggers a sweep.
pub const GC_INITIAL_THRESHOLD: usize = 100;

/// Threshold multiplier applied when a sweep fails to get the live count
/// back under the threshold.
pub const GC_DEFAULT_MULTIPLIER: usize = 4;

/// Registers reserved at boot before `__main__` declares its needs.
pub const INITIAL_REGISTER_COUNT: usize = 4;
