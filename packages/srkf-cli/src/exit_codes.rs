pub const SUCCESS: i32 = 0;
/// Engine failure, I/O failure, or every session failed
pub const EXECUTION_ERROR: i32 = 1;
/// Bad flags, config, mask, variant or recording
pub const INPUT_ERROR: i32 = 2;
/// Some series or sessions failed, others succeeded
pub const PARTIAL_FAILURE: i32 = 3;
