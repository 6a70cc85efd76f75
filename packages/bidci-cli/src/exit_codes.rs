pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
/// Bad configuration, missing recordings or unusable arguments.
pub const INPUT_ERROR: i32 = 2;
pub const BRIDGE_NOT_FOUND: i32 = 3;
/// Some (subject, run) pairs failed under `--continue-on-error`.
pub const PARTIAL_FAILURE: i32 = 4;
