//! Exit codes for CLI operations
//!
//! Each failure family gets its own code so pipelines can tell a refused
//! environment apart from a broken deployment. Usage errors follow sysexits.h.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure, or an environment that stayed unhealthy
pub const ERROR: i32 = 1;

/// Configuration error - unreadable or malformed charts file, bad override or flag value
pub const CONFIG_ERROR: i32 = 2;

/// Dependency graph error - circular or dangling chart dependency
pub const DEPENDENCY_ERROR: i32 = 3;

/// Environment state error - the environment is locked in a state that needs an operator
pub const ENV_STATE_ERROR: i32 = 4;

/// Environment access error - the namespace could not be read or updated
pub const ENV_ACCESS_ERROR: i32 = 5;

/// Deployment error - installing or removing a release failed
pub const DEPLOYMENT_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
