//! Process exit codes of `cdsign`.
//! Typed library errors map onto these through their `exit_code()`.

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1; // Bad input, missing component, unusable key or config
pub const UNAUTHORIZED: i32 = 2; // Registry rejected the credentials
pub const INTEGRITY_VIOLATION: i32 = 4; // Digest or signature check failed
pub const UNAVAILABLE: i32 = 5; // Network failure, rate limit or deadline
pub const BACKEND_FAILURE: i32 = 6; // Signing backend or registry misbehaved
