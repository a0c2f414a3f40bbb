//! API middleware.
//!
//! Execution order (outermost → innermost):
//! 1. Timing: logs every request and sets `X-Process-Time`
//! 2. Debug errors: only mounted when `DEBUG=true`

pub mod debug;
pub mod timing;
