// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Third-party codecs and the EXIF writer can panic on malformed input; every
// call into them goes through `run_with_panic_policy` so a panic surfaces as
// `InternalPanic` instead of unwinding through the caller.

use crate::error::{RasterKitError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Run `body`, converting a panic into `RasterKitError::InternalPanic`.
///
/// `label` names the codec stage in the error message and the log line.
pub fn run_with_panic_policy<T, F>(label: &'static str, body: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            error!(target: "rasterkit::decode", stage = label, %detail, "codec panicked");
            Err(RasterKitError::internal_panic(format!("{label}: {detail}")))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
