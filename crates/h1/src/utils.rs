//! Internal helper macros.

/// Returns early with `$error` when `$predicate` doesn't hold.
///
/// Like `assert!`, but for conditions that depend on input and are reported as
/// errors instead of panics.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
