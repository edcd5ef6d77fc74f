//! Outcome plumbing.

/// Unwrap an `Outcome::Ok`, returning any other variant from the enclosing
/// function unchanged.
///
/// ```ignore
/// let count = try_outcome!(tx.count(cx, table, &filter).await);
/// ```
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(v) => v,
            $crate::Outcome::Err(e) => return $crate::Outcome::Err(e),
            $crate::Outcome::Cancelled(r) => return $crate::Outcome::Cancelled(r),
            $crate::Outcome::Panicked(p) => return $crate::Outcome::Panicked(p),
        }
    };
}
