use std::error::Error;

/// Secondary sink that receives a destination's own failures.
///
/// Reports are best-effort and must never fail or block; the usual
/// implementation is a [`ConsoleAdapter`](crate::console::ConsoleAdapter)
/// restricted to the `error` level.
pub trait Fallback: Send + Sync {
    fn report(&self, context: &str, error: &(dyn Error + 'static));
}
