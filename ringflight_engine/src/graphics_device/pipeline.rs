/// Pipeline trait

use std::any::Any;

/// Compiled graphics pipeline
///
/// Shader compilation and pipeline creation happen outside the engine; the
/// backend wraps whatever native object results.
pub trait Pipeline: Send + Sync {
    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
