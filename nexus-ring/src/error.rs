//! Construction errors.

/// Rejected queue capacity.
///
/// Construction either completes or returns one of these; a queue is never
/// handed out half-built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    /// Heap storage needs a positive runtime capacity.
    #[error("capacity must be a positive number; heap storage requires a capacity argument")]
    Zero,
    /// Inline storage takes its capacity from the type; the runtime argument must be 0.
    #[error("runtime capacity {0} given to inline storage; inline capacity is fixed by the type")]
    RuntimeCapacity(usize),
    /// Capacity plus the reserved slot and guard padding does not fit in `usize`.
    #[error("capacity {requested} plus padding overflows usize")]
    Overflow {
        /// The capacity that was asked for.
        requested: usize,
    },
}
