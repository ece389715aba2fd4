use crate::{error::IllegalContextError, port::PortThreading};

/// If the current context is an interrupt context, return
/// `Err(IllegalContext)`.
///
/// Operations mutating the delta list are only allowed in a thread context.
#[inline]
pub(crate) fn expect_thread_context<P: PortThreading + ?Sized>(
    port: &P,
) -> Result<(), IllegalContextError> {
    if port.is_interrupt_context() {
        Err(IllegalContextError::IllegalContext)
    } else {
        Ok(())
    }
}
