//! Error types
use core::{fmt, mem::transmute};

use crate::TimerId;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use r3_swtimer::ResultCode;
            /// assert_eq!(ResultCode::IllegalContext.as_str(), "IllegalContext");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }

        impl fmt::Display for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that the timer service can
    /// return.
    ///
    /// The numeric values follow the closest equivalents in μITRON4.0.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// A parameter is invalid, e.g., a missing callback, a missing timer
        /// kind, or a zero delay.
        InvalidArgument = -17,
        /// The current context disallows the operation. Mutating operations
        /// are rejected in an interrupt context.
        IllegalContext = -25,
        /// There are no free timer slots.
        OutOfMemory = -33,
        /// The target timer is not in a state that allows the operation, or
        /// the handle doesn't refer to a live timer.
        ResourceUnavailable = -41,
        /// The dispatch queue is full.
        QueueOverflow = -43,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident $(: $($subty:ident),* $(,)*)? {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode` for cost-free
                // conversion
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                // Safety: `ResultCode` and `$name` has the same representation
                //         type, and the representation of `ResultCode` is a
                //         superset of `x`.
                unsafe { transmute(x) }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }

        $($(
            $subty!(impl From<_> for $name);
        )*)?

        #[allow(unused_macros)]
        macro_rules! $name {
            (impl From<_> for $dest_ty:ty) => {
                impl From<$name> for $dest_ty {
                    #[inline]
                    fn from(x: $name) -> Self {
                        match x {
                            $(
                                $name::$vname => Self::$vname,
                            )*
                        }
                    }
                }
            };
        }
    };
}

define_error! {
    mod illegal_context_error {}
    /// `IllegalContext`
    pub(crate) enum IllegalContextError {
        IllegalContext,
    }
}

define_error! {
    mod bad_id_error {}
    /// `ResourceUnavailable` caused by a handle that doesn't refer to a live
    /// timer.
    pub(crate) enum BadIdError {
        ResourceUnavailable,
    }
}

define_error! {
    mod create_timer_error {}
    /// Error type for [`TimerService::create`].
    ///
    /// [`TimerService::create`]: crate::TimerService::create
    pub enum CreateTimerError {
        /// The callback or the timer kind was not specified, or the name is
        /// too long.
        InvalidArgument,
        /// All timer slots are in use.
        OutOfMemory,
    }
}

define_error! {
    mod start_timer_error {}
    /// Error type for [`TimerService::start`].
    ///
    /// [`TimerService::start`]: crate::TimerService::start
    pub enum StartTimerError: IllegalContextError, BadIdError {
        /// The delay is zero.
        InvalidArgument,
        /// The current context is an interrupt context.
        IllegalContext,
        /// The handle doesn't refer to a live timer.
        ResourceUnavailable,
    }
}

define_error! {
    mod stop_timer_error {}
    /// Error type for [`TimerService::stop`].
    ///
    /// [`TimerService::stop`]: crate::TimerService::stop
    pub enum StopTimerError: IllegalContextError, BadIdError {
        /// The current context is an interrupt context.
        IllegalContext,
        /// The timer is not in the Running state, or the handle doesn't
        /// refer to a live timer.
        ResourceUnavailable,
    }
}

define_error! {
    mod delete_timer_error {}
    /// Error type for [`TimerService::delete`].
    ///
    /// [`TimerService::delete`]: crate::TimerService::delete
    pub enum DeleteTimerError: IllegalContextError, BadIdError {
        /// The current context is an interrupt context.
        IllegalContext,
        /// The handle doesn't refer to a live timer.
        ResourceUnavailable,
    }
}

define_error! {
    mod query_timer_error {}
    /// Error type for the read-only timer accessors such as
    /// [`TimerService::remaining_ticks`].
    ///
    /// [`TimerService::remaining_ticks`]: crate::TimerService::remaining_ticks
    pub enum QueryTimerError: BadIdError {
        /// The handle doesn't refer to a live timer.
        ResourceUnavailable,
    }
}

define_error! {
    mod pend_call_error {}
    /// Error type for [`TimerService::pend_call`].
    ///
    /// [`TimerService::pend_call`]: crate::TimerService::pend_call
    pub enum PendCallError {
        /// The dispatch queue is full.
        QueueOverflow,
    }
}

define_error! {
    mod boot_error {}
    /// Error type for [`TimerService::new`].
    ///
    /// [`TimerService::new`]: crate::TimerService::new
    pub enum BootError {
        /// The configuration is invalid, e.g., the timer capacity is zero.
        InvalidArgument,
    }
}

/// An error that can't be returned to any caller because it was detected in
/// an interrupt context. It's reported through
/// [`PortDiagnostics::report_async_error`] instead.
///
/// [`PortDiagnostics::report_async_error`]: crate::port::PortDiagnostics::report_async_error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncError {
    /// The dispatch queue was full when `timer` expired. This firing was
    /// dropped. If the timer is periodic, it has been rearmed nonetheless.
    DispatchOverflow { timer: TimerId },
}

impl AsyncError {
    /// Get the [`ResultCode`] that best describes this error.
    #[inline]
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::DispatchOverflow { .. } => ResultCode::QueueOverflow,
        }
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DispatchOverflow { timer } => {
                write!(f, "dispatch queue overflow; firing of {timer:?} was dropped")
            }
        }
    }
}
