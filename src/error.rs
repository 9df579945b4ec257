use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! argument_error {
    // Single string version
    ($name:expr, $msg:expr) => {
        crate::Error::InvalidArgument {
            name: $name,
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($name:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidArgument {
            name: $name,
            message: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! synthesis_error {
    ($type_name:expr, $member:expr, $msg:expr) => {
        crate::Error::Synthesis {
            type_name: $type_name.to_string(),
            member: $member.to_string(),
            message: $msg.to_string(),
        }
    };

    ($type_name:expr, $member:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Synthesis {
            type_name: $type_name.to_string(),
            member: $member.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! invalid_program {
    ($method:expr, $offset:expr, $msg:expr) => {
        crate::Error::InvalidProgram {
            method: $method.to_string(),
            offset: $offset,
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($method:expr, $offset:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidProgram {
            method: $method.to_string(),
            offset: $offset,
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Validation Errors
/// - [`Error::InvalidArgument`] - A required argument of a synthesis request is missing or empty
///
/// ## Synthesis Errors
/// - [`Error::Synthesis`] - A proxy type could not be finalized, names the offending member
///
/// ## Pool Errors
/// - [`Error::PoolInconsistent`] - The pool's own bookkeeping is broken
/// - [`Error::Disposed`] - The pool was used after `dispose()`
/// - [`Error::DisposeFailed`] - One or more pooled values failed to release their resources
///
/// ## Runtime Errors
/// - [`Error::InvalidProgram`] - A synthesized body is not executable
/// - [`Error::Thrown`] - A synthesized body executed `throw`
/// - [`Error::MemberNotFound`] - No member with the requested name/arity exists
/// - [`Error::ArgumentMismatch`] - Supplied arguments do not fit the signature
///
/// ## Type System Errors
/// - [`Error::TypeNotFound`] - Requested type not found in the registry
/// - [`Error::TypeError`] - General type system operation error
///
/// # Examples
///
/// ```rust
/// use dotproxy::{Error, ProxyPool};
///
/// let pool: ProxyPool<&str, i32> = ProxyPool::new();
/// pool.dispose()?;
/// match pool.add("conn", 1) {
///     Err(Error::Disposed) => println!("pool already disposed"),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), dotproxy::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was missing or empty.
    ///
    /// Raised synchronously, before any synthesis context is allocated. Always
    /// recoverable by correcting the input.
    #[error("Invalid argument '{name}' - {message}")]
    InvalidArgument {
        /// The name of the offending argument
        name: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// The proxy type could not be defined.
    ///
    /// Surfaced when finalizing a type whose definition is incomplete or
    /// contradictory, e.g. an interface member without implementation or a
    /// method body that never returns.
    #[error("Synthesis of '{type_name}' failed at '{member}': {message}")]
    Synthesis {
        /// Full name of the type being synthesized
        type_name: String,
        /// The member (or signature) that could not be defined
        member: String,
        /// Details
        message: String,
    },

    /// The pool could not create or locate the queue for a key.
    #[error("Pool invariant violated - {0}")]
    PoolInconsistent(String),

    /// The pool has been disposed and can no longer be used.
    #[error("The pool has been disposed")]
    Disposed,

    /// Some pooled values failed to release their resources during disposal.
    #[error("Failed to dispose {failed} of {total} pooled values")]
    DisposeFailed {
        /// Number of values whose disposal failed
        failed: usize,
        /// Number of values that were drained
        total: usize,
    },

    /// A synthesized body could not be executed.
    ///
    /// Includes the source location where the problem was detected for debugging purposes.
    #[error("Invalid program in '{method}' at instruction {offset} ({file}:{line}): {message}")]
    InvalidProgram {
        /// The method whose body is invalid
        method: String,
        /// Index of the failing instruction
        offset: usize,
        /// Details
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A synthesized body executed `throw`.
    #[error("Exception thrown by '{method}': {message}")]
    Thrown {
        /// The throwing method
        method: String,
        /// The thrown message
        message: String,
    },

    /// No member with the requested name (and arity) exists.
    #[error("Member not found - {0}")]
    MemberNotFound(String),

    /// The supplied arguments do not fit the member's signature.
    #[error("Argument mismatch for '{member}': {message}")]
    ArgumentMismatch {
        /// The invoked member
        member: String,
        /// Details
        message: String,
    },

    /// Failed to find type in `TypeRegistry`.
    #[error("Failed to find type in TypeRegistry - {0}")]
    TypeNotFound(Token),

    /// General error during `TypeRegistry` usage.
    #[error("{0}")]
    TypeError(String),

    /// Generic error for miscellaneous failures, e.g. raised by native members.
    #[error("{0}")]
    Error(String),
}
