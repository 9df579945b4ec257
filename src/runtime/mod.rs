//! Execution of proxy instances.
//!
//! # Key Components
//!
//! - [`Value`] / [`ValueSlot`] - Runtime values and by-reference storage cells
//! - [`Object`] / [`Array`] - Heap instances
//! - [`Interpreter`] - Executes emitted CIL bodies and native host members
//! - [`Invocation`] - What a native member receives when it is called

mod interpreter;
mod object;
mod value;

pub use interpreter::{Interpreter, Invocation, DEFAULT_MAX_CALL_DEPTH};
pub use object::{Array, ArrayRef, Object, ObjectRef};
pub use value::{Value, ValueSlot};
