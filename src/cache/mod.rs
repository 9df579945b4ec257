//! Keyed, concurrent pooling of reusable values.
//!
//! [`ProxyPool`] maps each key to a lock-free FIFO queue of values. The factory uses one
//! pool to record synthesized proxy types by name and another to recycle proxy instances;
//! the pool itself is generic and usable for any value implementing [`Disposable`].
//!
//! # Examples
//!
//! ```rust
//! use dotproxy::ProxyPool;
//!
//! let pool: ProxyPool<String, String> = ProxyPool::new();
//! pool.add("db".to_string(), "conn A".to_string())?;
//! pool.add("db".to_string(), "conn B".to_string())?;
//!
//! assert_eq!(pool.count(&"db".to_string()), 2);
//! assert_eq!(pool.request(&"db".to_string())?.as_deref(), Some("conn A"));
//! assert_eq!(pool.count(&"db".to_string()), 1);
//! # Ok::<(), dotproxy::Error>(())
//! ```

mod pool;

pub use pool::{default_concurrency, ProxyPool};

use crate::Result;

/// A value that holds resources which must be released when its pool is disposed
pub trait Disposable {
    /// Release the resources held by this value
    ///
    /// # Errors
    /// Returns an error if the resources could not be released; the pool logs it and
    /// continues with the remaining values.
    fn dispose(self) -> Result<()>;
}

macro_rules! impl_disposable_noop {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Disposable for $ty {
                fn dispose(self) -> Result<()> {
                    Ok(())
                }
            }
        )*
    };
}

impl_disposable_noop!(
    bool, char, i8, u8, i16, u16, i32, u32, i64, u64, i128, u128, isize, usize, f32, f64,
    String, &str,
);

impl<T: Disposable> Disposable for Box<T> {
    fn dispose(self) -> Result<()> {
        (*self).dispose()
    }
}

impl<T: Disposable> Disposable for Option<T> {
    fn dispose(self) -> Result<()> {
        self.map_or(Ok(()), Disposable::dispose)
    }
}
