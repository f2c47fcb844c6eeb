//! Shim module to abstract over core and loom primitives.
//!
//! The lattice and fusion atomics and the value cell go through this module so
//! that the `loom` feature can model-check every interleaving of the channel.
//!
//! 抽象 core 与 loom 原语的垫片模块。
//!
//! 状态格、融合原子量以及值单元都经过此模块，
//! 使得 `loom` 特性可以对通道的每一种交错执行进行模型检查。

#[cfg(not(feature = "loom"))]
pub(crate) mod atomic {
    pub(crate) use core::sync::atomic::{AtomicU8, Ordering};
}

#[cfg(feature = "loom")]
pub(crate) mod atomic {
    pub(crate) use loom::sync::atomic::{AtomicU8, Ordering};
}

#[cfg(not(feature = "loom"))]
pub(crate) mod cell {
    #[derive(Debug)]
    #[repr(transparent)]
    pub(crate) struct UnsafeCell<T: ?Sized>(core::cell::UnsafeCell<T>);

    impl<T> UnsafeCell<T> {
        #[inline]
        pub(crate) const fn new(data: T) -> UnsafeCell<T> {
            UnsafeCell(core::cell::UnsafeCell::new(data))
        }
    }

    impl<T: ?Sized> UnsafeCell<T> {
        #[inline]
        pub(crate) fn with_mut<F, R>(&self, f: F) -> R
        where
            F: FnOnce(*mut T) -> R,
        {
            f(self.0.get())
        }
    }
}

#[cfg(feature = "loom")]
pub(crate) mod cell {
    pub(crate) use loom::cell::UnsafeCell;
}
