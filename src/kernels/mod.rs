//! AIE micro-kernels.
//!
//! These are the core programs the emulated device runs. Each one is a plain
//! function over slices with an explicit element count, mirroring the
//! `extern "C"` entry points compiled for the compute tiles.
//!
//! | Kernel            | Inputs            | Outputs          |
//! |-------------------|-------------------|------------------|
//! | [`odd_even`]      | `input`           | `odd`, `even`    |
//! | [`odd_even_indexed`] | `input`        | `even`, `odd`    |
//! | [`vector_plus_one`] | `a`             | `c`              |
//! | [`join`]          | `input`, `input1` | `index`, `value` |
//!
//! The kernels know nothing about profiling. The device wraps each call with
//! [`bracket`], which fires the `event0`/`event1` markers on an [`EventHook`].

pub mod join;
pub mod odd_even;
pub mod vector;

pub use join::{join, JoinCount};
pub use odd_even::{odd_even, odd_even_indexed, Partition};
pub use vector::vector_plus_one;

/// Profiling markers that bracket a kernel body.
///
/// On hardware these are the `event0()`/`event1()` intrinsics that pulse the
/// core's trace unit.
pub trait EventHook {
    /// Fired immediately before the kernel body.
    fn event0(&mut self);

    /// Fired immediately after the kernel body.
    fn event1(&mut self);
}

/// Hook that ignores both markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl EventHook for NoEvents {
    #[inline]
    fn event0(&mut self) {}

    #[inline]
    fn event1(&mut self) {}
}

/// Run `body` between `event0` and `event1`.
pub fn bracket<R>(events: &mut dyn EventHook, body: impl FnOnce() -> R) -> R {
    events.event0();
    let result = body();
    events.event1();
    result
}

/// Clamp a signed kernel length to an element count.
///
/// Kernel entry points take `int32_t N`; anything non-positive is an empty run.
#[inline]
pub(crate) fn element_count(n: i32) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<&'static str>);

    impl EventHook for Recorder {
        fn event0(&mut self) {
            self.0.push("event0");
        }
        fn event1(&mut self) {
            self.0.push("event1");
        }
    }

    #[test]
    fn test_bracket_orders_events_around_body() {
        let mut rec = Recorder::default();
        let value = bracket(&mut rec, || 42);
        assert_eq!(value, 42);
        assert_eq!(rec.0, vec!["event0", "event1"]);
    }

    #[test]
    fn test_element_count() {
        assert_eq!(element_count(8), 8);
        assert_eq!(element_count(0), 0);
        assert_eq!(element_count(-5), 0);
    }
}
