//! A state container that advances one piece of state by applying events,
//! while feedbacks observe the state and produce more events.
//!
//! ```
//! use futures::stream;
//! use loopgate::{Feedback, Loop, LoopBox};
//!
//! let feedback = Feedback::when_becomes_true(
//!     |n: &i32| *n == 1,
//!     |_| stream::iter([10]),
//! );
//! let l = Loop::new(0, |s: &mut i32, e: &i32| *s += e, [feedback]);
//! l.send(1);
//! assert_eq!(l.state(), 11);
//! ```
mod consumer;
mod effect;
mod error;
mod feedback;
mod feedback_loop;
mod floodgate;
mod loop_box;
mod reentrant_lock;
mod states;
mod stream;
mod subscription;

pub mod reducer;

pub use consumer::*;
pub use error::*;
pub use feedback::*;
pub use feedback_loop::*;
pub use loop_box::{LoopBox, ScopedLoop};
pub use reentrant_lock::*;
pub use states::States;
pub use stream::*;
pub use subscription::*;
