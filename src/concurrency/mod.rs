//! Concurrency disciplines around an [`Executor`](crate::executor::Executor).
//!
//! The executor itself is a plain single-threaded value. Each wrapper here
//! fixes who may drive it and how timer expiries and finished activities
//! get back in:
//!
//! | wrapper                   | callers                    | re-entry                      |
//! |---------------------------|----------------------------|-------------------------------|
//! | bare `Executor`           | exclusive `&mut`           | mailbox, drained by `pump`    |
//! | [`AffineExecutor`]        | first calling thread only  | mailbox, drained before calls |
//! | [`SynchronizedExecutor`]  | any thread, mutex          | takes the mutex               |
//! | [`RwExecutor`]            | any thread, rw lock        | takes the write lock          |
//! | [`ShardedPool`]           | any thread, message passing| queued on the owning worker   |

mod affine;
mod rwlock;
mod sharded;
mod synchronized;

pub use affine::AffineExecutor;
pub use rwlock::RwExecutor;
pub use sharded::{Pending, ShardedHandle, ShardedPool};
pub use synchronized::SynchronizedExecutor;
