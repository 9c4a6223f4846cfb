//! Lifecycle controllers for chat entities.
//!
//! A [`Controller`] holds how much data backing a channel, message or user has
//! been loaded and tells a single, weakly held delegate about every change.
//! Notifications are never delivered inline: they are queued on the
//! controller's [`CallbackQueue`] and run there in submission order.

pub mod controller;
pub mod entity;
pub mod error;
pub mod queue;
pub mod testing;
pub mod transition;

pub use controller::{Controller, ControllerStateDelegate, DataState, LifecycleState};
pub use entity::{ChannelController, ChannelState, EntityController, MessageController, UserController};
pub use error::{QueueError, TransitionError};
pub use queue::{current_queue_id, main_queue, CallbackQueue, Job, QueueId, TaskQueue, ThreadQueue};
pub use transition::advance;
