//! Stream buffering
//!
//! This module provides:
//! - [`RingBuffer`]: bounded, sequence-numbered store of the latest chunks
//! - [`ListenerCursor`]: per-listener read position with underrun handling
//! - [`SharedBuffer`]: the ring behind a lock with broadcast wakeups

pub mod chunk;
pub mod cursor;
pub mod ring;
pub mod shared;

pub use chunk::Chunk;
pub use cursor::{CursorRead, ListenerCursor, UnderrunPolicy};
pub use ring::{capacity_for, RingBuffer};
pub use shared::{BufferRead, BufferSnapshot, SharedBuffer};
