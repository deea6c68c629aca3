//! Transient toast surface: bounded visibility, FIFO overflow queue,
//! sliding-window admission limit and pause-aware auto-dismiss.

pub mod manager;
pub mod queue;
pub mod rate_limit;

pub use manager::{ToastManager, ToastSnapshot};
pub use queue::{
    DismissReason, EnqueueOutcome, Hold, Removal, ToastConfig, ToastEvent, ToastQueue,
    REMOVAL_CLASS,
};
