//! Transfer orchestration: the single-slot session, the copy/cut clipboard
//! and the progress snapshot fed by `speed_update`.

pub mod clipboard;
pub mod progress;
pub mod session;
