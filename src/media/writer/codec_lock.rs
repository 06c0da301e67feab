// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide lock around codec construction and destruction
//!
//! Only held while encoders and containers are created or torn down, never
//! around steady-state encode/write calls.

use std::sync::{Mutex, MutexGuard};

static CODEC_LOCK: Mutex<()> = Mutex::new(());

/// Acquire the codec lock, recovering from poisoning
pub fn codec_lock() -> MutexGuard<'static, ()> {
    CODEC_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
