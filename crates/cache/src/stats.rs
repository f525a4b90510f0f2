// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Hit/miss counters and the process-global enabled flag.
//!
//! Counters are monotonic and updated per access; totals read across threads
//! may lag briefly, which is acceptable for the stats surface.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static HITS: AtomicU64 = AtomicU64::new(0);
static MISSES: AtomicU64 = AtomicU64::new(0);
static ENABLED: AtomicBool = AtomicBool::new(true);

pub fn increment_hits() {
    HITS.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_misses() {
    MISSES.fetch_add(1, Ordering::Relaxed);
}

pub fn hits() -> u64 {
    HITS.load(Ordering::Relaxed)
}

pub fn misses() -> u64 {
    MISSES.load(Ordering::Relaxed)
}

pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn set_enabled(on: bool) {
    ENABLED.store(on, Ordering::Relaxed);
}

/// Test hook; production code never resets counters.
pub fn reset() {
    HITS.store(0, Ordering::Relaxed);
    MISSES.store(0, Ordering::Relaxed);
}
