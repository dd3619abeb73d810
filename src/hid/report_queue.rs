//! Outbound input-report queue.
//!
//! Producers (the encoders) push from any context; the notification pump
//! pops one entry per tick. Strict FIFO, unbounded.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

pub struct ReportQueue {
    reports: Mutex<CriticalSectionRawMutex, RefCell<VecDeque<Vec<u8>>>>,
}

impl ReportQueue {
    pub const fn new() -> Self {
        Self {
            reports: Mutex::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Enqueue a copy of `report`. Empty reports are dropped; returns
    /// whether anything was queued.
    pub fn push(&self, report: &[u8]) -> bool {
        if report.is_empty() {
            return false;
        }
        self.reports
            .lock(|q| q.borrow_mut().push_back(report.to_vec()));
        true
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.reports.lock(|q| q.borrow_mut().pop_front())
    }

    pub fn len(&self) -> usize {
        self.reports.lock(|q| q.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.reports.lock(|q| q.borrow_mut().clear());
    }
}

impl Default for ReportQueue {
    fn default() -> Self {
        Self::new()
    }
}
