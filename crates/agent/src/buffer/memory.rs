// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

use crate::error::AgentError;
use crate::point::Point;

use super::Buffer;

const DEFAULT_MAX_SIZE: usize = 10_000;

/// In-memory FIFO buffer. Default backend; contents are lost on restart.
pub struct MemoryBuffer {
    max_size: usize,
    inner: Mutex<VecDeque<Point>>,
}

impl MemoryBuffer {
    pub fn new(max_size: usize) -> Self {
        Self { max_size, inner: Mutex::new(VecDeque::new()) }
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl Buffer for MemoryBuffer {
    fn add(&self, points: &[Point]) -> Result<usize, AgentError> {
        if points.is_empty() {
            return Ok(0);
        }
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend(points.iter().cloned());
        let mut evicted = 0;
        while buf.len() > self.max_size {
            buf.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            warn!(evicted, "local buffer full, dropped oldest points");
        }
        Ok(evicted)
    }

    fn snapshot(&self) -> Vec<Point> {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.iter().cloned().collect()
    }

    fn clear(&self) {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.clear();
    }

    fn len(&self) -> usize {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.len()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
