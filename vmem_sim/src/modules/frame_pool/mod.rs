/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::ops::Range;

use rand::rngs::SmallRng;
use rand::Rng;

/// Identifies one physical frame inside its pool.
pub type FrameId = u64;

/// Which of the three disjoint pools a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    DataRam,
    TableRam,
    Swap,
}

/// An ordered pool of free frame numbers.
///
/// The pool keeps its frames sorted ascending so that contiguous-run
/// scanning and the sorted view are cheap. Pools are built over disjoint
/// ranges, and a frame is either in exactly one pool or claimed by exactly
/// one page table.
#[derive(Debug, Clone)]
pub struct FramePool {
    kind: PoolKind,
    frames: Vec<FrameId>,
}

impl FramePool {
    /// Creates a pool holding every frame in `range`.
    pub fn new(kind: PoolKind, range: Range<FrameId>) -> Self {
        Self {
            kind,
            frames: range.collect(),
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, frame: FrameId) -> bool {
        self.frames.binary_search(&frame).is_ok()
    }

    /// Sorted view of the free frames.
    pub fn sorted_view(&self) -> &[FrameId] {
        &self.frames
    }

    /// Removes and returns a uniformly chosen frame.
    pub fn take_random(&mut self, rng: &mut SmallRng) -> Option<FrameId> {
        if self.frames.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.frames.len());
        Some(self.frames.remove(index))
    }

    /// Removes `frame` if the pool still holds it.
    pub fn take_specific(&mut self, frame: FrameId) -> bool {
        match self.frames.binary_search(&frame) {
            Ok(index) => {
                self.frames.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes the `count` lowest-numbered frames, or nothing at all if
    /// fewer are available.
    pub fn take_lowest(&mut self, count: usize) -> Option<Vec<FrameId>> {
        if self.frames.len() < count {
            return None;
        }
        Some(self.frames.drain(..count).collect())
    }

    /// Removes the frames `[start, start + count)` in one sweep. Returns
    /// `None` (and removes nothing) unless every frame of the range is
    /// free, i.e. the range is a contiguous run of this pool.
    pub fn take_range(&mut self, start: FrameId, count: u64) -> Option<Vec<FrameId>> {
        if count == 0 {
            return Some(Vec::new());
        }
        let index = self.frames.binary_search(&start).ok()?;
        let end = index + count as usize;
        if end > self.frames.len() || self.frames[end - 1] != start + count - 1 {
            return None;
        }
        Some(self.frames.drain(index..end).collect())
    }

    /// Reinserts a frame at its sorted position.
    pub fn release(&mut self, frame: FrameId) {
        if let Err(index) = self.frames.binary_search(&frame) {
            self.frames.insert(index, frame);
        }
    }
}
