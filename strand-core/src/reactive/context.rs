//! Tracking Context
//!
//! The tracking context records which derivation is currently running so
//! that reads can be attributed to it.
//!
//! # Implementation
//!
//! A stack of frames owned by the [`Runtime`](super::Runtime). Running a
//! derivation pushes a frame; every observed read lands in the top frame;
//! when the run ends the frame is popped and its reads become the
//! derivation's new dependency set.
//!
//! `untracked` pushes a sentinel frame with no derivation. Reads under a
//! sentinel are not recorded anywhere, even if a tracking frame sits below.
//!
//! The stack supports nesting: a reaction that reads a computed that has to
//! re-evaluate holds two frames while the computed runs.

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::graph::NodeId;

/// One in-flight run.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The running derivation, or `None` for an untracked sentinel.
    derivation: Option<NodeId>,

    /// Nodes read during this run, in first-read order.
    observed: IndexSet<NodeId>,

    /// Set when a cycle through this frame was detected.
    cyclic: bool,
}

impl Frame {
    pub fn tracking(derivation: NodeId) -> Self {
        Self {
            derivation: Some(derivation),
            observed: IndexSet::new(),
            cyclic: false,
        }
    }

    pub fn untracked() -> Self {
        Self {
            derivation: None,
            observed: IndexSet::new(),
            cyclic: false,
        }
    }

    pub fn derivation(&self) -> Option<NodeId> {
        self.derivation
    }

    pub fn observed(&self) -> &IndexSet<NodeId> {
        &self.observed
    }

    pub fn into_observed(self) -> IndexSet<NodeId> {
        self.observed
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }
}

/// The stack of in-flight runs.
#[derive(Debug, Default)]
pub struct TrackingStack {
    frames: SmallVec<[Frame; 8]>,
}

impl TrackingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Number of frames, sentinels included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The derivation reads are currently attributed to, if any.
    pub fn current(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.derivation)
    }

    /// Whether the top frame is a tracking frame.
    pub fn is_tracking(&self) -> bool {
        self.current().is_some()
    }

    /// Record a read in the top frame. Returns `false` if nothing is tracking.
    pub fn record(&mut self, node_id: NodeId) -> bool {
        match self.frames.last_mut() {
            Some(frame) if frame.derivation.is_some() => {
                frame.observed.insert(node_id);
                true
            }
            _ => false,
        }
    }

    /// Whether `derivation` has a frame anywhere on the stack.
    pub fn contains(&self, derivation: NodeId) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.derivation == Some(derivation))
    }

    /// Derivations on the stack that have read `node_id` during their
    /// current run, outermost first.
    pub fn readers_of(&self, node_id: NodeId) -> SmallVec<[NodeId; 4]> {
        self.frames
            .iter()
            .filter(|frame| frame.observed.contains(&node_id))
            .filter_map(|frame| frame.derivation)
            .collect()
    }

    /// Flag every frame from `derivation`'s innermost frame to the top as
    /// part of a cycle.
    pub fn mark_cycle(&mut self, derivation: NodeId) {
        let Some(start) = self
            .frames
            .iter()
            .rposition(|frame| frame.derivation == Some(derivation))
        else {
            return;
        };
        for frame in &mut self.frames[start..] {
            if frame.derivation.is_some() {
                frame.cyclic = true;
            }
        }
    }
}
