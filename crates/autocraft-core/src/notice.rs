//! Buffered notices: the engine's observability surface.
//!
//! The engine never logs; it records typed [`Notice`]s into a bounded ring
//! buffer that the host drains and renders however it likes (chat line, GUI
//! toast, log sink). Only commit shortfalls in strict mode are meant for
//! players; everything else is diagnostic.

use crate::stack::StackId;

// ---------------------------------------------------------------------------
// Notice types
// ---------------------------------------------------------------------------

/// Something the host may want to surface. All variants carry the solver
/// step at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A resolver raised an error while producing candidates. The request
    /// continued with the remaining resolvers.
    ResolverFailed {
        resolver: String,
        detail: String,
        step: u64,
    },
    /// A strict-mode commit found less in storage than the plan reserved.
    /// Chat-visible when the action source is a player.
    CommitShortfall {
        id: StackId,
        requested: u64,
        got: u64,
        step: u64,
    },
    /// The context's step limit forced the remainder of the plan into
    /// simulation/ignore-missing termination.
    StepLimitReached { limit: u64, step: u64 },
    /// The context's tree-size limit forced early termination.
    SizeLimitReached { limit: usize, step: u64 },
    /// The job was cancelled between steps.
    JobCancelled { step: u64 },
}

/// Discriminant tag for notices, used for counting and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    ResolverFailed,
    CommitShortfall,
    StepLimitReached,
    SizeLimitReached,
    JobCancelled,
}

impl Notice {
    /// Get the discriminant kind for this notice.
    pub fn kind(&self) -> NoticeKind {
        match self {
            Notice::ResolverFailed { .. } => NoticeKind::ResolverFailed,
            Notice::CommitShortfall { .. } => NoticeKind::CommitShortfall,
            Notice::StepLimitReached { .. } => NoticeKind::StepLimitReached,
            Notice::SizeLimitReached { .. } => NoticeKind::SizeLimitReached,
            Notice::JobCancelled { .. } => NoticeKind::JobCancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// NoticeBuffer
// ---------------------------------------------------------------------------

/// A bounded FIFO of notices. When full, the oldest notice is dropped and
/// the drop is counted, so a flood of resolver failures cannot grow without
/// bound while the job is parked between `simulate_for` calls.
#[derive(Debug)]
pub struct NoticeBuffer {
    entries: std::collections::VecDeque<Notice>,
    capacity: usize,
    total_pushed: u64,
    dropped: u64,
}

impl NoticeBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: std::collections::VecDeque::new(),
            capacity: capacity.max(1),
            total_pushed: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, notice: Notice) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(notice);
        self.total_pushed += 1;
    }

    /// Remove and return all buffered notices, oldest first.
    pub fn drain(&mut self) -> Vec<Notice> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Notices pushed over the buffer's lifetime, including dropped ones.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Notices lost to capacity evictions.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for NoticeBuffer {
    fn default() -> Self {
        Self::new(64)
    }
}
