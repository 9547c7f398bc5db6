//! Bookkeeping for the controller's frame-driven loops.
//!
//! Nothing here runs on its own: the host calls `RenderController::tick` once
//! per display refresh and each loop advances only while its handle is live.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    PreviewBatch,
    Crossfade,
    Energy,
}

impl LoopKind {
    pub const ALL: [LoopKind; 3] = [Self::PreviewBatch, Self::Crossfade, Self::Energy];

    pub fn name(self) -> &'static str {
        match self {
            Self::PreviewBatch => "preview",
            Self::Crossfade => "crossfade",
            Self::Energy => "energy",
        }
    }

    /// Loops that may not keep running once this one starts.
    fn supersedes(self) -> &'static [LoopKind] {
        match self {
            Self::PreviewBatch => &[],
            Self::Crossfade => &[Self::PreviewBatch],
            Self::Energy => &[Self::PreviewBatch, Self::Crossfade],
        }
    }
}

/// Shared cancellation flag; a clone held by the host cancels the loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug)]
struct ActiveLoop {
    kind: LoopKind,
    token: CancelToken,
    started_ms: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    active: Vec<ActiveLoop>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `kind`, replacing any running loop of that kind and cancelling
    /// the loops it supersedes.
    pub fn start(&mut self, kind: LoopKind, now_ms: u64) -> CancelToken {
        self.cancel(kind);
        for superseded in kind.supersedes() {
            self.cancel(*superseded);
        }
        let token = CancelToken::new();
        debug!("loop {} started at {now_ms}ms", kind.name());
        self.active.push(ActiveLoop {
            kind,
            token: token.clone(),
            started_ms: now_ms,
        });
        token
    }

    pub fn cancel(&mut self, kind: LoopKind) {
        self.active.retain(|active| {
            if active.kind == kind {
                active.token.cancel();
                debug!("loop {} cancelled", kind.name());
                false
            } else {
                true
            }
        });
    }

    pub fn cancel_all(&mut self) {
        for kind in LoopKind::ALL {
            self.cancel(kind);
        }
    }

    /// Ends `kind` normally.
    pub fn finish(&mut self, kind: LoopKind) {
        self.active.retain(|active| active.kind != kind);
    }

    /// Running and not cancelled through an outstanding token.
    pub fn is_active(&self, kind: LoopKind) -> bool {
        self.active
            .iter()
            .any(|active| active.kind == kind && !active.token.is_cancelled())
    }

    /// Drop loops cancelled from outside and report which kinds they were.
    pub fn reap(&mut self) -> Vec<LoopKind> {
        let mut reaped = Vec::new();
        self.active.retain(|active| {
            if active.token.is_cancelled() {
                debug!("loop {} cancelled externally", active.kind.name());
                reaped.push(active.kind);
                false
            } else {
                true
            }
        });
        reaped
    }

    pub fn started_ms(&self, kind: LoopKind) -> Option<u64> {
        self.active
            .iter()
            .find(|active| active.kind == kind && !active.token.is_cancelled())
            .map(|active| active.started_ms)
    }

    pub fn token(&self, kind: LoopKind) -> Option<CancelToken> {
        self.active
            .iter()
            .find(|active| active.kind == kind)
            .map(|active| active.token.clone())
    }
}
