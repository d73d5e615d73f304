/// Lifecycle of one capture run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Capturing,
    Draining,
    Done,
    Failed,
}

/// Exact-once transition from capturing to draining. Owned by the pacing
/// loop.
///
/// `Capturing → Draining → Done`, with `Failed` reachable from any
/// non-terminal state.
#[derive(Debug)]
pub struct CompletionGate {
    state: CaptureState,
    target: usize,
}

impl CompletionGate {
    pub fn new(target: usize) -> Self {
        Self {
            state: CaptureState::Capturing,
            target,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Reports the stored count after a frame was accepted. Returns `true`
    /// exactly once: on the call that moves the gate into `Draining`.
    pub fn observe(&mut self, frames_kept: usize) -> bool {
        if self.state == CaptureState::Capturing && frames_kept >= self.target {
            self.state = CaptureState::Draining;
            return true;
        }
        false
    }

    /// `Draining → Done`. Returns whether the transition happened.
    pub fn finish(&mut self) -> bool {
        if self.state == CaptureState::Draining {
            self.state = CaptureState::Done;
            return true;
        }
        false
    }

    /// Moves any non-terminal state to `Failed`. Returns whether the
    /// transition happened.
    pub fn fail(&mut self) -> bool {
        match self.state {
            CaptureState::Capturing | CaptureState::Draining => {
                self.state = CaptureState::Failed;
                true
            }
            CaptureState::Done | CaptureState::Failed => false,
        }
    }
}
