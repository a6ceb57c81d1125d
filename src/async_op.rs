//! Async-op registry (C7): a hand-rolled `{Idle, Started, Busy, Done}`
//! state machine for long-running commands, driven from the scheduler
//! instead of a preemptive task (see spec.md §9, "'Async' without tasks").

/// Lifecycle state of one async operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OpState {
    Idle,
    Started,
    Busy,
    Done,
}

/// What the caller (protocol engine) asked the worker to do on the next
/// `update()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OpCommand {
    None,
    Start,
    Cancel,
}

/// A single worker step's outcome, reported by the component driving the
/// operation (e.g. a port's `SetPortType` state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult<T> {
    Pending,
    Ok(T),
    Err,
}

/// One async-op slot. `Args`/`Result` are the types a specific command's
/// `Start`/`GetResult` exchange; e.g. `SetPortType` uses `(u8, u8)` args
/// (port, driver id) and `()` result.
pub struct AsyncOp<Args, Result> {
    state: OpState,
    command: OpCommand,
    args: Option<Args>,
    result: Option<Result>,
    failed: bool,
}

impl<Args: Copy, Result: Copy> Default for AsyncOp<Args, Result> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Copy, Result: Copy> AsyncOp<Args, Result> {
    pub const fn new() -> Self {
        Self {
            state: OpState::Idle,
            command: OpCommand::None,
            args: None,
            result: None,
            failed: false,
        }
    }

    pub fn state(&self) -> OpState {
        self.state
    }

    /// Called by the protocol engine's `Start` handler. Only legal from
    /// `Idle` or `Done`; per spec.md §3 this atomically moves to `Started`.
    /// Returns `false` (and does nothing) if called while `Started`/`Busy`.
    pub fn request_start(&mut self, args: Args) -> bool {
        match self.state {
            OpState::Idle | OpState::Done => {
                self.args = Some(args);
                self.result = None;
                self.failed = false;
                self.command = OpCommand::Start;
                self.state = OpState::Started;
                true
            }
            OpState::Started | OpState::Busy => false,
        }
    }

    /// Called by the protocol engine (or a cancel command) to unwind a
    /// running operation. Always eventually resets to `Idle`, per spec.
    pub fn request_cancel(&mut self) {
        if matches!(self.state, OpState::Started | OpState::Busy) {
            self.command = OpCommand::Cancel;
        }
    }

    /// Periodic driver, called once per scheduler tick from the owning
    /// component's update function. `step` is given the pending args (on
    /// the tick transitioning `Started -> Busy`) or `None` on subsequent
    /// ticks, and returns the worker's progress.
    pub fn update<F>(&mut self, mut step: F)
    where
        F: FnMut(OpCommand, Option<Args>) -> StepResult<Result>,
    {
        match self.state {
            OpState::Idle | OpState::Done => {}
            OpState::Started => {
                let cmd = self.command;
                self.command = OpCommand::None;
                let args = self.args;
                match step(cmd, args) {
                    StepResult::Pending => self.state = OpState::Busy,
                    StepResult::Ok(r) => {
                        self.result = Some(r);
                        self.state = OpState::Done;
                    }
                    StepResult::Err => {
                        self.failed = true;
                        self.state = OpState::Idle;
                    }
                }
            }
            OpState::Busy => {
                let cmd = self.command;
                self.command = OpCommand::None;
                if cmd == OpCommand::Cancel {
                    self.state = OpState::Idle;
                    return;
                }
                match step(OpCommand::None, None) {
                    StepResult::Pending => {}
                    StepResult::Ok(r) => {
                        self.result = Some(r);
                        self.state = OpState::Done;
                    }
                    StepResult::Err => {
                        self.failed = true;
                        self.state = OpState::Idle;
                    }
                }
            }
        }
    }

    /// Consulted by the command's `GetResult`. `Done` returns the result
    /// and resets to `Idle`; anything else reports still-pending.
    pub fn poll_result(&mut self) -> StepResult<Result> {
        match self.state {
            OpState::Done => {
                self.state = OpState::Idle;
                match self.result.take() {
                    Some(r) => StepResult::Ok(r),
                    None => StepResult::Err,
                }
            }
            OpState::Idle if self.failed => {
                self.failed = false;
                StepResult::Err
            }
            _ => StepResult::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_start_to_done() {
        let mut op: AsyncOp<u8, u16> = AsyncOp::new();
        assert_eq!(op.state(), OpState::Idle);

        assert!(op.request_start(5));
        assert_eq!(op.state(), OpState::Started);

        // First update: Started -> Busy (worker says Pending).
        op.update(|_, args| {
            assert_eq!(args, Some(5));
            StepResult::Pending
        });
        assert_eq!(op.state(), OpState::Busy);
        assert_eq!(op.poll_result(), StepResult::Pending);

        // Second update: Busy -> Done.
        op.update(|_, _| StepResult::Ok(42u16));
        assert_eq!(op.state(), OpState::Done);

        match op.poll_result() {
            StepResult::Ok(v) => assert_eq!(v, 42),
            other => panic!("expected Ok, got {other:?}"),
        }
        assert_eq!(op.state(), OpState::Idle);
    }

    #[test]
    fn start_rejected_while_in_progress() {
        let mut op: AsyncOp<u8, u8> = AsyncOp::new();
        assert!(op.request_start(1));
        assert!(!op.request_start(2));
    }

    #[test]
    fn cancel_from_busy_resets_to_idle() {
        let mut op: AsyncOp<u8, u8> = AsyncOp::new();
        op.request_start(1);
        op.update(|_, _| StepResult::Pending); // -> Busy
        op.request_cancel();
        op.update(|cmd, _| {
            assert_eq!(cmd, OpCommand::Cancel);
            StepResult::Pending
        });
        assert_eq!(op.state(), OpState::Idle);
    }

    #[test]
    fn get_result_pending_unless_done() {
        let mut op: AsyncOp<u8, u8> = AsyncOp::new();
        assert_eq!(op.poll_result(), StepResult::Pending);
        op.request_start(1);
        assert_eq!(op.poll_result(), StepResult::Pending);
    }
}
