//! Callback types and the call trace.
//!
//! This module exposes:
//! - [`CallbackType`]: Every hook point the simulator can fire, in a fixed
//!   order. The declaration order matters: each variant's ordinal is added to
//!   a callback event's timestamp, so enter/exit/pre/post callbacks sharing a
//!   logical time fire in this order.
//! - [`FuncType`]: The tag recorded on the function trace when control enters
//!   a subroutine, trap, interrupt, or exception handler.
//! - [`CallTrace`]: The stack of caller PCs maintained by the callback
//!   dispatcher.

use crate::sim::state::MachineState;

/// A hook point in the simulator's execution.
///
/// The discriminant doubles as a timestamp tie-break offset, so the variant
/// order here is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallbackType {
    /// Before each instruction.
    PreInst = 0,
    /// After each instruction.
    PostInst = 1,
    /// On entry to a subroutine or trap.
    SubEnter = 2,
    /// On return from a subroutine or trap.
    SubExit = 3,
    /// On entry to an exception handler.
    ExEnter = 4,
    /// On return from an exception handler.
    ExExit = 5,
    /// On entry to an interrupt handler.
    IntEnter = 6,
    /// On return from an interrupt handler.
    IntExit = 7,
    /// When a breakpoint suspends execution.
    Breakpoint = 8,
    /// When a device requests input.
    InputRequest = 9,
    /// When a device polls for input.
    InputPoll = 10,
}

impl CallbackType {
    /// The tie-break offset added to this callback's timestamp.
    pub fn ordinal(self) -> u64 {
        self as u64
    }
}

impl std::fmt::Display for CallbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallbackType::PreInst => "pre-instruction",
            CallbackType::PostInst => "post-instruction",
            CallbackType::SubEnter => "subroutine-enter",
            CallbackType::SubExit => "subroutine-exit",
            CallbackType::ExEnter => "exception-enter",
            CallbackType::ExExit => "exception-exit",
            CallbackType::IntEnter => "interrupt-enter",
            CallbackType::IntExit => "interrupt-exit",
            CallbackType::Breakpoint => "breakpoint",
            CallbackType::InputRequest => "input-request",
            CallbackType::InputPoll => "input-poll",
        };
        f.write_str(name)
    }
}

/// A user-installable callback.
pub type Callback = Box<dyn FnMut(CallbackType, &mut MachineState) + Send>;

/// What kind of control transfer pushed an entry onto the function trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncType {
    /// A JSR/JSRR call.
    Subroutine,
    /// A TRAP call.
    Trap,
    /// An accepted device interrupt.
    Interrupt,
    /// A machine exception.
    Exception,
}

/// The stack of caller PCs, one per active frame.
///
/// `*Enter` callbacks push the pre-instruction PC; `*Exit` callbacks pop.
/// The depth therefore always equals the number of enters minus the number
/// of exits.
#[derive(Debug, Default, Clone)]
pub struct CallTrace {
    frames: Vec<u16>,
}

impl CallTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// The caller PCs, outermost first.
    pub fn frames(&self) -> &[u16] {
        &self.frames
    }

    /// The current nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The most recent caller PC.
    pub fn top(&self) -> Option<u16> {
        self.frames.last().copied()
    }

    pub(crate) fn push(&mut self, pc: u16) {
        self.frames.push(pc);
    }

    pub(crate) fn pop(&mut self) -> Option<u16> {
        self.frames.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_follow_declaration_order() {
        let order = [
            CallbackType::PreInst,
            CallbackType::PostInst,
            CallbackType::SubEnter,
            CallbackType::SubExit,
            CallbackType::ExEnter,
            CallbackType::ExExit,
            CallbackType::IntEnter,
            CallbackType::IntExit,
            CallbackType::Breakpoint,
            CallbackType::InputRequest,
            CallbackType::InputPoll,
        ];
        for (i, cb) in order.into_iter().enumerate() {
            assert_eq!(cb.ordinal(), i as u64);
        }
    }

    #[test]
    fn test_trace_push_pop() {
        let mut trace = CallTrace::new();
        trace.push(0x3000);
        trace.push(0x3005);
        assert_eq!(trace.depth(), 2);
        assert_eq!(trace.top(), Some(0x3005));
        assert_eq!(trace.pop(), Some(0x3005));
        assert_eq!(trace.frames(), [0x3000]);
    }
}
