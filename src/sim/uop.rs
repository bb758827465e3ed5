//! Micro-ops: the primitive state mutations instructions are made of.
//!
//! A [`MicroOp`] is the smallest indivisible step the simulator takes.
//! One LC-3 instruction materializes into an owned chain (`Vec<MicroOp>`)
//! which is executed in order and atomically with respect to every other
//! event. Memory-mapped devices may hand back follow-up micro-ops from a
//! read or write; those are appended to the currently running chain.
//!
//! A memory fault does not abort the chain loop. Instead, the remaining
//! micro-ops are replaced with the exception-entry chain and execution
//! carries on into the handler setup.

use crate::isa::reg_consts::R6;
use crate::isa::Reg;
use crate::log::{Logger, PrintType};
use crate::sim::frame::{CallbackType, FuncType};
use crate::sim::state::{Exception, InterruptKind, MachineState};

/// Where a memory micro-op finds its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAddr {
    /// An address resolved when the chain was materialized.
    Imm(u16),
    /// The current value of a register.
    Reg(Reg),
    /// A register plus a signed offset.
    RegOff(Reg, i16),
    /// The current value of the MDR scratch register.
    Mdr,
}

impl MemAddr {
    fn resolve(self, state: &MachineState) -> u16 {
        match self {
            MemAddr::Imm(addr) => addr,
            MemAddr::Reg(r) => state.reg_file[r],
            MemAddr::RegOff(r, off) => state.reg_file[r].wrapping_add_signed(off),
            MemAddr::Mdr => state.mdr,
        }
    }
}

impl std::fmt::Display for MemAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemAddr::Imm(addr) => write!(f, "x{addr:04X}"),
            MemAddr::Reg(r) => write!(f, "{r}"),
            MemAddr::RegOff(r, off) => write!(f, "{r}+#{off}"),
            MemAddr::Mdr => f.write_str("MDR"),
        }
    }
}

/// One primitive state mutation.
///
/// All register arithmetic wraps. The MDR is a scratch register private to
/// the chain being executed; no two chains ever interleave, so it needs no
/// further protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicroOp {
    /// `R[dst] <- R[src] + imm`
    RegAddImm { dst: Reg, src: Reg, imm: i16 },
    /// `R[dst] <- R[src1] + R[src2]`
    RegAddReg { dst: Reg, src1: Reg, src2: Reg },
    /// `R[dst] <- R[src] & imm`
    RegAndImm { dst: Reg, src: Reg, imm: i16 },
    /// `R[dst] <- R[src1] & R[src2]`
    RegAndReg { dst: Reg, src1: Reg, src2: Reg },
    /// `R[dst] <- ~R[src]`
    RegNot { dst: Reg, src: Reg },
    /// `R[dst] <- value`
    RegWriteImm { dst: Reg, value: u16 },
    /// `R[dst] <- MDR`
    RegWriteMdr { dst: Reg },
    /// `MDR <- R[src]`
    MdrWriteReg { src: Reg },
    /// `MDR <- PC`
    MdrWritePc,
    /// `MDR <- PSR`
    MdrWritePsr,
    /// `MDR <- M[addr]`, through the checked memory path.
    MdrWriteMem { addr: MemAddr },
    /// `M[addr] <- R[src]`, through the checked memory path.
    MemWriteFromReg { addr: MemAddr, src: Reg },
    /// `M[addr] <- MDR`, through the checked memory path.
    MemWriteFromMdr { addr: MemAddr },
    /// `PC <- value`
    PcWriteImm { value: u16 },
    /// `PC <- R[src]`
    PcWriteReg { src: Reg },
    /// `PC <- MDR`
    PcWriteMdr,
    /// `PC <- PC + imm`
    PcAddImm { imm: i16 },
    /// `PSR <- MDR`
    PsrWriteMdr,
    /// Sets the PSR privilege bit.
    PsrSetPrivileged { privileged: bool },
    /// Sets the PSR priority bits.
    PsrSetPriority { priority: u8 },
    /// `PSR[nzp] <- cc(R[src])`
    SetCc { src: Reg },
    /// Swaps R6 with the saved stack pointer.
    SwapSavedSp,
    /// Swaps R6 with the saved stack pointer if the PSR says user mode.
    SwapSavedSpIfUser,
    /// Pushes an interrupt onto the machine's pending-interrupt queue.
    EnqueueInterrupt { kind: InterruptKind },
    /// Stages a callback to fire after the current instruction.
    PendCallback { which: CallbackType },
    /// Pushes a tag onto the function trace.
    PushFuncType { func: FuncType },
    /// Pops the top tag off the function trace.
    PopFuncType,
}

impl std::fmt::Display for MicroOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MicroOp::RegAddImm { dst, src, imm } => write!(f, "{dst} <- {src} + #{imm}"),
            MicroOp::RegAddReg { dst, src1, src2 } => write!(f, "{dst} <- {src1} + {src2}"),
            MicroOp::RegAndImm { dst, src, imm } => write!(f, "{dst} <- {src} & #{imm}"),
            MicroOp::RegAndReg { dst, src1, src2 } => write!(f, "{dst} <- {src1} & {src2}"),
            MicroOp::RegNot { dst, src } => write!(f, "{dst} <- ~{src}"),
            MicroOp::RegWriteImm { dst, value } => write!(f, "{dst} <- x{value:04X}"),
            MicroOp::RegWriteMdr { dst } => write!(f, "{dst} <- MDR"),
            MicroOp::MdrWriteReg { src } => write!(f, "MDR <- {src}"),
            MicroOp::MdrWritePc => f.write_str("MDR <- PC"),
            MicroOp::MdrWritePsr => f.write_str("MDR <- PSR"),
            MicroOp::MdrWriteMem { addr } => write!(f, "MDR <- M[{addr}]"),
            MicroOp::MemWriteFromReg { addr, src } => write!(f, "M[{addr}] <- {src}"),
            MicroOp::MemWriteFromMdr { addr } => write!(f, "M[{addr}] <- MDR"),
            MicroOp::PcWriteImm { value } => write!(f, "PC <- x{value:04X}"),
            MicroOp::PcWriteReg { src } => write!(f, "PC <- {src}"),
            MicroOp::PcWriteMdr => f.write_str("PC <- MDR"),
            MicroOp::PcAddImm { imm } => write!(f, "PC <- PC + #{imm}"),
            MicroOp::PsrWriteMdr => f.write_str("PSR <- MDR"),
            MicroOp::PsrSetPrivileged { privileged } => write!(f, "PSR[priv] <- {}", !privileged as u8),
            MicroOp::PsrSetPriority { priority } => write!(f, "PSR[priority] <- {priority}"),
            MicroOp::SetCc { src } => write!(f, "PSR[nzp] <- cc({src})"),
            MicroOp::SwapSavedSp => f.write_str("R6 <-> saved SP"),
            MicroOp::SwapSavedSpIfUser => f.write_str("R6 <-> saved SP (if user)"),
            MicroOp::EnqueueInterrupt { kind } => write!(f, "pending interrupt <- {kind}"),
            MicroOp::PendCallback { which } => write!(f, "pending callback <- {which}"),
            MicroOp::PushFuncType { func } => write!(f, "function trace push {func:?}"),
            MicroOp::PopFuncType => f.write_str("function trace pop"),
        }
    }
}

/// Executes a chain against the machine state.
///
/// Device follow-up micro-ops are appended to the running chain; a memory
/// fault swaps the unexecuted tail for the exception-entry chain.
pub(crate) fn run_chain(state: &mut MachineState, logger: &Logger, time: u64, chain: Vec<MicroOp>) {
    let mut chain = chain;
    let mut idx = 0;

    while idx < chain.len() {
        let op = chain[idx].clone();
        if logger.enabled(PrintType::Debug) {
            logger.print_line(PrintType::Debug, &format!("{time}: |- {op}"));
        }

        match exec(state, &op) {
            Ok(followups) => chain.extend(followups),
            Err(exc) => {
                logger.print_line(PrintType::Extra, &format!("{time}: |- raising {exc}"));
                let intro = exception_chain(state, exc);
                chain.truncate(idx + 1);
                chain.extend(intro);
            }
        }

        idx += 1;
    }
}

fn exec(state: &mut MachineState, op: &MicroOp) -> Result<Vec<MicroOp>, Exception> {
    match *op {
        MicroOp::RegAddImm { dst, src, imm } => {
            state.reg_file[dst] = state.reg_file[src].wrapping_add_signed(imm);
        }
        MicroOp::RegAddReg { dst, src1, src2 } => {
            state.reg_file[dst] = state.reg_file[src1].wrapping_add(state.reg_file[src2]);
        }
        MicroOp::RegAndImm { dst, src, imm } => {
            state.reg_file[dst] = state.reg_file[src] & imm as u16;
        }
        MicroOp::RegAndReg { dst, src1, src2 } => {
            state.reg_file[dst] = state.reg_file[src1] & state.reg_file[src2];
        }
        MicroOp::RegNot { dst, src } => {
            state.reg_file[dst] = !state.reg_file[src];
        }
        MicroOp::RegWriteImm { dst, value } => state.reg_file[dst] = value,
        MicroOp::RegWriteMdr { dst } => state.reg_file[dst] = state.mdr,
        MicroOp::MdrWriteReg { src } => state.mdr = state.reg_file[src],
        MicroOp::MdrWritePc => state.mdr = state.pc,
        MicroOp::MdrWritePsr => state.mdr = state.psr().0,
        MicroOp::MdrWriteMem { addr } => {
            let addr = addr.resolve(state);
            let (value, followups) = state.read_mem(addr)?;
            state.mdr = value;
            return Ok(followups);
        }
        MicroOp::MemWriteFromReg { addr, src } => {
            let addr = addr.resolve(state);
            let value = state.reg_file[src];
            return state.write_mem(addr, value);
        }
        MicroOp::MemWriteFromMdr { addr } => {
            let addr = addr.resolve(state);
            let value = state.mdr;
            return state.write_mem(addr, value);
        }
        MicroOp::PcWriteImm { value } => state.pc = value,
        MicroOp::PcWriteReg { src } => state.pc = state.reg_file[src],
        MicroOp::PcWriteMdr => state.pc = state.mdr,
        MicroOp::PcAddImm { imm } => state.pc = state.pc.wrapping_add_signed(imm),
        MicroOp::PsrWriteMdr => {
            let mdr = state.mdr;
            state.psr_mut().0 = mdr;
        }
        MicroOp::PsrSetPrivileged { privileged } => state.psr_mut().set_privileged(privileged),
        MicroOp::PsrSetPriority { priority } => state.psr_mut().set_priority(priority),
        MicroOp::SetCc { src } => {
            let value = state.reg_file[src];
            let cc = match (value as i16).cmp(&0) {
                std::cmp::Ordering::Less => 0b100,
                std::cmp::Ordering::Equal => 0b010,
                std::cmp::Ordering::Greater => 0b001,
            };
            state.psr_mut().set_cc(cc);
        }
        MicroOp::SwapSavedSp => state.swap_saved_sp(),
        MicroOp::SwapSavedSpIfUser => {
            if !state.psr().privileged() {
                state.swap_saved_sp();
            }
        }
        MicroOp::EnqueueInterrupt { kind } => state.enqueue_interrupt(kind),
        MicroOp::PendCallback { which } => state.pend_callback(which),
        MicroOp::PushFuncType { func } => state.push_func_type(func),
        MicroOp::PopFuncType => {
            state.pop_func_type();
        }
    }

    Ok(Vec::new())
}

/// Builds the chain that enters a trap, exception, or interrupt handler.
///
/// Pushes the old PSR and PC onto the supervisor stack (swapping in the saved
/// stack pointer when coming from user mode), raises privilege, optionally
/// sets the interrupt priority, and jumps through the vector table entry at
/// `vector_addr`.
pub(crate) fn system_enter_chain(
    state: &MachineState,
    vector_addr: u16,
    priority: Option<u8>,
    func: FuncType,
    cb: CallbackType,
) -> Vec<MicroOp> {
    let mut chain = vec![MicroOp::MdrWritePsr];

    if !state.psr().privileged() {
        chain.push(MicroOp::SwapSavedSp);
    }
    chain.push(MicroOp::PsrSetPrivileged { privileged: true });
    if let Some(priority) = priority {
        chain.push(MicroOp::PsrSetPriority { priority });
    }

    chain.extend([
        MicroOp::MemWriteFromMdr { addr: MemAddr::RegOff(R6, -1) },
        MicroOp::MdrWritePc,
        MicroOp::MemWriteFromMdr { addr: MemAddr::RegOff(R6, -2) },
        MicroOp::RegAddImm { dst: R6, src: R6, imm: -2 },
        MicroOp::MdrWriteMem { addr: MemAddr::Imm(vector_addr) },
        MicroOp::PcWriteMdr,
        MicroOp::PushFuncType { func },
        MicroOp::PendCallback { which: cb },
    ]);

    chain
}

/// Builds the entry chain for a machine exception.
pub(crate) fn exception_chain(state: &MachineState, exc: Exception) -> Vec<MicroOp> {
    system_enter_chain(
        state,
        0x0100 + exc.vector(),
        None,
        FuncType::Exception,
        CallbackType::ExEnter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::reg_consts::{R0, R1};
    use crate::log::{Logger, NullPrinter};

    fn quiet_logger() -> Logger {
        Logger::new(NullPrinter, 0)
    }

    #[test]
    fn test_alu_ops_wrap() {
        let mut state = MachineState::new();
        state.reg_file[R1] = 0xFFFF;

        run_chain(
            &mut state,
            &quiet_logger(),
            0,
            vec![
                MicroOp::RegAddImm { dst: R0, src: R1, imm: 1 },
                MicroOp::SetCc { src: R0 },
            ],
        );

        assert_eq!(state.reg_file[R0], 0);
        assert_eq!(state.psr().cc(), 0b010);
    }

    #[test]
    fn test_mdr_roundtrip_through_memory() {
        let mut state = MachineState::new();
        state.set_ignore_privilege(true);

        run_chain(
            &mut state,
            &quiet_logger(),
            0,
            vec![
                MicroOp::RegWriteImm { dst: R0, value: 0xBEEF },
                MicroOp::MemWriteFromReg { addr: MemAddr::Imm(0x4000), src: R0 },
                MicroOp::MdrWriteMem { addr: MemAddr::Imm(0x4000) },
                MicroOp::RegWriteMdr { dst: R1 },
            ],
        );

        assert_eq!(state.reg_file[R1], 0xBEEF);
    }

    #[test]
    fn test_fault_swaps_in_exception_chain() {
        let mut state = MachineState::new();
        // Point the access-violation vector somewhere recognizable.
        state.mem_loc_mut(0x0102).value = 0x1234;
        state.reg_file[R6] = 0x3000;
        state.psr_mut().set_privileged(false);

        // User-mode read of system memory faults and vectors.
        run_chain(
            &mut state,
            &quiet_logger(),
            0,
            vec![
                MicroOp::MdrWriteMem { addr: MemAddr::Imm(0x0200) },
                // Never reached; replaced by the exception chain.
                MicroOp::RegWriteImm { dst: R0, value: 0xAAAA },
            ],
        );

        assert_ne!(state.reg_file[R0], 0xAAAA);
        assert_eq!(state.pc, 0x1234);
        assert!(state.psr().privileged());
        assert_eq!(state.peek_func_type(), Some(FuncType::Exception));
    }
}
