//! Simulating and execution for LC-3 object images.
//!
//! The [`Simulator`] is a discrete-event engine: everything that happens —
//! device polling, interrupt checks, instruction processing, callbacks — is
//! an [`event::Event`] on a priority queue keyed by logical time. Time only
//! advances when an event fires, and one instruction's micro-ops always run
//! to completion before anything else gets a turn.
//!
//! Each step of a run:
//! 1. schedules one device update per device and one interrupt check, just
//!    before the next fetch slot,
//! 2. drains the queue,
//! 3. either fires the breakpoint machinery (when the state matches a
//!    breakpoint and at least one instruction has run this session), or
//!    schedules the pre-instruction callback and the fetch,
//! 4. drains again, fires the post-instruction callback and anything the
//!    instruction staged.
//!
//! This module consists of:
//! - [`state`]: The machine state (registers, memory, devices, interrupts).
//! - [`uop`]: The micro-op primitives instructions are made of.
//! - [`event`]: Events and the stable priority queue.
//! - [`decode`]: The word decoder built from the ISA table.
//! - [`device`]: The keyboard and display devices.
//! - [`io`]: Input sources for the keyboard.
//! - [`debug`]: Breakpoints.
//! - [`frame`]: Callback types and the call trace.

pub mod debug;
pub mod decode;
pub mod device;
pub mod event;
pub mod frame;
pub mod io;
pub mod state;
pub mod uop;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::asm::obj::ObjectFile;
use crate::asm::Assembler;
use crate::log::{Logger, NullPrinter, PrintType, Printer, DEFAULT_PRINT_LEVEL};
use crate::sim::debug::BreakpointList;
use crate::sim::decode::Decoder;
use crate::sim::device::{Device, Display, Keyboard};
use crate::sim::event::{Event, EventKind, EventQueue};
use crate::sim::frame::{Callback, CallTrace, CallbackType, FuncType};
use crate::sim::io::Inputter;
use crate::sim::state::{
    Exception, MachineState, MemFillStrategy, INT_TABLE_START,
};
use crate::sim::uop::MicroOp;

/// Logical time units per instruction slot.
const INST_TIMESTEP: u64 = 20;

/// Configuration for [`Simulator::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimFlags {
    /// Verbosity of the diagnostic output.
    pub print_level: u32,
    /// Suppress privilege exceptions (for debugging).
    pub ignore_privilege: bool,
    /// How memory and registers are filled at power-on.
    pub mem_fill: MemFillStrategy,
}

impl Default for SimFlags {
    fn default() -> Self {
        SimFlags {
            print_level: DEFAULT_PRINT_LEVEL,
            ignore_privilege: false,
            mem_fill: MemFillStrategy::default(),
        }
    }
}

/// Executes object images against a machine model.
pub struct Simulator {
    /// The machine being simulated.
    pub state: MachineState,
    /// Breakpoints checked before each fetch.
    pub breakpoints: BreakpointList,

    flags: SimFlags,
    decoder: Decoder,
    events: EventQueue,
    time: u64,
    logger: Logger,

    callbacks: HashMap<CallbackType, Callback>,
    call_trace: CallTrace,
    pre_inst_pc: u16,
    inst_count_this_run: u64,

    /// Cooperative cancellation request; single writer (the host), single
    /// reader (the run loop).
    async_interrupt: Arc<AtomicBool>,
    os_loaded: bool,
}

impl Simulator {
    /// Creates a simulator wired to the given printer and inputter.
    ///
    /// The keyboard reads from the inputter; the display and all diagnostics
    /// share the printer. The operating system is loaded before this
    /// returns.
    pub fn new(
        flags: SimFlags,
        printer: impl Printer + Send + 'static,
        inputter: impl Inputter + 'static,
    ) -> Self {
        let logger = Logger::new(printer, flags.print_level);

        let mut state = MachineState::with_fill(flags.mem_fill);
        state.set_ignore_privilege(flags.ignore_privilege);
        state.add_device(Device::Keyboard(Keyboard::new(inputter)));
        state.add_device(Device::Display(Display::new(logger.shared_printer())));

        let mut sim = Simulator {
            state,
            breakpoints: BreakpointList::new(),
            flags,
            decoder: Decoder::new(),
            events: EventQueue::new(),
            time: 0,
            logger,
            callbacks: HashMap::new(),
            call_trace: CallTrace::new(),
            pre_inst_pc: 0,
            inst_count_this_run: 0,
            async_interrupt: Arc::new(AtomicBool::new(false)),
            os_loaded: false,
        };

        sim.setup(0);
        sim
    }

    /// Loads an object image into the machine.
    pub fn load_obj_file(&mut self, obj: &ObjectFile) {
        self.events
            .push(Event::new(self.time + 1, EventKind::LoadObjFile(obj.clone())));
        self.events.push(Event::new(self.time + 2, EventKind::Setup));
        self.execute_events();
    }

    /// Runs until the machine halts, a breakpoint fires, or the host
    /// requests an interrupt.
    pub fn run(&mut self) {
        self.run_inner(None);
    }

    /// Runs, additionally stopping once `max_insts` instructions have
    /// executed.
    pub fn run_with_limit(&mut self, max_insts: u64) {
        self.run_inner(Some(max_insts));
    }

    fn run_inner(&mut self, limit: Option<u64>) {
        self.power_on(0);
        self.inst_count_this_run = 0;
        self.async_interrupt.store(false, Ordering::Relaxed);

        self.state.startup_devices();

        loop {
            self.handle_devices();
            self.handle_instruction();

            // While this loop runs, the flag has one writer (the host) and
            // one reader (here); relaxed ordering is all the contract needs.
            if !self.state.running() || self.async_interrupt.load(Ordering::Relaxed) {
                break;
            }
            if limit.is_some_and(|max| self.inst_count_this_run >= max) {
                break;
            }
        }

        self.async_interrupt.store(false, Ordering::Relaxed);
        self.state.shutdown_devices();
    }

    /// Cancels everything scheduled and stops the run after the current
    /// event drains.
    pub fn suspend(&mut self) {
        self.events.clear();
        self.events.push(Event::new(self.time, EventKind::Shutdown));
    }

    /// A handle the host may set from another thread to stop the run loop
    /// between events.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.async_interrupt)
    }

    /// Installs `func` as the callback for `which`, replacing any previous
    /// one.
    pub fn register_callback(
        &mut self,
        which: CallbackType,
        func: impl FnMut(CallbackType, &mut MachineState) + Send + 'static,
    ) {
        self.callbacks.insert(which, Box::new(func));
    }

    /// Uninstalls the callback for `which`.
    pub fn remove_callback(&mut self, which: CallbackType) {
        self.callbacks.remove(&which);
    }

    /// The stack of caller PCs maintained across enter/exit callbacks.
    pub fn call_trace(&self) -> &CallTrace {
        &self.call_trace
    }

    /// Instructions executed since the current (or last) run began.
    pub fn inst_count_this_run(&self) -> u64 {
        self.inst_count_this_run
    }

    /// The current logical time.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// The diagnostics logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Changes diagnostic verbosity.
    pub fn set_print_level(&mut self, print_level: u32) {
        self.logger.set_print_level(print_level);
    }

    /// Resets the machine. Configuration, breakpoints, and callbacks are
    /// kept; the OS is reloaded.
    pub fn reinitialize(&mut self) {
        self.state.reinitialize(self.flags.mem_fill);
        self.state.set_ignore_privilege(self.flags.ignore_privilege);
        self.call_trace = CallTrace::new();
        self.os_loaded = false;
        self.setup(0);
    }

    // ------------------------------------------------------------------
    // Scheduling

    fn setup(&mut self, t_delta: u64) {
        self.events.push(Event::new(self.time + t_delta, EventKind::Setup));
        self.execute_events();
    }

    fn power_on(&mut self, t_delta: u64) {
        self.events.push(Event::new(self.time + t_delta, EventKind::PowerOn));
        self.execute_events();
    }

    /// Offset from now to the next instruction fetch slot.
    fn fetch_offset(&self) -> u64 {
        INST_TIMESTEP - (self.time % INST_TIMESTEP)
    }

    /// Schedules one update per device and the interrupt check, then drains.
    fn handle_devices(&mut self) {
        let offset = self.fetch_offset();

        for id in 0..self.state.device_count() {
            self.events
                .push(Event::new(self.time + offset - 10, EventKind::DeviceUpdate(id)));
        }
        self.events
            .push(Event::new(self.time + offset - 9, EventKind::CheckForInterrupt));

        self.execute_events();
    }

    /// Runs one instruction slot: either the breakpoint machinery or
    /// pre-callback / fetch / post-callback.
    fn handle_instruction(&mut self) {
        let offset = self.fetch_offset();

        let at_breakpoint = self.breakpoints.values().any(|bp| bp.check(&self.state));
        if at_breakpoint && self.inst_count_this_run != 0 {
            // Suspend, then let the host observe the break.
            self.suspend();
            self.trigger_callback(offset, CallbackType::Breakpoint);
            self.execute_events();
        } else {
            self.trigger_callback(offset, CallbackType::PreInst);
            self.handle_pending_callbacks(offset);

            self.events
                .push(Event::new(self.time + offset, EventKind::AtomicInstProcess));
            self.execute_events();

            self.trigger_callback(0, CallbackType::PostInst);
            self.handle_pending_callbacks(0);
            self.execute_events();
        }
    }

    /// Schedules a callback, tie-broken past its siblings by its ordinal.
    fn trigger_callback(&mut self, t_delta: u64, which: CallbackType) {
        self.events.push(Event::new(
            self.time + t_delta + which.ordinal(),
            EventKind::Callback(which),
        ));
    }

    /// Schedules every callback staged during execution.
    fn handle_pending_callbacks(&mut self, t_delta: u64) {
        for which in self.state.take_pending_callbacks() {
            self.trigger_callback(t_delta, which);
        }
    }

    // ------------------------------------------------------------------
    // The engine

    fn execute_events(&mut self) {
        while let Some(event) = self.events.pop() {
            // Stale events can only remain after a suspend; they are skipped,
            // never run late, so time stays monotonic.
            if event.time < self.time {
                self.logger.print_line(
                    PrintType::Note,
                    &format!("{}: skipping '{}' scheduled for {}", self.time, event.kind, event.time),
                );
                continue;
            }

            self.time = event.time;
            if self.logger.enabled(PrintType::Extra) {
                self.logger
                    .print_line(PrintType::Extra, &format!("{}: {}", self.time, event.kind));
            }

            let chain = self.handle_event(event.kind);
            uop::run_chain(&mut self.state, &self.logger, self.time, chain);
        }
    }

    fn handle_event(&mut self, kind: EventKind) -> Vec<MicroOp> {
        match kind {
            EventKind::Setup => {
                self.load_os();
                Vec::new()
            }
            EventKind::PowerOn => {
                self.state.power_on();
                Vec::new()
            }
            EventKind::Shutdown => {
                self.state.set_running(false);
                Vec::new()
            }
            EventKind::LoadObjFile(obj) => {
                self.state.load_object(&obj);
                Vec::new()
            }
            EventKind::DeviceUpdate(id) => self.state.tick_device(id),
            EventKind::CheckForInterrupt => {
                let Some(int) = self.state.peek_interrupt() else {
                    return Vec::new();
                };
                if int.priority() <= self.state.psr().priority() {
                    return Vec::new();
                }
                self.state.dequeue_interrupt();

                uop::system_enter_chain(
                    &self.state,
                    INT_TABLE_START + int.vector(),
                    Some(int.priority()),
                    FuncType::Interrupt,
                    CallbackType::IntEnter,
                )
            }
            EventKind::AtomicInstProcess => self.process_instruction(),
            EventKind::Callback(which) => {
                self.dispatch_callback(which);
                Vec::new()
            }
        }
    }

    /// Fetch, decode, and materialize one instruction's chain.
    fn process_instruction(&mut self) -> Vec<MicroOp> {
        let pc = self.state.pc;
        match self.state.read_mem(pc) {
            Ok((word, fetch_uops)) => {
                self.state.ir = word;
                self.state.pc = pc.wrapping_add(1);

                match self.decoder.decode(word) {
                    Some((inst, fields)) => {
                        if self.logger.enabled(PrintType::Debug) {
                            self.logger.print_line(
                                PrintType::Debug,
                                &format!("{}: |- decoded x{word:04X} as {}", self.time, inst.name),
                            );
                        }
                        // Any micro-op paired with the fetch runs before the
                        // instruction's own chain.
                        let mut chain = fetch_uops;
                        chain.extend((inst.build)(inst, &fields, &self.state));
                        chain
                    }
                    None => {
                        self.logger.print_line(
                            PrintType::Extra,
                            &format!("{}: |- x{word:04X} does not decode", self.time),
                        );
                        uop::exception_chain(&self.state, Exception::IllegalOpcode)
                    }
                }
            }
            Err(exc) => {
                self.logger
                    .print_line(PrintType::Extra, &format!("{}: |- fetch raised {exc}", self.time));
                uop::exception_chain(&self.state, exc)
            }
        }
    }

    fn dispatch_callback(&mut self, which: CallbackType) {
        match which {
            CallbackType::PreInst => self.pre_inst_pc = self.state.pc,
            CallbackType::PostInst => self.inst_count_this_run += 1,
            CallbackType::SubEnter | CallbackType::ExEnter | CallbackType::IntEnter => {
                self.call_trace.push(self.pre_inst_pc);
                self.log_call_trace();

                if which == CallbackType::ExEnter {
                    let pc = self.pre_inst_pc;
                    self.logger.print_line(
                        PrintType::Error,
                        &format!("PC before exception: x{pc:04X} ({})", self.state.mem_line(pc)),
                    );
                }
            }
            CallbackType::SubExit | CallbackType::ExExit | CallbackType::IntExit => {
                self.call_trace.pop();
                self.log_call_trace();
            }
            _ => {}
        }

        if let Some(func) = self.callbacks.get_mut(&which) {
            func(which, &mut self.state);
        }
    }

    fn log_call_trace(&self) {
        if !self.logger.enabled(PrintType::Debug) {
            return;
        }

        self.logger.print_line(PrintType::Debug, "call trace");
        for (i, &pc) in self.call_trace.frames().iter().rev().enumerate() {
            self.logger.print_line(
                PrintType::Debug,
                &format!("#{i} x{pc:04X} ({})", self.state.mem_line(pc)),
            );
        }
    }

    /// Assembles the bundled OS once and copies it into memory.
    fn load_os(&mut self) {
        static OS_OBJ: OnceLock<ObjectFile> = OnceLock::new();

        if self.os_loaded {
            return;
        }

        let obj = OS_OBJ.get_or_init(|| {
            let mut asm = Assembler::new(Logger::new(NullPrinter, 0), false);
            asm.assemble(include_str!("os.asm"))
                .expect("bundled OS should assemble")
        });

        self.state.load_object(obj);
        self.os_loaded = true;
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("time", &self.time)
            .field("inst_count_this_run", &self.inst_count_this_run)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::reg_consts::{R0, R1, R2};
    use crate::log::BufferedPrinter;
    use crate::sim::debug::Breakpoint;
    use crate::sim::io::{BufferedInputter, NoInput};

    fn assemble(src: &str) -> ObjectFile {
        Assembler::new(Logger::new(NullPrinter, 0), false)
            .assemble(src)
            .unwrap()
    }

    fn quiet_sim() -> Simulator {
        Simulator::new(SimFlags::default(), NullPrinter, NoInput)
    }

    #[test]
    fn test_add_imm_program() {
        let mut sim = quiet_sim();
        sim.state.reg_file[R2] = 10;
        sim.load_obj_file(&assemble(".orig x3000\nADD R1, R2, #-1\n.end"));

        assert_eq!(sim.state.mem_loc(0x3000).value, 0x12BF);

        sim.run_with_limit(1);
        assert_eq!(sim.inst_count_this_run(), 1);
        assert_eq!(sim.state.reg_file[R1], 9);
        assert_eq!(sim.state.psr().cc(), 0b001);
    }

    #[test]
    fn test_ld_negative_value() {
        let mut sim = quiet_sim();
        sim.load_obj_file(&assemble(".orig x3000\nLD R0, X\nX .fill #-2\n.end"));

        sim.run_with_limit(1);
        assert_eq!(sim.state.reg_file[R0], 0xFFFE);
        assert_eq!(sim.state.psr().cc(), 0b100);
    }

    #[test]
    fn test_halt_clears_run_bit_quietly() {
        let printer = BufferedPrinter::new();
        let mut sim = Simulator::new(
            SimFlags { print_level: 0, ..Default::default() },
            printer.clone(),
            NoInput,
        );
        sim.load_obj_file(&assemble(
            ".orig x3000\nLEA R0, MSG\nHALT\nMSG .stringz \"Hi\"\n.end",
        ));

        assert_eq!(sim.state.mem_loc(0x3002).value, u16::from(b'H'));
        assert_eq!(sim.state.mem_loc(0x3003).value, u16::from(b'i'));
        assert_eq!(sim.state.mem_loc(0x3004).value, 0);

        sim.run();
        assert!(!sim.state.running());
        // Nothing was displayed.
        assert_eq!(printer.contents(), "");
    }

    #[test]
    fn test_puts_writes_to_printer() {
        let printer = BufferedPrinter::new();
        let mut sim = Simulator::new(
            SimFlags { print_level: 0, ..Default::default() },
            printer.clone(),
            NoInput,
        );
        sim.load_obj_file(&assemble(
            ".orig x3000\nLEA R0, MSG\nPUTS\nHALT\nMSG .stringz \"ok\"\n.end",
        ));

        sim.run();
        assert!(!sim.state.running());
        assert_eq!(printer.contents(), "ok");
    }

    #[test]
    fn test_time_is_monotonic() {
        let mut sim = quiet_sim();
        sim.load_obj_file(&assemble(
            ".orig x3000\nADD R0, R0, #1\nADD R0, R0, #1\nADD R0, R0, #1\nHALT\n.end",
        ));

        let mut prev = sim.time();
        sim.run();
        assert!(sim.time() >= prev);

        prev = sim.time();
        sim.run_with_limit(1);
        assert!(sim.time() >= prev);
    }

    #[test]
    fn test_post_inst_matches_inst_count() {
        let mut sim = quiet_sim();
        sim.load_obj_file(&assemble(
            ".orig x3000\nADD R0, R0, #1\nADD R0, R0, #1\nHALT\n.end",
        ));

        let count = Arc::new(std::sync::Mutex::new(0u64));
        {
            let count = Arc::clone(&count);
            sim.register_callback(CallbackType::PostInst, move |_, _| {
                *count.lock().unwrap() += 1;
            });
        }

        sim.run();
        assert_eq!(*count.lock().unwrap(), sim.inst_count_this_run());
        // Two ADDs, the HALT trap, and the two handler instructions that
        // clear the run bit.
        assert_eq!(sim.inst_count_this_run(), 5);
    }

    #[test]
    fn test_keyboard_becomes_ready_during_run() {
        let inputter = BufferedInputter::new();
        inputter.get_buffer().write().unwrap().push_back(b'A');

        let mut sim = Simulator::new(
            SimFlags { ignore_privilege: true, ..Default::default() },
            NullPrinter,
            inputter,
        );
        sim.load_obj_file(&assemble(".orig x3000\nADD R0, R0, #1\n.end"));

        sim.run_with_limit(1);

        let (kbsr, _) = sim.state.read_mem(device::KBSR).unwrap();
        assert_eq!(kbsr & 0x8000, 0x8000);

        let (kbdr, _) = sim.state.read_mem(device::KBDR).unwrap();
        assert_eq!(kbdr, 0x41);

        // Reading the data register dropped ready.
        let (kbsr, _) = sim.state.read_mem(device::KBSR).unwrap();
        assert_eq!(kbsr & 0x8000, 0);
    }

    #[test]
    fn test_getc_trap_reads_input() {
        let inputter = BufferedInputter::new();
        inputter.get_buffer().write().unwrap().push_back(b'z');

        let mut sim = Simulator::new(SimFlags::default(), NullPrinter, inputter);
        // The HALT routine clobbers R0, so park the character in memory.
        sim.load_obj_file(&assemble(
            ".orig x3000\nGETC\nST R0, SAVE\nHALT\nSAVE .fill 0\n.end",
        ));

        sim.run();
        assert!(!sim.state.running());
        assert_eq!(sim.state.mem_loc(0x3003).value, u16::from(b'z'));
    }

    #[test]
    fn test_breakpoint_fires_and_resumes() {
        let mut sim = quiet_sim();
        sim.load_obj_file(&assemble(
            ".orig x3000\nADD R0, R0, #1\nADD R0, R0, #1\nADD R0, R0, #1\nHALT\n.end",
        ));
        sim.breakpoints.insert(Breakpoint::Pc(0x3002));

        let hits = Arc::new(std::sync::Mutex::new(0u32));
        {
            let hits = Arc::clone(&hits);
            sim.register_callback(CallbackType::Breakpoint, move |_, _| {
                *hits.lock().unwrap() += 1;
            });
        }

        sim.run();
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(sim.inst_count_this_run(), 2);
        assert_eq!(sim.state.pc, 0x3002);
        assert_eq!(sim.state.reg_file[R0], 2);

        // Resuming steps off the breakpoint and runs to HALT.
        sim.run();
        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(!sim.state.running());
        assert_eq!(sim.state.reg_file[R0], 3);
    }

    #[test]
    fn test_subroutine_call_trace() {
        let mut sim = quiet_sim();
        sim.load_obj_file(&assemble(
            ".orig x3000\nJSR SUB\nHALT\nSUB ADD R0, R0, #1\nRET\n.end",
        ));

        let depths = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let depths = Arc::clone(&depths);
            sim.register_callback(CallbackType::SubEnter, move |_, state| {
                depths.lock().unwrap().push(state.func_trace_depth());
            });
        }

        sim.run();
        assert!(!sim.state.running());

        // JSR and the HALT trap each entered; only the subroutine returned,
        // so the trace still holds the frame the machine halted inside.
        assert_eq!(depths.lock().unwrap().len(), 2);
        assert_eq!(sim.call_trace().depth(), 1);
    }

    #[test]
    fn test_illegal_opcode_vectors_to_exception() {
        let mut sim = quiet_sim();
        // 0xD000 is the reserved opcode.
        sim.load_obj_file(&assemble(".orig x3000\n.fill xD000\n.end"));

        let fired = Arc::new(std::sync::Mutex::new(0u32));
        {
            let fired = Arc::clone(&fired);
            sim.register_callback(CallbackType::ExEnter, move |_, _| {
                *fired.lock().unwrap() += 1;
            });
        }

        sim.run();
        // The exception handler halts the machine.
        assert!(!sim.state.running());
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn test_rti_in_user_mode_is_privilege_violation() {
        let mut sim = quiet_sim();
        sim.load_obj_file(&assemble(".orig x3000\nRTI\n.end"));

        let fired = Arc::new(std::sync::Mutex::new(0u32));
        {
            let fired = Arc::clone(&fired);
            sim.register_callback(CallbackType::ExEnter, move |_, _| {
                *fired.lock().unwrap() += 1;
            });
        }

        sim.run();
        assert!(!sim.state.running());
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn test_keyboard_interrupt_enters_handler() {
        let inputter = BufferedInputter::new();
        inputter.get_buffer().write().unwrap().push_back(b'k');

        // ignore_privilege lets the user program poke KBSR directly.
        let mut sim = Simulator::new(
            SimFlags { ignore_privilege: true, ..Default::default() },
            NullPrinter,
            inputter,
        );
        sim.load_obj_file(&assemble(
            "
            .orig x3000
            LD R0, IE
            STI R0, KBSRP
            SPIN BR SPIN
            IE .fill x4000
            KBSRP .fill xFE00
            .end
            ",
        ));

        let enters = Arc::new(std::sync::Mutex::new(0u32));
        let exits = Arc::new(std::sync::Mutex::new(0u32));
        {
            let enters = Arc::clone(&enters);
            sim.register_callback(CallbackType::IntEnter, move |_, _| {
                *enters.lock().unwrap() += 1;
            });
            let exits = Arc::clone(&exits);
            sim.register_callback(CallbackType::IntExit, move |_, _| {
                *exits.lock().unwrap() += 1;
            });
        }

        sim.run_with_limit(30);

        assert_eq!(*enters.lock().unwrap(), 1);
        assert_eq!(*exits.lock().unwrap(), 1);
        assert_eq!(sim.call_trace().depth(), 0);
    }
}
