//! The simulated machine's state.
//!
//! [`MachineState`] holds everything an executing program can observe:
//! the register file, PC/IR/PSR/MCR, the saved stack pointer, 64 Ki words of
//! [`MemLocation`] memory, the memory-mapped device registry, the
//! pending-interrupt queue, and the function trace.
//!
//! Memory is accessed two ways:
//! - [`MachineState::read_mem`] / [`MachineState::write_mem`] simulate an
//!   access: privilege checks apply, memory-mapped addresses dispatch to
//!   devices, and a device may hand back follow-up micro-ops.
//! - [`MachineState::mem_loc`] / [`MachineState::mem_loc_mut`] inspect or
//!   patch the raw state without triggering any of that.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::Rng;

use crate::asm::obj::ObjectFile;
use crate::isa::Reg;
use crate::sim::device::Device;
use crate::sim::frame::{CallbackType, FuncType};
use crate::sim::uop::MicroOp;

/// First memory-mapped address.
pub const MMIO_START: u16 = 0xFE00;
/// Addresses a user-mode program may touch.
pub const USER_RANGE: std::ops::Range<u16> = 0x3000..MMIO_START;
/// Memory-mapped address of the PSR.
pub const PSR_ADDR: u16 = 0xFFFC;
/// Memory-mapped address of the MCR.
pub const MCR_ADDR: u16 = 0xFFFE;
/// Base of the interrupt/exception vector table.
pub const INT_TABLE_START: u16 = 0x0100;
/// Default initial PC.
pub const RESET_PC: u16 = 0x3000;

const MEM_SIZE: usize = 1 << 16;
const MCR_RUN: u16 = 0x8000;

/// Identifies a registered device within the machine.
pub type DeviceId = usize;

/// A machine exception, raised through the vector table at
/// [`INT_TABLE_START`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// A privileged instruction was executed in user mode.
    PrivilegeViolation,
    /// A fetched word decoded to no known instruction.
    IllegalOpcode,
    /// A memory access touched something it must not: system space from user
    /// mode, or a memory-mapped address no device claims.
    AccessViolation,
}

impl Exception {
    /// This exception's index into the vector table.
    pub fn vector(self) -> u16 {
        match self {
            Exception::PrivilegeViolation => 0x00,
            Exception::IllegalOpcode => 0x01,
            Exception::AccessViolation => 0x02,
        }
    }
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exception::PrivilegeViolation => f.write_str("privilege violation"),
            Exception::IllegalOpcode => f.write_str("illegal opcode"),
            Exception::AccessViolation => f.write_str("access violation"),
        }
    }
}
impl std::error::Error for Exception {}
impl crate::err::Error for Exception {}

/// An interrupt a device may raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    /// The keyboard has a character ready and interrupts are enabled.
    Keyboard,
}

impl InterruptKind {
    /// The interrupt's index into the vector table.
    pub fn vector(self) -> u16 {
        match self {
            InterruptKind::Keyboard => 0x80,
        }
    }

    /// The interrupt's priority level.
    pub fn priority(self) -> u8 {
        match self {
            InterruptKind::Keyboard => 4,
        }
    }
}

impl std::fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptKind::Keyboard => f.write_str("keyboard"),
        }
    }
}

/// One word of memory, with metadata for debugging output.
///
/// The `line` string is the source line that produced the word. For words
/// that came from a `.stringz`, the line is the single stored character;
/// when a program later stores an ASCII value into such a location, the
/// metadata is rewritten to the new character so string regions stay
/// readable in traces.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemLocation {
    /// The stored word.
    pub value: u16,
    /// The source line this word came from.
    pub line: String,
    /// Whether this word was the origin marker of its section.
    pub is_orig: bool,
}

impl MemLocation {
    /// Creates a location holding `value` with the given source line.
    pub fn new(value: u16, line: String, is_orig: bool) -> Self {
        MemLocation { value, line, is_orig }
    }
}

/// Produces the initial data for memory and registers.
///
/// See [`MemFillStrategy`] for the available strategies.
pub trait MemFiller {
    /// Generates one word of fill data.
    fn generate(&mut self) -> u16;
}
impl MemFiller for u16 {
    fn generate(&mut self) -> u16 {
        *self
    }
}
impl MemFiller for () {
    /// Unseeded, non-deterministic values.
    fn generate(&mut self) -> u16 {
        rand::random()
    }
}
impl MemFiller for StdRng {
    fn generate(&mut self) -> u16 {
        self.gen()
    }
}

/// How memory and registers are initialized at power-on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MemFillStrategy {
    /// Every word starts at zero.
    #[default]
    Zeroed,
    /// Every word starts at a known value.
    Known {
        /// The fill value.
        value: u16,
    },
    /// Random data from a seeded generator (deterministic).
    Seeded {
        /// The RNG seed.
        seed: u64,
    },
    /// Random data, different every run.
    Unseeded,
}

impl MemFillStrategy {
    fn generator(self) -> FillGen {
        use rand::SeedableRng;

        match self {
            MemFillStrategy::Zeroed => FillGen::Known(0),
            MemFillStrategy::Known { value } => FillGen::Known(value),
            MemFillStrategy::Seeded { seed } => FillGen::Seeded(Box::new(StdRng::seed_from_u64(seed))),
            MemFillStrategy::Unseeded => FillGen::Unseeded,
        }
    }
}

enum FillGen {
    Known(u16),
    Seeded(Box<StdRng>),
    Unseeded,
}
impl MemFiller for FillGen {
    fn generate(&mut self) -> u16 {
        match self {
            FillGen::Known(k) => k.generate(),
            FillGen::Seeded(r) => r.generate(),
            FillGen::Unseeded => ().generate(),
        }
    }
}

/// The machine's 64 Ki words of RAM.
///
/// Memory-mapped addresses live here too, but the values stored for them are
/// only shadows; simulated accesses to the MMIO range never reach this
/// storage.
pub struct Mem {
    data: Vec<MemLocation>,
}

impl Mem {
    fn new(filler: &mut impl MemFiller) -> Self {
        let data = std::iter::repeat_with(|| MemLocation {
            value: filler.generate(),
            line: String::new(),
            is_orig: false,
        })
        .take(MEM_SIZE)
        .collect();

        Mem { data }
    }

    /// The location at `addr`.
    pub fn get(&self, addr: u16) -> &MemLocation {
        &self.data[usize::from(addr)]
    }

    /// The location at `addr`, mutably.
    pub fn get_mut(&mut self, addr: u16) -> &mut MemLocation {
        &mut self.data[usize::from(addr)]
    }
}

impl std::fmt::Debug for Mem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem").finish_non_exhaustive()
    }
}

/// The eight general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegFile([u16; 8]);

impl RegFile {
    fn new(filler: &mut impl MemFiller) -> Self {
        RegFile(std::array::from_fn(|_| filler.generate()))
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u16;

    fn index(&self, index: Reg) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, index: Reg) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

/// A wrapper over `u16` in order to facilitate the PSR.
///
/// The word is encoded as the following:
/// - `PSR[15]`: Privilege mode (0 = supervisor, 1 = user)
/// - `PSR[8..11]`: Interrupt priority
/// - `PSR[0..3]`: Condition codes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Psr(pub u16);

impl Psr {
    /// Creates a PSR with the power-on value (user mode, priority 0, Z set).
    pub fn new() -> Self {
        Psr(0x8002)
    }

    /// Checks whether the machine is in privileged (supervisor) mode.
    pub fn privileged(&self) -> bool {
        (self.0 >> 15) == 0
    }
    /// The current interrupt priority.
    pub fn priority(&self) -> u8 {
        ((self.0 >> 8) & 0b111) as u8
    }
    /// The condition codes (N = bit 2, Z = bit 1, P = bit 0).
    pub fn cc(&self) -> u8 {
        (self.0 & 0b111) as u8
    }
    /// Sets the privilege mode.
    pub fn set_privileged(&mut self, privl: bool) {
        self.0 &= 0x7FFF;
        self.0 |= (!privl as u16) << 15;
    }
    /// Sets the interrupt priority.
    pub fn set_priority(&mut self, prio: u8) {
        self.0 &= 0xF8FF;
        self.0 |= u16::from(prio & 0b111) << 8;
    }
    /// Sets the condition codes.
    pub fn set_cc(&mut self, cc: u8) {
        self.0 &= 0xFFF8;
        self.0 |= u16::from(cc & 0b111);
    }
}
impl Default for Psr {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for Psr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;
        struct CC(u8);

        impl std::fmt::Debug for CC {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if self.0 & 0b100 != 0 {
                    f.write_char('N')?;
                }
                if self.0 & 0b010 != 0 {
                    f.write_char('Z')?;
                }
                if self.0 & 0b001 != 0 {
                    f.write_char('P')?;
                }
                Ok(())
            }
        }

        f.debug_struct("Psr")
            .field("privileged", &self.privileged())
            .field("priority", &self.priority())
            .field("cc", &CC(self.cc()))
            .finish()
    }
}

/// Everything an executing program can observe or mutate.
pub struct MachineState {
    /// The register file.
    pub reg_file: RegFile,
    /// The program counter.
    pub pc: u16,
    /// The last fetched word.
    pub ir: u16,
    /// The initial PC applied at the first power-on.
    pub reset_pc: u16,
    /// The memory.
    pub mem: Mem,

    psr: Psr,
    mcr: u16,
    saved_sp: u16,
    pub(crate) mdr: u16,

    devices: Vec<Device>,
    mmio: HashMap<u16, DeviceId>,

    pending_interrupts: VecDeque<InterruptKind>,
    func_trace: Vec<FuncType>,
    pending_callbacks: Vec<CallbackType>,

    ignore_privilege: bool,
    first_init: bool,
}

impl MachineState {
    /// Creates a machine with zeroed memory and no devices.
    pub fn new() -> Self {
        Self::with_fill(MemFillStrategy::default())
    }

    /// Creates a machine whose memory and registers are initialized with the
    /// given strategy.
    pub fn with_fill(fill: MemFillStrategy) -> Self {
        let mut gen = fill.generator();
        MachineState {
            reg_file: RegFile::new(&mut gen),
            pc: 0,
            ir: 0,
            reset_pc: RESET_PC,
            mem: Mem::new(&mut gen),
            psr: Psr::new(),
            mcr: 0,
            saved_sp: USER_RANGE.start,
            mdr: 0,
            devices: Vec::new(),
            mmio: HashMap::new(),
            pending_interrupts: VecDeque::new(),
            func_trace: Vec::new(),
            pending_callbacks: Vec::new(),
            ignore_privilege: false,
            first_init: true,
        }
    }

    /// Resets memory, registers, and control state, keeping devices
    /// registered. The next power-on behaves like the first.
    pub fn reinitialize(&mut self, fill: MemFillStrategy) {
        let mut gen = fill.generator();
        self.reg_file = RegFile::new(&mut gen);
        self.mem = Mem::new(&mut gen);
        self.pc = 0;
        self.ir = 0;
        self.mdr = 0;
        self.psr = Psr::new();
        self.mcr = 0;
        self.saved_sp = USER_RANGE.start;
        self.reset_pc = RESET_PC;
        self.pending_interrupts.clear();
        self.func_trace.clear();
        self.pending_callbacks.clear();
        self.first_init = true;
    }

    /// First power-on initializes PC/PSR/stack; every power-on raises the
    /// run bit so a resumed session continues where it stopped.
    pub(crate) fn power_on(&mut self) {
        if self.first_init {
            self.pc = self.reset_pc;
            self.ir = 0;
            self.psr = Psr::new();
            self.saved_sp = USER_RANGE.start;
            self.first_init = false;
        }
        self.mcr |= MCR_RUN;
    }

    // ------------------------------------------------------------------
    // Devices

    /// Registers a device and claims its address map.
    pub(crate) fn add_device(&mut self, device: Device) -> DeviceId {
        let id = self.devices.len();
        for addr in device.addr_map() {
            self.mmio.insert(addr, id);
        }
        self.devices.push(device);
        id
    }

    pub(crate) fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub(crate) fn startup_devices(&mut self) {
        for dev in &mut self.devices {
            dev.startup();
        }
    }

    pub(crate) fn shutdown_devices(&mut self) {
        for dev in &mut self.devices {
            dev.shutdown();
        }
    }

    /// Gives the device one time slice, returning the micro-ops it wants run.
    pub(crate) fn tick_device(&mut self, id: DeviceId) -> Vec<MicroOp> {
        self.devices[id].tick()
    }

    // ------------------------------------------------------------------
    // Memory

    fn check_access(&self, addr: u16) -> Result<(), Exception> {
        if self.psr.privileged() || self.ignore_privilege || USER_RANGE.contains(&addr) {
            Ok(())
        } else {
            Err(Exception::AccessViolation)
        }
    }

    /// Simulates a read of `addr`.
    ///
    /// Memory-mapped addresses dispatch to the owning device, which may
    /// return follow-up micro-ops to append to the running chain. A read of
    /// an unmapped memory-mapped address, or of system space from user mode,
    /// is an access violation.
    pub fn read_mem(&mut self, addr: u16) -> Result<(u16, Vec<MicroOp>), Exception> {
        self.check_access(addr)?;

        if addr >= MMIO_START {
            match addr {
                PSR_ADDR => Ok((self.psr.0, Vec::new())),
                MCR_ADDR => Ok((self.mcr, Vec::new())),
                _ => match self.mmio.get(&addr).copied() {
                    Some(id) => Ok(self.devices[id].read(addr)),
                    None => Err(Exception::AccessViolation),
                },
            }
        } else {
            Ok((self.mem.get(addr).value, Vec::new()))
        }
    }

    /// Simulates a write of `value` to `addr`. Symmetric to
    /// [`MachineState::read_mem`].
    pub fn write_mem(&mut self, addr: u16, value: u16) -> Result<Vec<MicroOp>, Exception> {
        self.check_access(addr)?;

        if addr >= MMIO_START {
            match addr {
                PSR_ADDR => {
                    self.psr.0 = value;
                    Ok(Vec::new())
                }
                MCR_ADDR => {
                    self.mcr = value;
                    Ok(Vec::new())
                }
                _ => match self.mmio.get(&addr).copied() {
                    Some(id) => Ok(self.devices[id].write(addr, value)),
                    None => Err(Exception::AccessViolation),
                },
            }
        } else {
            let loc = self.mem.get_mut(addr);
            loc.value = value;
            // Keep string regions readable: a stored ASCII value replaces
            // single-character line metadata.
            if value <= 127 && loc.line.len() == 1 {
                loc.line = char::from(value as u8).to_string();
            }
            Ok(Vec::new())
        }
    }

    /// Raw access to a memory location. No privilege checks, no device
    /// dispatch.
    pub fn mem_loc(&self, addr: u16) -> &MemLocation {
        self.mem.get(addr)
    }

    /// Raw mutable access to a memory location.
    pub fn mem_loc_mut(&mut self, addr: u16) -> &mut MemLocation {
        self.mem.get_mut(addr)
    }

    /// The source line recorded for `addr`, or `""` for memory-mapped space.
    pub fn mem_line(&self, addr: u16) -> &str {
        match addr < MMIO_START {
            true => &self.mem.get(addr).line,
            false => "",
        }
    }

    /// Copies an object image into memory.
    ///
    /// An origin record repositions the load cursor; every other record is
    /// written at the cursor, which then advances.
    pub fn load_object(&mut self, obj: &ObjectFile) {
        let mut addr: u16 = 0;
        for rec in obj.records() {
            if rec.is_orig {
                addr = rec.value;
            } else {
                let loc = self.mem.get_mut(addr);
                loc.value = rec.value;
                loc.line = rec.line.clone();
                loc.is_orig = false;
                addr = addr.wrapping_add(1);
            }
        }
    }

    // ------------------------------------------------------------------
    // Control registers

    /// The PSR.
    pub fn psr(&self) -> &Psr {
        &self.psr
    }

    pub(crate) fn psr_mut(&mut self) -> &mut Psr {
        &mut self.psr
    }

    /// The MCR.
    pub fn mcr(&self) -> u16 {
        self.mcr
    }

    /// Whether the run bit (MCR[15]) is set.
    pub fn running(&self) -> bool {
        self.mcr & MCR_RUN != 0
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        match running {
            true => self.mcr |= MCR_RUN,
            false => self.mcr &= !MCR_RUN,
        }
    }

    /// The stack pointer not currently in R6.
    pub fn saved_sp(&self) -> u16 {
        self.saved_sp
    }

    pub(crate) fn swap_saved_sp(&mut self) {
        std::mem::swap(&mut self.saved_sp, &mut self.reg_file[crate::isa::reg_consts::R6]);
    }

    /// Whether privilege exceptions are being suppressed for debugging.
    pub fn ignore_privilege(&self) -> bool {
        self.ignore_privilege
    }

    /// Suppresses (or reinstates) privilege exceptions.
    pub fn set_ignore_privilege(&mut self, ignore: bool) {
        self.ignore_privilege = ignore;
    }

    // ------------------------------------------------------------------
    // Interrupts, callbacks, function trace

    /// Queues an interrupt for the next interrupt check.
    pub fn enqueue_interrupt(&mut self, kind: InterruptKind) {
        self.pending_interrupts.push_back(kind);
    }

    /// The interrupt at the front of the queue, if any.
    pub fn peek_interrupt(&self) -> Option<InterruptKind> {
        self.pending_interrupts.front().copied()
    }

    pub(crate) fn dequeue_interrupt(&mut self) -> Option<InterruptKind> {
        self.pending_interrupts.pop_front()
    }

    pub(crate) fn pend_callback(&mut self, which: CallbackType) {
        self.pending_callbacks.push(which);
    }

    pub(crate) fn take_pending_callbacks(&mut self) -> Vec<CallbackType> {
        std::mem::take(&mut self.pending_callbacks)
    }

    pub(crate) fn push_func_type(&mut self, func: FuncType) {
        self.func_trace.push(func);
    }

    pub(crate) fn pop_func_type(&mut self) -> Option<FuncType> {
        self.func_trace.pop()
    }

    /// The tag at the top of the function trace.
    pub fn peek_func_type(&self) -> Option<FuncType> {
        self.func_trace.last().copied()
    }

    /// The current function-trace depth.
    pub fn func_trace_depth(&self) -> usize {
        self.func_trace.len()
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineState")
            .field("pc", &self.pc)
            .field("ir", &self.ir)
            .field("psr", &self.psr)
            .field("mcr", &self.mcr)
            .field("reg_file", &self.reg_file)
            .field("devices", &self.devices.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_defaults() {
        let mut state = MachineState::new();
        state.power_on();

        assert_eq!(state.pc, RESET_PC);
        assert!(!state.psr().privileged());
        assert_eq!(state.psr().cc(), 0b010);
        assert!(state.running());

        // A later power-on keeps the PC.
        state.pc = 0x4242;
        state.set_running(false);
        state.power_on();
        assert_eq!(state.pc, 0x4242);
        assert!(state.running());
    }

    #[test]
    fn test_mem_roundtrip_outside_mmio() {
        let mut state = MachineState::new();
        state.write_mem(0x3456, 0xABCD).unwrap();
        let (v, uops) = state.read_mem(0x3456).unwrap();
        assert_eq!(v, 0xABCD);
        assert!(uops.is_empty());
    }

    #[test]
    fn test_user_mode_access_checks() {
        let mut state = MachineState::new();
        state.power_on(); // user mode

        assert_eq!(state.read_mem(0x0200), Err(Exception::AccessViolation));
        assert_eq!(state.write_mem(0x0200, 1), Err(Exception::AccessViolation));
        assert!(state.read_mem(0x3000).is_ok());

        state.set_ignore_privilege(true);
        assert!(state.read_mem(0x0200).is_ok());
    }

    #[test]
    fn test_unmapped_mmio_is_access_violation() {
        let mut state = MachineState::new();
        // Even supervisor mode faults when nothing owns the address.
        state.psr_mut().set_privileged(true);
        assert_eq!(state.read_mem(0xFE70), Err(Exception::AccessViolation));
        assert_eq!(state.write_mem(0xFE70, 0), Err(Exception::AccessViolation));
    }

    #[test]
    fn test_psr_mcr_are_memory_mapped() {
        let mut state = MachineState::new();
        state.power_on();
        state.set_ignore_privilege(true);

        let (psr, _) = state.read_mem(PSR_ADDR).unwrap();
        assert_eq!(psr, state.psr().0);

        state.write_mem(MCR_ADDR, 0).unwrap();
        assert!(!state.running());
    }

    #[test]
    fn test_stringz_line_metadata_rewrite() {
        let mut state = MachineState::new();
        {
            let loc = state.mem_loc_mut(0x4000);
            loc.value = u16::from(b'H');
            loc.line = "H".to_string();
        }

        state.write_mem(0x4000, u16::from(b'J')).unwrap();
        assert_eq!(state.mem_line(0x4000), "J");

        // Multi-character metadata stays put.
        state.mem_loc_mut(0x4001).line = "ADD R0, R0, #1".to_string();
        state.write_mem(0x4001, u16::from(b'J')).unwrap();
        assert_eq!(state.mem_line(0x4001), "ADD R0, R0, #1");
    }

    #[test]
    fn test_interrupt_queue_is_fifo() {
        let mut state = MachineState::new();
        state.enqueue_interrupt(InterruptKind::Keyboard);
        assert_eq!(state.peek_interrupt(), Some(InterruptKind::Keyboard));
        assert_eq!(state.dequeue_interrupt(), Some(InterruptKind::Keyboard));
        assert_eq!(state.dequeue_interrupt(), None);
    }

    #[test]
    fn test_func_trace_is_lifo() {
        let mut state = MachineState::new();
        state.push_func_type(FuncType::Trap);
        state.push_func_type(FuncType::Interrupt);
        assert_eq!(state.peek_func_type(), Some(FuncType::Interrupt));
        assert_eq!(state.pop_func_type(), Some(FuncType::Interrupt));
        assert_eq!(state.peek_func_type(), Some(FuncType::Trap));
    }

    #[test]
    fn test_seeded_fill_is_deterministic() {
        let a = MachineState::with_fill(MemFillStrategy::Seeded { seed: 2110 });
        let b = MachineState::with_fill(MemFillStrategy::Seeded { seed: 2110 });
        for addr in [0u16, 0x3000, 0x8000, 0xFDFF] {
            assert_eq!(a.mem.get(addr).value, b.mem.get(addr).value);
        }
    }
}
