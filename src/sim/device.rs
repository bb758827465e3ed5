//! The memory-mapped devices: keyboard and display.
//!
//! Devices are tagged variants of [`Device`], each exposing the same
//! capability set: an address map, startup/shutdown hooks, memory-mapped
//! reads and writes, and a per-instruction-cycle [`Device::tick`]. Reads,
//! writes, and ticks may hand back micro-ops (callback pends, interrupt
//! enqueues) which the engine appends to the running chain.
//!
//! Register layout:
//!
//! | address | register | bits |
//! |---------|----------|------|
//! | `xFE00` | KBSR | 15 = ready (read-only), 14 = interrupt enable |
//! | `xFE02` | KBDR | 7..0 = last character |
//! | `xFE04` | DSR  | 15 = ready (always set in this model) |
//! | `xFE06` | DDR  | 7..0 = character to display |

use std::collections::VecDeque;

use crate::log::{lock_printer, SharedPrinter};
use crate::sim::frame::CallbackType;
use crate::sim::io::Inputter;
use crate::sim::state::InterruptKind;
use crate::sim::uop::MicroOp;

/// Keyboard status register address.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register address.
pub const KBDR: u16 = 0xFE02;
/// Display status register address.
pub const DSR: u16 = 0xFE04;
/// Display data register address.
pub const DDR: u16 = 0xFE06;

const SR_READY: u16 = 0x8000;
const SR_INT_ENABLE: u16 = 0x4000;

/// A device connected to the machine's memory-mapped range.
pub enum Device {
    /// The keyboard. See [`Keyboard`].
    Keyboard(Keyboard),
    /// The display. See [`Display`].
    Display(Display),
}

impl Device {
    /// The addresses this device claims.
    pub fn addr_map(&self) -> Vec<u16> {
        match self {
            Device::Keyboard(_) => vec![KBSR, KBDR],
            Device::Display(_) => vec![DSR, DDR],
        }
    }

    /// The device's name, for trace output.
    pub fn name(&self) -> &'static str {
        match self {
            Device::Keyboard(_) => "keyboard",
            Device::Display(_) => "display",
        }
    }

    pub(crate) fn startup(&mut self) {
        match self {
            Device::Keyboard(dev) => dev.startup(),
            Device::Display(_) => {}
        }
    }

    pub(crate) fn shutdown(&mut self) {
        match self {
            Device::Keyboard(dev) => dev.shutdown(),
            Device::Display(_) => {}
        }
    }

    /// Reads one of the device's registers.
    pub fn read(&mut self, addr: u16) -> (u16, Vec<MicroOp>) {
        match self {
            Device::Keyboard(dev) => dev.read(addr),
            Device::Display(dev) => dev.read(addr),
        }
    }

    /// Writes one of the device's registers.
    pub fn write(&mut self, addr: u16, value: u16) -> Vec<MicroOp> {
        match self {
            Device::Keyboard(dev) => dev.write(addr, value),
            Device::Display(dev) => dev.write(addr, value),
        }
    }

    /// Gives the device one time slice.
    pub fn tick(&mut self) -> Vec<MicroOp> {
        match self {
            Device::Keyboard(dev) => dev.tick(),
            Device::Display(_) => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(match self {
            Device::Keyboard(_) => "Keyboard",
            Device::Display(_) => "Display",
        })
        .finish_non_exhaustive()
    }
}

/// One buffered keypress.
#[derive(Debug, Clone, Copy)]
struct Key {
    value: u8,
    /// Set once this key has raised its interrupt, so a single keypress
    /// never interrupts twice.
    triggered_interrupt: bool,
}

impl Key {
    fn new(value: u8) -> Self {
        Key { value, triggered_interrupt: false }
    }
}

/// The keyboard device.
///
/// Characters come from the injected [`Inputter`]. Each tick pulls at most
/// one character into the internal key buffer; when the status register is
/// not ready, the next buffered key is loaded into the data register and
/// ready is raised. If interrupts are enabled (KBSR[14]) and the current key
/// has not yet triggered one, the tick queues a keyboard interrupt.
///
/// Reading KBDR consumes the current key and clears ready.
pub struct Keyboard {
    status: u16,
    data: u16,
    buffer: VecDeque<Key>,
    inputter: Box<dyn Inputter>,
}

impl Keyboard {
    /// Creates a keyboard over the given input source.
    pub fn new(inputter: impl Inputter + 'static) -> Self {
        Keyboard {
            status: 0,
            data: 0,
            buffer: VecDeque::new(),
            inputter: Box::new(inputter),
        }
    }

    fn startup(&mut self) {
        self.inputter.begin_input();
    }

    fn shutdown(&mut self) {
        self.inputter.end_input();
    }

    fn read(&mut self, addr: u16) -> (u16, Vec<MicroOp>) {
        match addr {
            KBSR => (
                self.status,
                vec![MicroOp::PendCallback { which: CallbackType::InputPoll }],
            ),
            KBDR => {
                self.buffer.pop_front();
                self.status &= !SR_READY;
                (
                    self.data & 0x00FF,
                    vec![MicroOp::PendCallback { which: CallbackType::InputRequest }],
                )
            }
            _ => (0, Vec::new()),
        }
    }

    fn write(&mut self, addr: u16, value: u16) -> Vec<MicroOp> {
        if addr == KBSR {
            // Only the interrupt-enable bit is writable.
            self.status = (self.status & SR_READY) | (value & SR_INT_ENABLE);
        }
        Vec::new()
    }

    fn tick(&mut self) -> Vec<MicroOp> {
        if let Some(c) = self.inputter.get_char() {
            self.buffer.push_back(Key::new(c));
        }

        if self.status & SR_READY == 0 {
            if let Some(key) = self.buffer.front() {
                self.data = u16::from(key.value);
                self.status |= SR_READY;
            }
        }

        let mut chain = Vec::new();
        if self.status & SR_READY != 0 && self.status & SR_INT_ENABLE != 0 {
            if let Some(key) = self.buffer.front_mut() {
                if !key.triggered_interrupt {
                    key.triggered_interrupt = true;
                    chain.push(MicroOp::EnqueueInterrupt { kind: InterruptKind::Keyboard });
                }
            }
        }
        chain
    }
}

/// The display device.
///
/// The status register always reads ready; writing the data register sends
/// the low byte straight to the shared [`Printer`] sink.
///
/// [`Printer`]: crate::log::Printer
pub struct Display {
    data: u16,
    printer: SharedPrinter,
}

impl Display {
    /// Creates a display that writes to the given sink.
    pub fn new(printer: SharedPrinter) -> Self {
        Display { data: 0, printer }
    }

    fn read(&mut self, addr: u16) -> (u16, Vec<MicroOp>) {
        match addr {
            DSR => (SR_READY, Vec::new()),
            DDR => (self.data, Vec::new()),
            _ => (0, Vec::new()),
        }
    }

    fn write(&mut self, addr: u16, value: u16) -> Vec<MicroOp> {
        if addr == DDR {
            self.data = value & 0x00FF;
            let ch = char::from(self.data as u8);
            lock_printer(&self.printer).print(&ch.to_string());
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{BufferedPrinter, Logger};
    use crate::sim::io::BufferedInputter;

    fn keyboard_with(input: &[u8]) -> Keyboard {
        let inp = BufferedInputter::new();
        inp.get_buffer().write().unwrap().extend(input.iter().copied());
        Keyboard::new(inp)
    }

    #[test]
    fn test_keyboard_ready_cycle() {
        let mut kb = keyboard_with(b"A");

        // Before any tick, nothing is ready.
        assert_eq!(kb.read(KBSR).0 & SR_READY, 0);

        kb.tick();
        assert_eq!(kb.read(KBSR).0 & SR_READY, SR_READY);

        let (data, _) = kb.read(KBDR);
        assert_eq!(data, 0x41);

        // The read consumed the key and dropped ready.
        assert_eq!(kb.read(KBSR).0 & SR_READY, 0);
    }

    #[test]
    fn test_keyboard_interrupts_once_per_key() {
        let mut kb = keyboard_with(b"A");
        kb.write(KBSR, SR_INT_ENABLE);

        let chain = kb.tick();
        assert_eq!(
            chain,
            [MicroOp::EnqueueInterrupt { kind: InterruptKind::Keyboard }]
        );

        // Further ticks with the same key pending stay quiet.
        assert!(kb.tick().is_empty());
        assert!(kb.tick().is_empty());
    }

    #[test]
    fn test_keyboard_interrupts_require_enable() {
        let mut kb = keyboard_with(b"A");
        assert!(kb.tick().is_empty());

        // Enabling after the fact still raises for the pending key.
        kb.write(KBSR, SR_INT_ENABLE);
        assert!(!kb.tick().is_empty());
    }

    #[test]
    fn test_display_emits_to_printer() {
        let printer = BufferedPrinter::new();
        let logger = Logger::new(printer.clone(), 0);
        let mut ds = Display::new(logger.shared_printer());

        assert_eq!(ds.read(DSR).0, SR_READY);
        ds.write(DDR, u16::from(b'h'));
        ds.write(DDR, u16::from(b'i'));
        assert_eq!(printer.contents(), "hi");
    }
}
