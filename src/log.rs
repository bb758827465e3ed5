//! Diagnostic output routed through an injected sink.
//!
//! The key pieces of this module are:
//! - [`Printer`]: The sink interface. The toolchain never prints directly;
//!   everything goes through a `Printer` provided by the embedding host.
//! - [`Logger`]: Severity-filtered, severity-colored output on top of a printer.
//! - [`AsmLogger`]: Assembler diagnostics with source coordinates and carets.
//!
//! Three printers are provided: [`ConsolePrinter`] (colored terminal output),
//! [`BufferedPrinter`] (captures output for tests and embedding), and
//! [`NullPrinter`] (discards everything).

use std::sync::{Arc, Mutex, MutexGuard};

use colored::Colorize;

use crate::parse::{Statement, StatementPiece};

/// Default verbosity if the host does not specify one.
///
/// At this level, everything up to and including [`PrintType::Note`] is shown.
pub const DEFAULT_PRINT_LEVEL: u32 = 4;

/// The colors a [`Printer`] can be asked to switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintColor {
    #[allow(missing_docs)]
    Red,
    #[allow(missing_docs)]
    Yellow,
    #[allow(missing_docs)]
    Green,
    #[allow(missing_docs)]
    Magenta,
    #[allow(missing_docs)]
    Blue,
    #[allow(missing_docs)]
    Gray,
    /// Bold, in the current foreground color.
    Bold,
    /// Back to the terminal default.
    #[default]
    Reset,
}

/// Severity of a diagnostic message.
///
/// The numeric value doubles as the verbosity threshold: a message is shown
/// when its value is less than or equal to the logger's print level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintType {
    /// An error the toolchain cannot recover from.
    FatalError = 0,
    /// An ordinary error.
    Error = 1,
    /// Something suspicious, but not wrong enough to stop.
    Warning = 2,
    /// Status information.
    Info = 3,
    /// Additional remarks attached to another message.
    Note = 4,
    /// Verbose tracing (event-by-event simulator output).
    Extra = 5,
    /// Even more verbose tracing (micro-ops, stack traces).
    Debug = 6,
}

impl PrintType {
    /// The fixed severity-to-color mapping.
    pub fn color(self) -> PrintColor {
        match self {
            PrintType::FatalError => PrintColor::Red,
            PrintType::Error => PrintColor::Red,
            PrintType::Warning => PrintColor::Yellow,
            PrintType::Info => PrintColor::Green,
            PrintType::Note => PrintColor::Gray,
            PrintType::Extra => PrintColor::Gray,
            PrintType::Debug => PrintColor::Magenta,
        }
    }

    /// The label used when prefixing diagnostics (e.g. `error: ...`).
    pub fn label(self) -> &'static str {
        match self {
            PrintType::FatalError => "fatal error",
            PrintType::Error => "error",
            PrintType::Warning => "warning",
            PrintType::Info => "info",
            PrintType::Note => "note",
            PrintType::Extra => "extra",
            PrintType::Debug => "debug",
        }
    }
}

/// An output sink for diagnostics and simulator display output.
///
/// Implementations decide what "color" means for their medium; sinks that
/// have no notion of color can ignore [`Printer::set_color`] entirely.
pub trait Printer {
    /// Switches the color applied to subsequent [`Printer::print`] calls.
    fn set_color(&mut self, color: PrintColor);
    /// Prints a string, without a trailing newline.
    fn print(&mut self, text: &str);
    /// Ends the current line.
    fn newline(&mut self);
}

/// A printer shared between the logger and anything else that writes to the
/// same sink (notably the display device).
pub type SharedPrinter = Arc<Mutex<Box<dyn Printer + Send>>>;

/// Acquires the printer lock, recovering from a poisoned mutex.
pub(crate) fn lock_printer(printer: &SharedPrinter) -> MutexGuard<'_, Box<dyn Printer + Send>> {
    match printer.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

/// Severity-filtered logging over a shared [`Printer`].
#[derive(Clone)]
pub struct Logger {
    printer: SharedPrinter,
    print_level: u32,
}

impl Logger {
    /// Creates a logger over the given printer with the given verbosity.
    pub fn new(printer: impl Printer + Send + 'static, print_level: u32) -> Self {
        Logger {
            printer: Arc::new(Mutex::new(Box::new(printer))),
            print_level,
        }
    }

    /// Returns a handle to the underlying printer.
    ///
    /// This is how the display device shares the host's sink with the logger.
    pub fn shared_printer(&self) -> SharedPrinter {
        Arc::clone(&self.printer)
    }

    /// Gets the current verbosity.
    pub fn print_level(&self) -> u32 {
        self.print_level
    }

    /// Changes the verbosity.
    pub fn set_print_level(&mut self, print_level: u32) {
        self.print_level = print_level;
    }

    /// Whether a message of the given severity would be shown.
    pub fn enabled(&self, ty: PrintType) -> bool {
        (ty as u32) <= self.print_level
    }

    /// Prints `text` in the severity's color, without a newline.
    pub fn print(&self, ty: PrintType, text: &str) {
        if !self.enabled(ty) {
            return;
        }
        let mut p = lock_printer(&self.printer);
        p.set_color(ty.color());
        p.print(text);
        p.set_color(PrintColor::Reset);
    }

    /// Prints `text` in the severity's color and ends the line.
    pub fn print_line(&self, ty: PrintType, text: &str) {
        if !self.enabled(ty) {
            return;
        }
        self.print(ty, text);
        self.newline(ty);
    }

    /// Ends the current line if the severity is enabled.
    pub fn newline(&self, ty: PrintType) {
        if !self.enabled(ty) {
            return;
        }
        lock_printer(&self.printer).newline();
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("print_level", &self.print_level)
            .finish_non_exhaustive()
    }
}

/// Assembler diagnostics: a [`Logger`] that also knows how to point at
/// source coordinates.
///
/// Messages are shown in the familiar three-line form:
///
/// ```text
/// 3:13: error: immediate too large for 5-bit signed field
///     ADD R1, R2, #9000
///                 ^~~~~
/// ```
#[derive(Debug, Clone)]
pub struct AsmLogger {
    logger: Logger,
}

impl AsmLogger {
    /// Wraps a logger for assembler use.
    pub fn new(logger: Logger) -> Self {
        AsmLogger { logger }
    }

    /// Access to the plain logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Reports a diagnostic against a whole statement.
    pub fn asm_print(&self, ty: PrintType, stmt: &Statement, msg: &str) {
        self.print_header(ty, stmt.row, 0, msg);
        self.logger.print_line(ty, &stmt.line);
        self.logger.newline(ty);
    }

    /// Reports a diagnostic against one piece of a statement, with a caret
    /// marker under the offending characters.
    pub fn asm_print_piece(&self, ty: PrintType, stmt: &Statement, piece: &StatementPiece, msg: &str) {
        self.print_header(ty, stmt.row, piece.col, msg);
        self.logger.print_line(ty, &stmt.line);

        let mut marker = " ".repeat(piece.col as usize);
        marker.push('^');
        for _ in 1..piece.len.max(1) {
            marker.push('~');
        }
        self.logger.print_line(ty, &marker);
        self.logger.newline(ty);
    }

    fn print_header(&self, ty: PrintType, row: u32, col: u32, msg: &str) {
        let header = format!("{}:{}: {}: {}", row + 1, col + 1, ty.label(), msg);
        self.logger.print_line(ty, &header);
    }
}

/// Terminal printer with ANSI colors.
#[derive(Default)]
pub struct ConsolePrinter {
    color: PrintColor,
}

impl ConsolePrinter {
    /// Creates a console printer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Printer for ConsolePrinter {
    fn set_color(&mut self, color: PrintColor) {
        self.color = color;
    }

    fn print(&mut self, text: &str) {
        let styled = match self.color {
            PrintColor::Red => text.red().to_string(),
            PrintColor::Yellow => text.yellow().to_string(),
            PrintColor::Green => text.green().to_string(),
            PrintColor::Magenta => text.magenta().to_string(),
            PrintColor::Blue => text.blue().to_string(),
            PrintColor::Gray => text.dimmed().to_string(),
            PrintColor::Bold => text.bold().to_string(),
            PrintColor::Reset => text.to_string(),
        };
        print!("{styled}");
    }

    fn newline(&mut self) {
        println!();
    }
}

/// A printer that collects everything into a shared string buffer.
///
/// Useful for tests and for hosts that render output themselves. Colors are
/// ignored.
#[derive(Default, Clone)]
pub struct BufferedPrinter {
    buffer: Arc<Mutex<String>>,
}

impl BufferedPrinter {
    /// Creates an empty buffered printer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the output buffer.
    pub fn get_buffer(&self) -> &Arc<Mutex<String>> {
        &self.buffer
    }

    /// Copies the current buffer contents out.
    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(g) => g.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }
}

impl Printer for BufferedPrinter {
    fn set_color(&mut self, _color: PrintColor) {}

    fn print(&mut self, text: &str) {
        match self.buffer.lock() {
            Ok(mut g) => g.push_str(text),
            Err(e) => e.into_inner().push_str(text),
        }
    }

    fn newline(&mut self) {
        self.print("\n");
    }
}

/// A printer that discards all output.
#[derive(Default, Clone, Copy)]
pub struct NullPrinter;

impl Printer for NullPrinter {
    fn set_color(&mut self, _color: PrintColor) {}
    fn print(&mut self, _text: &str) {}
    fn newline(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_level_filter() {
        let printer = BufferedPrinter::new();
        let logger = Logger::new(printer.clone(), 1);

        logger.print_line(PrintType::Error, "shown");
        logger.print_line(PrintType::Warning, "hidden");
        logger.print_line(PrintType::Debug, "hidden");

        assert_eq!(printer.contents(), "shown\n");
    }

    #[test]
    fn test_severity_colors() {
        assert_eq!(PrintType::Error.color(), PrintColor::Red);
        assert_eq!(PrintType::Warning.color(), PrintColor::Yellow);
        assert_eq!(PrintType::Debug.color(), PrintColor::Magenta);
    }
}
