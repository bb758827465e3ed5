//! An LC-3 assembler, object-file toolchain, and event-driven simulator.
//!
//! This crate is the backend for LC-3 tooling: front ends (CLIs, GUIs, test
//! harnesses) plug in through a [`Printer`] sink, an [`Inputter`] source,
//! and the callback table on the simulator.
//!
//! [`Printer`]: log::Printer
//! [`Inputter`]: sim::io::Inputter
//!
//! # Usage
//!
//! To turn LC-3 source code into a loadable object image, run the assembler:
//! ```
//! use lc3_forge::asm::Assembler;
//! use lc3_forge::log::{Logger, NullPrinter};
//!
//! let code = "
//!     .orig x3000
//!     AND R0, R0, #0
//!     ADD R0, R0, #7
//!     HALT
//!     .end
//! ";
//! let mut assembler = Assembler::new(Logger::new(NullPrinter, 0), false);
//! let obj = assembler.assemble(code).unwrap();
//!
//! // The image can be written to disk and read back:
//! let bytes = obj.serialize();
//! # use lc3_forge::asm::obj::ObjectFile;
//! # assert_eq!(ObjectFile::deserialize(&bytes).unwrap(), obj);
//! ```
//!
//! Once an object image exists, the simulator can load and execute it:
//! ```
//! # use lc3_forge::asm::Assembler;
//! # use lc3_forge::log::{Logger, NullPrinter};
//! #
//! # let code = ".orig x3000\nHALT\n.end";
//! # let mut assembler = Assembler::new(Logger::new(NullPrinter, 0), false);
//! # let obj = assembler.assemble(code).unwrap();
//! #
//! use lc3_forge::log::BufferedPrinter;
//! use lc3_forge::sim::io::NoInput;
//! use lc3_forge::sim::{SimFlags, Simulator};
//!
//! let mut simulator = Simulator::new(SimFlags::default(), BufferedPrinter::new(), NoInput);
//! simulator.load_obj_file(&obj);
//! simulator.run();
//! assert!(!simulator.state.running());
//! ```
//!
//! Execution is driven by a discrete-event engine; breakpoints, callbacks,
//! and the memory-mapped keyboard/display devices all hang off it. See the
//! [`sim`] module for details.
#![warn(missing_docs)]

pub mod asm;
pub mod err;
pub mod isa;
pub mod log;
pub mod parse;
pub mod sim;
