//! Converting plain-text binary listings into object images.
//!
//! A binary listing is the simplest way to produce a loadable image: one
//! 16-character line of `0`/`1` per word. `;` starts a comment and blank
//! lines are ignored. The first word doubles as the image's load address,
//! and is also written to memory there.
//!
//! Problems are collected per line and reported together; conversion only
//! fails after the whole listing has been checked.

use crate::asm::obj::{ObjRecord, ObjectFile};
use crate::log::{Logger, PrintType};

/// Conversion failed; diagnostics went to the logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertErr {
    /// How many lines were rejected.
    pub errors: usize,
}

impl std::fmt::Display for ConvertErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conversion failed with {} error(s)", self.errors)
    }
}
impl std::error::Error for ConvertErr {}
impl crate::err::Error for ConvertErr {}

/// Converts binary listings into object images.
pub struct BinConverter {
    logger: Logger,
}

impl BinConverter {
    /// Creates a converter reporting through `logger`.
    pub fn new(logger: Logger) -> Self {
        BinConverter { logger }
    }

    /// Converts a listing.
    ///
    /// ## Example
    /// ```
    /// use lc3_forge::asm::bin::BinConverter;
    /// use lc3_forge::log::{Logger, NullPrinter};
    ///
    /// let src = "
    ///     0011000000000000  ; load at x3000
    ///     1111000000100101  ; HALT
    /// ";
    /// let conv = BinConverter::new(Logger::new(NullPrinter, 0));
    /// let obj = conv.convert_bin(src).unwrap();
    /// assert_eq!(obj.records().len(), 3);
    /// ```
    pub fn convert_bin(&self, src: &str) -> Result<ObjectFile, ConvertErr> {
        let log = &self.logger;
        let mut records = Vec::new();
        let mut errors = 0usize;
        let mut wrote_orig = false;

        for (line_no, raw_line) in src.lines().enumerate() {
            let line: String = raw_line
                .split(';')
                .next()
                .unwrap_or("")
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();

            if line.is_empty() {
                continue;
            }

            if line.len() != 16 {
                let problem = match line.len() < 16 {
                    true => "too short",
                    false => "too long",
                };
                log.print_line(PrintType::Error, &format!("line {} is {problem}", line_no + 1));
                errors += 1;
                continue;
            }

            let Ok(value) = u16::from_str_radix(&line, 2) else {
                log.print_line(
                    PrintType::Error,
                    &format!("line {} contains illegal characters", line_no + 1),
                );
                errors += 1;
                continue;
            };

            log.print_line(PrintType::Extra, &format!("{line} => 0x{value:04x}"));

            if !wrote_orig {
                // The first word sets the load address and is kept as data.
                records.push(ObjRecord::new(value, line.clone(), true));
                wrote_orig = true;
            }
            records.push(ObjRecord::new(value, line, false));
        }

        if errors != 0 {
            log.print_line(PrintType::Error, "conversion failed");
            return Err(ConvertErr { errors });
        }

        log.print_line(PrintType::Info, "conversion successful");
        Ok(ObjectFile::from_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullPrinter;

    fn converter() -> BinConverter {
        BinConverter::new(Logger::new(NullPrinter, 0))
    }

    #[test]
    fn test_basic_listing() {
        let obj = converter()
            .convert_bin("0011000000000000\n1111000000100101\n")
            .unwrap();

        let records = obj.records();
        assert_eq!(records.len(), 3);

        // The first line is both the origin and the first data word.
        assert!(records[0].is_orig);
        assert_eq!(records[0].value, 0x3000);
        assert!(!records[1].is_orig);
        assert_eq!(records[1].value, 0x3000);
        assert_eq!(records[2].value, 0xF025);
    }

    #[test]
    fn test_comments_whitespace_and_blanks() {
        let obj = converter()
            .convert_bin("\n; header comment\n0011 0000 0000 0000 ; orig\n\n1111000000100101\n")
            .unwrap();
        assert_eq!(obj.records().len(), 3);
    }

    #[test]
    fn test_bad_lines_accumulate() {
        let err = converter()
            .convert_bin("101\n00110000000000001\n0011000000000002\n")
            .unwrap_err();
        assert_eq!(err.errors, 3);
    }

    #[test]
    fn test_errors_do_not_abort_early() {
        // A good line after a bad one is still checked; the result is an
        // error overall.
        let err = converter().convert_bin("101\n0011000000000000\n").unwrap_err();
        assert_eq!(err.errors, 1);
    }
}
