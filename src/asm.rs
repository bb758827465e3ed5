//! Assembling statements into object images.
//!
//! The assembler module notably consists of:
//! - [`Assembler`]: The driver. Parses source text, then runs the two passes.
//! - [`SymbolTable`]: Labels resolved to addresses during the first pass.
//! - [`obj`]: The object image and its on-disk format.
//! - [`bin`]: The plain-text binary listing converter.
//!
//! Pass 1 lays out sections: `.orig` opens one and sets the location
//! counter, every statement advances it by its size, labels are recorded at
//! the counter, and `.end` closes the section. Pass 2 validates each
//! statement against the ISA table's operand schemas and emits the 16-bit
//! words.
//!
//! Nothing here panics on bad input. Diagnostics accumulate in the injected
//! logger; each pass reports whether it succeeded, and a failed pass
//! short-circuits the ones after it so as many errors as possible surface in
//! a single run.

pub mod bin;
pub mod obj;

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::isa::{Instruction, IsaTable, OperandKind};
use crate::log::{AsmLogger, Logger, PrintType};
use crate::parse::{parse_statements, PieceKind, Statement, StatementPiece, PSEUDO_OPS};

use self::obj::{ObjRecord, ObjectFile};

/// Assembly failed; diagnostics went to the logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmErr {
    /// How many errors were reported.
    pub errors: usize,
}

impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assembly failed with {} error(s)", self.errors)
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {}

/// Labels resolved to addresses.
///
/// Lookup is case-insensitive; names are stored lowercase. Labels are
/// unique: inserting a name twice fails.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    map: HashMap<String, u16>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `label` at `addr`. Returns false if the label already exists.
    pub fn insert(&mut self, label: &str, addr: u16) -> bool {
        match self.map.entry(label.to_lowercase()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(addr);
                true
            }
        }
    }

    /// The address of `label`, if it is defined.
    pub fn get(&self, label: &str) -> Option<u16> {
        self.map.get(&label.to_lowercase()).copied()
    }

    /// Iterates over every (label, address) pair, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        self.map.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// The number of defined labels.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Reads a numeric piece as a `width`-bit field.
///
/// Zero-extension admits `0 <= v < 2^width`; sign-extension admits
/// `-2^(width-1) <= v < 2^(width-1)`. The returned bits are masked to the
/// field width.
pub fn get_num(bits: u32, width: u32, sext: bool) -> Option<u16> {
    let v = bits as i32;
    let fits = match sext {
        true => (-(1i64 << (width - 1))..(1i64 << (width - 1))).contains(&i64::from(v)),
        false => (0..(1i64 << width)).contains(&i64::from(v)),
    };

    fits.then(|| (bits & ((1u32 << width) - 1).min(0xFFFF)) as u16)
}

/// Expands the escape sequences of a `.stringz` literal.
///
/// `\\`, `\n`, `\r`, `\t`, and `\"` become their bytes; any other backslash
/// pair is kept verbatim.
pub fn decode_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// The two-pass assembler.
pub struct Assembler {
    logger: AsmLogger,
    isa: IsaTable,
    liberal: bool,
}

impl Assembler {
    /// Creates an assembler reporting through `logger`. Liberal mode admits
    /// `0x`/`0b` numeric prefixes and downgrades unknown pseudo-ops from
    /// errors to warnings.
    pub fn new(logger: Logger, liberal: bool) -> Self {
        Assembler {
            logger: AsmLogger::new(logger),
            isa: IsaTable::new(),
            liberal,
        }
    }

    /// The assembler's diagnostics logger.
    pub fn logger(&self) -> &AsmLogger {
        &self.logger
    }

    /// Assembles source text into an object image.
    ///
    /// ## Example
    /// ```
    /// use lc3_forge::asm::Assembler;
    /// use lc3_forge::log::{Logger, NullPrinter};
    ///
    /// let src = "
    ///     .orig x3000
    ///     ADD R1, R2, #-1
    ///     .end
    /// ";
    /// let mut asm = Assembler::new(Logger::new(NullPrinter, 0), false);
    /// let obj = asm.assemble(src).unwrap();
    ///
    /// // One origin record, one instruction word.
    /// assert_eq!(obj.records().len(), 2);
    /// assert_eq!(obj.records()[1].value, 0x12BF);
    /// ```
    pub fn assemble(&mut self, src: &str) -> Result<ObjectFile, AsmErr> {
        let mut statements = parse_statements(src, &self.isa, self.liberal);

        let (symbols, errors) = self.build_symbol_table(&mut statements);
        if errors != 0 {
            return Err(AsmErr { errors });
        }

        let (records, errors) = self.encode_statements(&statements, &symbols);
        if errors != 0 {
            return Err(AsmErr { errors });
        }

        Ok(ObjectFile::from_records(records))
    }

    /// Assembles and also hands back the symbol table from pass 1.
    pub fn assemble_with_symbols(&mut self, src: &str) -> Result<(ObjectFile, SymbolTable), AsmErr> {
        let mut statements = parse_statements(src, &self.isa, self.liberal);

        let (symbols, errors) = self.build_symbol_table(&mut statements);
        if errors != 0 {
            return Err(AsmErr { errors });
        }

        let (records, errors) = self.encode_statements(&statements, &symbols);
        if errors != 0 {
            return Err(AsmErr { errors });
        }

        Ok((ObjectFile::from_records(records), symbols))
    }

    // ------------------------------------------------------------------
    // Pass 1

    /// Lays out sections, assigns each statement its address, and records
    /// labels. Returns the symbol table and the number of errors.
    fn build_symbol_table(&self, statements: &mut [Statement]) -> (SymbolTable, usize) {
        let log = &self.logger;
        let mut symbols = SymbolTable::new();
        let mut errors = 0usize;
        // The location counter; None outside any .orig/.end section.
        let mut lc: Option<u32> = None;

        for stmt in statements.iter_mut() {
            if !stmt.valid {
                for piece in stmt.operands.iter().chain(&stmt.base).chain(&stmt.label) {
                    if let PieceKind::Invalid(e) = &piece.kind {
                        log.asm_print_piece(PrintType::Error, stmt, piece, &e.to_string());
                        errors += 1;
                    }
                }
                continue;
            }

            if stmt.is_pseudo(".orig") {
                if lc.is_some() {
                    log.asm_print(PrintType::Error, stmt, "cannot have .orig inside another section");
                    errors += 1;
                    continue;
                }
                match self.validate_orig(stmt) {
                    Some(orig) => {
                        stmt.pc = orig;
                        if let Some(label) = &stmt.label {
                            errors += self.record_label(&mut symbols, stmt, label, orig);
                        }
                        lc = Some(u32::from(orig));
                    }
                    None => errors += 1,
                }
                continue;
            }

            let Some(cur) = lc else {
                log.asm_print(PrintType::Error, stmt, "found statement before .orig");
                errors += 1;
                continue;
            };

            if cur > 0xFFFF {
                log.asm_print(PrintType::Error, stmt, "section extends past the end of memory");
                errors += 1;
                lc = None;
                continue;
            }

            stmt.pc = cur as u16;
            if let Some(label) = &stmt.label {
                errors += self.record_label(&mut symbols, stmt, label, cur as u16);
            }

            if stmt.is_pseudo(".end") {
                if !stmt.operands.is_empty() {
                    log.asm_print(PrintType::Error, stmt, ".end takes no operands");
                    errors += 1;
                }
                lc = None;
                continue;
            }

            match self.statement_size(stmt) {
                Ok(size) => lc = Some(cur + size),
                Err(n) => errors += n,
            }
        }

        if lc.is_some() {
            self.logger.logger().print_line(
                PrintType::Error,
                "error: .orig directive was never closed with .end",
            );
            self.logger.logger().newline(PrintType::Error);
            errors += 1;
        }

        (symbols, errors)
    }

    fn record_label(
        &self,
        symbols: &mut SymbolTable,
        stmt: &Statement,
        label: &StatementPiece,
        addr: u16,
    ) -> usize {
        let PieceKind::Label(name) = &label.kind else { return 0 };

        match symbols.insert(name, addr) {
            true => 0,
            false => {
                self.logger.asm_print_piece(
                    PrintType::Error,
                    stmt,
                    label,
                    "label was defined multiple times",
                );
                1
            }
        }
    }

    /// How many words a statement occupies, or how many errors it produced.
    fn statement_size(&self, stmt: &Statement) -> Result<u32, usize> {
        let log = &self.logger;

        if stmt.is_inst() {
            return Ok(1);
        }

        if stmt.is_pseudo(".fill") {
            if self.check_operand_arity(stmt, ".fill", 1) != 0 {
                return Err(1);
            }
            return match &stmt.operands[0].kind {
                PieceKind::Num(_) | PieceKind::Str(_) => Ok(1),
                _ => {
                    log.asm_print_piece(
                        PrintType::Error,
                        stmt,
                        &stmt.operands[0],
                        "operand should be numeric or a string",
                    );
                    Err(1)
                }
            };
        }

        if stmt.is_pseudo(".blkw") {
            if self.check_operand_arity(stmt, ".blkw", 1) != 0 {
                return Err(1);
            }
            let piece = &stmt.operands[0];
            let PieceKind::Num(bits) = piece.kind else {
                log.asm_print_piece(PrintType::Error, stmt, piece, "operand should be numeric");
                return Err(1);
            };
            return match get_num(bits, 16, false) {
                Some(0) => {
                    log.asm_print_piece(PrintType::Error, stmt, piece, "operand to .blkw must be > 0");
                    Err(1)
                }
                Some(n) => Ok(u32::from(n)),
                None => {
                    log.asm_print_piece(PrintType::Error, stmt, piece, "operand does not fit in 16 bits");
                    Err(1)
                }
            };
        }

        if stmt.is_pseudo(".stringz") {
            if self.check_operand_arity(stmt, ".stringz", 1) != 0 {
                return Err(1);
            }
            let piece = &stmt.operands[0];
            let PieceKind::Str(s) = &piece.kind else {
                log.asm_print_piece(PrintType::Error, stmt, piece, "operand should be a string");
                return Err(1);
            };
            // The decoded characters plus the terminator.
            return Ok(decode_string(s).chars().count() as u32 + 1);
        }

        if let Some(base @ StatementPiece { kind: PieceKind::Pseudo(name), .. }) = &stmt.base {
            if !PSEUDO_OPS.contains(&name.to_lowercase().as_str()) {
                return match self.liberal {
                    true => {
                        log.asm_print_piece(PrintType::Warning, stmt, base, "ignoring invalid pseudo-op");
                        Ok(0)
                    }
                    false => {
                        log.asm_print_piece(PrintType::Error, stmt, base, "invalid pseudo-op");
                        Err(1)
                    }
                };
            }
        }

        if stmt.base.is_none() {
            // A bare label is fine; operands with nothing to attach to are
            // not.
            return match stmt.operands.is_empty() {
                true => Ok(0),
                false => {
                    log.asm_print(PrintType::Error, stmt, "operands without an instruction or pseudo-op");
                    Err(1)
                }
            };
        }

        Ok(0)
    }

    fn validate_orig(&self, stmt: &Statement) -> Option<u16> {
        if self.check_operand_arity(stmt, ".orig", 1) != 0 {
            return None;
        }
        let piece = &stmt.operands[0];
        let PieceKind::Num(bits) = piece.kind else {
            self.logger
                .asm_print_piece(PrintType::Error, stmt, piece, "operand should be numeric");
            return None;
        };
        match get_num(bits, 16, false) {
            Some(addr) => Some(addr),
            None => {
                self.logger.asm_print_piece(
                    PrintType::Error,
                    stmt,
                    piece,
                    "operand does not fit in 16 bits",
                );
                None
            }
        }
    }

    /// Checks a pseudo-op's operand count, reporting each problem. Returns
    /// the number of errors.
    fn check_operand_arity(&self, stmt: &Statement, pseudo: &str, expected: usize) -> usize {
        let log = &self.logger;
        let found = stmt.operands.len();

        if found < expected {
            log.asm_print(
                PrintType::Error,
                stmt,
                &format!("{pseudo} requires {} more operand(s)", expected - found),
            );
            return 1;
        }
        if found > expected {
            for extra in &stmt.operands[expected..] {
                log.asm_print_piece(
                    PrintType::Error,
                    stmt,
                    extra,
                    &format!("extraneous operand to {pseudo}"),
                );
            }
            return found - expected;
        }
        0
    }

    // ------------------------------------------------------------------
    // Pass 2

    /// Validates and encodes every statement. Returns the records and the
    /// number of errors.
    fn encode_statements(
        &self,
        statements: &[Statement],
        symbols: &SymbolTable,
    ) -> (Vec<ObjRecord>, usize) {
        let mut records = Vec::new();
        let mut errors = 0usize;

        for stmt in statements {
            if stmt.is_pseudo(".orig") {
                records.push(ObjRecord::new(stmt.pc, stmt.line.clone(), true));
            } else if stmt.is_pseudo(".fill") {
                match self.encode_fill(stmt, symbols) {
                    Some(value) => records.push(ObjRecord::new(value, stmt.line.clone(), false)),
                    None => errors += 1,
                }
            } else if stmt.is_pseudo(".blkw") {
                let PieceKind::Num(bits) = stmt.operands[0].kind else {
                    unreachable!("pass 1 validated .blkw operands");
                };
                for _ in 0..bits {
                    records.push(ObjRecord::new(0, stmt.line.clone(), false));
                }
            } else if stmt.is_pseudo(".stringz") {
                let PieceKind::Str(s) = &stmt.operands[0].kind else {
                    unreachable!("pass 1 validated .stringz operands");
                };
                // Each character carries itself as line metadata so traces
                // can show string contents.
                for c in decode_string(s).chars() {
                    records.push(ObjRecord::new(c as u16, c.to_string(), false));
                }
                records.push(ObjRecord::new(0, String::new(), false));
            } else if stmt.is_inst() {
                match self.encode_instruction(stmt, symbols) {
                    Some(word) => records.push(ObjRecord::new(word, stmt.line.clone(), false)),
                    None => errors += 1,
                }
            }
            // .end, bare labels, and (in liberal mode) unknown pseudo-ops
            // emit nothing.
        }

        (records, errors)
    }

    fn encode_fill(&self, stmt: &Statement, symbols: &SymbolTable) -> Option<u16> {
        let piece = &stmt.operands[0];
        match &piece.kind {
            PieceKind::Num(bits) => {
                // .fill sign-extends negative literals and zero-extends the
                // rest.
                let sext = (*bits as i32) < 0;
                match get_num(*bits, 16, sext) {
                    Some(v) => Some(v),
                    None => {
                        self.logger.asm_print_piece(
                            PrintType::Error,
                            stmt,
                            piece,
                            "operand does not fit in 16 bits",
                        );
                        None
                    }
                }
            }
            PieceKind::Str(label) => match symbols.get(label) {
                Some(addr) => Some(addr),
                None => {
                    self.logger
                        .asm_print_piece(PrintType::Error, stmt, piece, "could not find label");
                    None
                }
            },
            _ => unreachable!("pass 1 validated .fill operands"),
        }
    }

    /// The statement's operand-type codes: `n` (numeric), `s` (string),
    /// `r` (register).
    fn statement_signature(stmt: &Statement) -> Option<String> {
        stmt.operands
            .iter()
            .map(|piece| match piece.kind {
                PieceKind::Num(_) => Some('n'),
                PieceKind::Str(_) => Some('s'),
                PieceKind::Reg(_) => Some('r'),
                _ => None,
            })
            .collect()
    }

    /// Whether a statement signature satisfies a candidate's signature,
    /// where a candidate `l` (label) slot accepts `n` or `s`.
    fn signatures_match(candidate: &str, stmt_sig: &str) -> bool {
        candidate.len() == stmt_sig.len()
            && candidate
                .chars()
                .zip(stmt_sig.chars())
                .all(|(c, s)| match c {
                    'l' => s == 'n' || s == 's',
                    _ => c == s,
                })
    }

    fn encode_instruction(&self, stmt: &Statement, symbols: &SymbolTable) -> Option<u16> {
        let log = &self.logger;
        let Some(base) = &stmt.base else { return None };
        let PieceKind::Inst(name) = &base.kind else { return None };

        let Some(stmt_sig) = Self::statement_signature(stmt) else {
            log.asm_print(PrintType::Error, stmt, "invalid operand");
            return None;
        };

        // First full signature match wins.
        let candidates = self.isa.candidates(name);
        let pattern = candidates
            .iter()
            .map(|&i| &self.isa.instructions()[i])
            .find(|inst| Self::signatures_match(&inst.type_signature(), &stmt_sig));

        let Some(pattern) = pattern else {
            match candidates.is_empty() {
                true => log.asm_print_piece(PrintType::Error, stmt, base, "invalid instruction"),
                false => log.asm_print_piece(
                    PrintType::Error,
                    stmt,
                    base,
                    &format!("invalid usage of '{name}' instruction"),
                ),
            }
            return None;
        };

        self.encode_with_pattern(stmt, pattern, symbols)
    }

    /// Walks the pattern's operand schemas, shifting each field in.
    fn encode_with_pattern(
        &self,
        stmt: &Statement,
        pattern: &Instruction,
        symbols: &SymbolTable,
    ) -> Option<u16> {
        let log = &self.logger;
        let mut encoding: u16 = 0;
        let mut operand_idx = 0;

        for schema in &pattern.operands {
            encoding = encoding.wrapping_shl(schema.width);

            let field = match schema.kind {
                OperandKind::Fixed(v) => v,
                kind => {
                    let piece = &stmt.operands[operand_idx];
                    operand_idx += 1;

                    match (kind, &piece.kind) {
                        (OperandKind::Reg, PieceKind::Reg(n)) => u16::from(*n),
                        (OperandKind::Num { sext }, PieceKind::Num(bits)) => {
                            match get_num(*bits, schema.width, sext) {
                                Some(v) => v,
                                None => {
                                    log.asm_print_piece(
                                        PrintType::Error,
                                        stmt,
                                        piece,
                                        &format!(
                                            "immediate does not fit in {}-bit {} field",
                                            schema.width,
                                            if sext { "signed" } else { "unsigned" },
                                        ),
                                    );
                                    return None;
                                }
                            }
                        }
                        (OperandKind::Label, PieceKind::Num(bits)) => {
                            match get_num(*bits, schema.width, true) {
                                Some(v) => v,
                                None => {
                                    log.asm_print_piece(
                                        PrintType::Error,
                                        stmt,
                                        piece,
                                        &format!("offset does not fit in {} bits", schema.width),
                                    );
                                    return None;
                                }
                            }
                        }
                        (OperandKind::Label, PieceKind::Str(label)) => {
                            let Some(addr) = symbols.get(label) else {
                                log.asm_print_piece(
                                    PrintType::Error,
                                    stmt,
                                    piece,
                                    "could not find label",
                                );
                                return None;
                            };

                            let off = addr.wrapping_sub(stmt.pc.wrapping_add(1)) as i16;
                            match get_num(off as i32 as u32, schema.width, true) {
                                Some(v) => v,
                                None => {
                                    log.asm_print_piece(
                                        PrintType::Error,
                                        stmt,
                                        piece,
                                        &format!(
                                            "label is too far away for a {}-bit offset",
                                            schema.width
                                        ),
                                    );
                                    return None;
                                }
                            }
                        }
                        _ => unreachable!("signature match guarantees operand kinds line up"),
                    }
                }
            };

            encoding |= field & ((1u32 << schema.width) - 1).min(0xFFFF) as u16;
        }

        Some(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NullPrinter;

    fn assembler() -> Assembler {
        Assembler::new(Logger::new(NullPrinter, 0), false)
    }
    fn liberal_assembler() -> Assembler {
        Assembler::new(Logger::new(NullPrinter, 0), true)
    }
    fn words_of(obj: &ObjectFile) -> Vec<u16> {
        obj.records().iter().filter(|r| !r.is_orig).map(|r| r.value).collect()
    }

    #[test]
    fn test_encode_basic_instructions() {
        let obj = assembler()
            .assemble(
                "
                .orig x3000
                ADD R1, R2, #-1
                ADD R2, R1, #-1
                ADD R0, R1, R2
                AND R0, R0, #0
                NOT R5, R3
                HALT
                .end
                ",
            )
            .unwrap();

        assert_eq!(words_of(&obj), [0x12BF, 0x147F, 0x1042, 0x5020, 0x9AFF, 0xF025]);
    }

    #[test]
    fn test_orig_record_and_layout() {
        let (obj, sym) = assembler()
            .assemble_with_symbols(
                "
                .orig x3000
                LEA R0, MSG
                HALT
                MSG .stringz \"Hi\"
                .end
                ",
            )
            .unwrap();

        let records = obj.records();
        assert!(records[0].is_orig);
        assert_eq!(records[0].value, 0x3000);

        assert_eq!(sym.get("MSG"), Some(0x3002));
        assert_eq!(sym.get("msg"), Some(0x3002));

        // LEA R0, MSG: offset = 0x3002 - 0x3001 = 1.
        assert_eq!(records[1].value, 0xE001);
        // "Hi" plus terminator.
        assert_eq!(words_of(&obj)[2..], [u16::from(b'H'), u16::from(b'i'), 0]);
        assert_eq!(records[3].line, "H");
    }

    #[test]
    fn test_symbol_table_layout() {
        let (_, sym) = assembler()
            .assemble_with_symbols(
                "
                .orig x3000
                A ADD R0, R0, #0
                AND R0, R0, #1
                C ADD R0, R0, #0
                D .blkw 3
                E .fill #-2
                B HALT
                .end
                ",
            )
            .unwrap();

        assert_eq!(sym.get("A"), Some(0x3000));
        assert_eq!(sym.get("C"), Some(0x3002));
        assert_eq!(sym.get("D"), Some(0x3003));
        assert_eq!(sym.get("E"), Some(0x3006));
        assert_eq!(sym.get("B"), Some(0x3007));
        assert_eq!(sym.get("missing"), None);
    }

    #[test]
    fn test_fill_sign_behavior() {
        let obj = assembler()
            .assemble(
                "
                .orig x3000
                .fill #-2
                .fill x8000
                .fill 40000
                .end
                ",
            )
            .unwrap();

        assert_eq!(words_of(&obj), [0xFFFE, 0x8000, 40000]);
    }

    #[test]
    fn test_fill_label() {
        let obj = assembler()
            .assemble(
                "
                .orig x3000
                .fill TARGET
                TARGET HALT
                .end
                ",
            )
            .unwrap();

        assert_eq!(words_of(&obj), [0x3001, 0xF025]);
    }

    #[test]
    fn test_multiple_sections() {
        let obj = assembler()
            .assemble(
                "
                .orig x3000
                HALT
                .end
                .orig x4000
                .fill 7
                .end
                ",
            )
            .unwrap();

        let origs: Vec<_> = obj.records().iter().filter(|r| r.is_orig).map(|r| r.value).collect();
        assert_eq!(origs, [0x3000, 0x4000]);
    }

    #[test]
    fn test_errors() {
        // Statement before .orig.
        assert!(assembler().assemble("HALT\n.orig x3000\n.end").is_err());
        // Duplicate label.
        assert!(assembler()
            .assemble(".orig x3000\nA HALT\nA HALT\n.end")
            .is_err());
        // Unknown mnemonic in label position with operands.
        assert!(assembler().assemble(".orig x3000\nMOV R0, R1\n.end").is_err());
        // Immediate out of range.
        assert!(assembler()
            .assemble(".orig x3000\nADD R0, R0, #16\n.end")
            .is_err());
        // Wrong operand types.
        assert!(assembler()
            .assemble(".orig x3000\nADD R0, R0\n.end")
            .is_err());
        // Undefined label in .fill.
        assert!(assembler()
            .assemble(".orig x3000\n.fill NOWHERE\n.end")
            .is_err());
        // .blkw 0.
        assert!(assembler().assemble(".orig x3000\n.blkw 0\n.end").is_err());
        // Unclosed .orig.
        assert!(assembler().assemble(".orig x3000\nHALT").is_err());
        // .end without .orig.
        assert!(assembler().assemble(".end").is_err());
    }

    #[test]
    fn test_error_count_accumulates() {
        let err = assembler()
            .assemble(
                "
                .orig x3000
                ADD R0, R0, #16
                ADD R0, R0, #17
                .end
                ",
            )
            .unwrap_err();
        assert_eq!(err.errors, 2);
    }

    #[test]
    fn test_unknown_pseudo_strict_vs_liberal() {
        let src = ".orig x3000\n.wobble 3\nHALT\n.end";
        assert!(assembler().assemble(src).is_err());

        // Liberal mode skips it with a warning; the words are unaffected.
        let obj = liberal_assembler().assemble(src).unwrap();
        assert_eq!(words_of(&obj), [0xF025]);
    }

    #[test]
    fn test_liberal_numeric_prefixes() {
        let obj = liberal_assembler()
            .assemble(".orig 0x3000\n.fill 0b101\n.end")
            .unwrap();
        assert_eq!(obj.records()[0].value, 0x3000);
        assert_eq!(words_of(&obj), [0b101]);
    }

    #[test]
    fn test_stringz_escapes() {
        let obj = assembler()
            .assemble(".orig x3000\n.stringz \"a\\n\\\\b\\e\"\n.end")
            .unwrap();

        let expect: Vec<u16> = "a\n\\b\\e\0".chars().map(|c| c as u16).collect();
        assert_eq!(words_of(&obj), expect);
    }

    #[test]
    fn test_branch_offsets() {
        let obj = assembler()
            .assemble(
                "
                .orig x3000
                LOOP ADD R0, R0, #1
                BRzp LOOP
                BR #-2
                JSR LOOP
                .end
                ",
            )
            .unwrap();

        let words = words_of(&obj);
        // BRzp LOOP: cc=011, offset = 0x3000 - 0x3002 = -2.
        assert_eq!(words[1], 0x07FE);
        // BR #-2 uses the numeric offset directly, cc = nzp.
        assert_eq!(words[2], 0x0FFE);
        // JSR LOOP: offset = 0x3000 - 0x3004 = -4.
        assert_eq!(words[3], 0x4FFC);
    }

    #[test]
    fn test_label_out_of_range() {
        assert!(assembler()
            .assemble(
                "
                .orig x3000
                BR FAR
                .blkw 300
                FAR HALT
                .end
                "
            )
            .is_err());
    }
}
