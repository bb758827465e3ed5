//! Decoding fetched words back into ISA table entries.
//!
//! The [`Decoder`] is built once from the [`IsaTable`], grouping encoding
//! forms by their 4-bit opcode so a decode only has to test the handful of
//! forms sharing the fetched word's prefix. A word matches a form when every
//! fixed field agrees; the first match in table order wins. A word matching
//! no form is an illegal opcode, which the engine turns into an exception.

use std::collections::HashMap;

use crate::isa::{Instruction, IsaTable};

/// Maps fetched words to ISA entries.
#[derive(Debug)]
pub struct Decoder {
    isa: IsaTable,
    by_opcode: HashMap<u16, Vec<usize>>,
}

impl Decoder {
    /// Builds a decoder over the full instruction table.
    pub fn new() -> Self {
        Self::with_table(IsaTable::new())
    }

    /// Builds a decoder over a given table.
    pub fn with_table(isa: IsaTable) -> Self {
        let mut by_opcode: HashMap<u16, Vec<usize>> = HashMap::new();
        for (i, inst) in isa.instructions().iter().enumerate() {
            by_opcode.entry(inst.opcode()).or_default().push(i);
        }

        Decoder { isa, by_opcode }
    }

    /// The table this decoder reads from.
    pub fn isa(&self) -> &IsaTable {
        &self.isa
    }

    /// Decodes a word, returning the matching entry and its extracted
    /// field values, or `None` if no entry matches.
    pub fn decode(&self, word: u16) -> Option<(&Instruction, Vec<u16>)> {
        let opcode = word >> 12;

        for &i in self.by_opcode.get(&opcode)? {
            let inst = &self.isa.instructions()[i];
            if let Some(fields) = inst.match_word(word) {
                return Some((inst, fields));
            }
        }

        None
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic_forms() {
        let dec = Decoder::new();

        let (inst, fields) = dec.decode(0x147F).unwrap();
        assert_eq!(inst.name, "add");
        assert_eq!(fields, [2, 1, 0xFFFF]);

        let (inst, fields) = dec.decode(0x1042).unwrap();
        assert_eq!(inst.name, "add");
        assert_eq!(fields, [0, 1, 2]);

        let (inst, fields) = dec.decode(0x21FF).unwrap();
        assert_eq!(inst.name, "ld");
        assert_eq!(fields, [0, 0xFFFF]);

        let (inst, _) = dec.decode(0xC1C0).unwrap();
        assert_eq!(inst.name, "jmp");

        let (inst, _) = dec.decode(0x0000).unwrap();
        assert_eq!(inst.name, "nop");

        let (inst, fields) = dec.decode(0xF025).unwrap();
        assert_eq!(inst.name, "trap");
        assert_eq!(fields, [0x25]);
    }

    #[test]
    fn test_reserved_words_do_not_decode() {
        let dec = Decoder::new();

        // Opcode 0b1101 is reserved.
        assert!(dec.decode(0xD000).is_none());
        assert!(dec.decode(0xDFFF).is_none());

        // ADD with bit 5 clear but junk in bits 4..3.
        assert!(dec.decode(0x1048 | 0x0010).is_none());
    }

    #[test]
    fn test_decode_encoding_roundtrip() {
        // Register-only instructions decode back to the fields they were
        // encoded from.
        let dec = Decoder::new();
        for word in [0x1042u16, 0x5042, 0x9077, 0x6185, 0x7249] {
            let (inst, fields) = dec.decode(word).unwrap();

            // Reassemble the word from the fixed fields and the extracted
            // values.
            let mut out = 0u16;
            let mut fi = 0;
            for op in &inst.operands {
                out <<= op.width;
                match op.kind {
                    crate::isa::OperandKind::Fixed(v) => out |= v,
                    _ => {
                        out |= fields[fi] & ((1u32 << op.width) - 1) as u16;
                        fi += 1;
                    }
                }
            }
            assert_eq!(out, word);
        }
    }
}
