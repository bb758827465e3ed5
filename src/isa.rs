//! The LC-3 instruction set, described as data.
//!
//! The core of this module is [`IsaTable`], a list of [`Instruction`] entries.
//! Each entry couples three things:
//! - a mnemonic,
//! - an ordered list of [`Operand`] schemas describing the instruction's
//!   bit fields (fixed bits, registers, immediates, PC-relative offsets),
//! - a function that materializes the instruction's micro-op chain when the
//!   simulator executes it.
//!
//! The assembler's encoder and the simulator's decoder both walk the same
//! operand schemas, so an encoding and its decoding can never drift apart.
//! Instructions with several encoding forms (`ADD`/`AND` with a register or
//! an immediate, the `BR` condition-code spellings, the trap aliases) get one
//! entry per form.

use std::collections::HashMap;
use std::num::TryFromIntError;

use crate::sim::frame::{CallbackType, FuncType};
use crate::sim::state::{Exception, MachineState};
use crate::sim::uop::{self, MemAddr, MicroOp};

/// A register. Must be between 0 and 7.
///
/// This `Reg` struct can either be constructed by selecting a register from
/// [`reg_consts`], or by using [`Reg::try_from`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Reg(pub(crate) u8);

/// Register constants.
pub mod reg_consts {
    use super::Reg;

    /// The 0th register in the register file.
    pub const R0: Reg = Reg(0);
    /// The 1st register in the register file.
    pub const R1: Reg = Reg(1);
    /// The 2nd register in the register file.
    pub const R2: Reg = Reg(2);
    /// The 3rd register in the register file.
    pub const R3: Reg = Reg(3);
    /// The 4th register in the register file.
    pub const R4: Reg = Reg(4);
    /// The 5th register in the register file.
    pub const R5: Reg = Reg(5);
    /// The 6th register in the register file (the stack pointer).
    pub const R6: Reg = Reg(6);
    /// The 7th register in the register file (the link register).
    pub const R7: Reg = Reg(7);
}
use reg_consts::{R6, R7};

impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 7.
    pub fn reg_no(self) -> u8 {
        self.0
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}
impl From<Reg> for usize {
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}
impl TryFrom<u8> for Reg {
    type Error = TryFromIntError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=7 => Ok(Reg(value)),
            _ => u8::try_from(256).map(|_| unreachable!("should've been TryFromIntError")),
        }
    }
}

/// What kind of bit field an [`Operand`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Bits fixed by the encoding (opcodes, unused fields, hardwired registers).
    /// Consumes no source operand.
    Fixed(u16),
    /// A register number.
    Reg,
    /// A numeric immediate. `sext` selects sign- or zero-extension.
    Num {
        /// Whether the field is sign-extended when read back out.
        sext: bool,
    },
    /// A PC-relative offset, written as a label or a numeric offset.
    /// Always sign-extended.
    Label,
}

/// One bit field of an instruction encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    /// The field's kind.
    pub kind: OperandKind,
    /// The field's width in bits.
    pub width: u32,
}

impl Operand {
    /// A fixed field holding `value`.
    pub const fn fixed(value: u16, width: u32) -> Self {
        Operand { kind: OperandKind::Fixed(value), width }
    }
    /// A 3-bit register field.
    pub const fn reg() -> Self {
        Operand { kind: OperandKind::Reg, width: 3 }
    }
    /// A sign-extended immediate field.
    pub const fn num_sext(width: u32) -> Self {
        Operand { kind: OperandKind::Num { sext: true }, width }
    }
    /// A zero-extended immediate field.
    pub const fn num_zext(width: u32) -> Self {
        Operand { kind: OperandKind::Num { sext: false }, width }
    }
    /// A sign-extended PC-relative offset field.
    pub const fn label(width: u32) -> Self {
        Operand { kind: OperandKind::Label, width }
    }
}

/// Sign-extends the low `width` bits of `raw` to 16 bits.
pub(crate) fn sign_extend(raw: u16, width: u32) -> u16 {
    (((raw << (16 - width)) as i16) >> (16 - width)) as u16
}

/// The function an [`Instruction`] uses to materialize its micro-op chain.
///
/// `fields` holds the extracted non-fixed bit fields in operand order, already
/// sign/zero-extended per their schema. The machine state is the state *after*
/// fetch (the PC has been incremented past the instruction).
pub type UopBuilder = fn(&Instruction, &[u16], &MachineState) -> Vec<MicroOp>;

/// One encoding form of an LC-3 instruction.
#[derive(Clone)]
pub struct Instruction {
    /// The mnemonic, lowercase.
    pub name: &'static str,
    /// The bit fields, most significant first. The first is always the
    /// 4-bit fixed opcode.
    pub operands: Vec<Operand>,
    /// Produces the micro-op chain realizing this instruction.
    pub build: UopBuilder,
}

impl Instruction {
    fn new(name: &'static str, operands: Vec<Operand>, build: UopBuilder) -> Self {
        debug_assert_eq!(
            operands.iter().map(|op| op.width).sum::<u32>(),
            16,
            "operand widths of {name} should sum to a full word"
        );
        Instruction { name, operands, build }
    }

    /// The 4-bit opcode of this encoding form.
    pub fn opcode(&self) -> u16 {
        match self.operands[0].kind {
            OperandKind::Fixed(v) => v,
            _ => unreachable!("first operand should be the fixed opcode"),
        }
    }

    /// The operand type codes of this form's source-level operands
    /// (`n` = numeric, `r` = register, `l` = label-or-numeric).
    ///
    /// Fixed fields consume no source operand and do not appear.
    pub fn type_signature(&self) -> String {
        self.operands
            .iter()
            .filter_map(|op| match op.kind {
                OperandKind::Fixed(_) => None,
                OperandKind::Reg => Some('r'),
                OperandKind::Num { .. } => Some('n'),
                OperandKind::Label => Some('l'),
            })
            .collect()
    }

    /// Checks this form against a 16-bit word, extracting the non-fixed
    /// fields (sign/zero-extended per their schema) if every fixed field
    /// matches.
    pub fn match_word(&self, word: u16) -> Option<Vec<u16>> {
        let mut fields = Vec::new();
        let mut pos = 16u32;

        for op in &self.operands {
            pos -= op.width;
            let raw = (word >> pos) & ((1u32 << op.width) - 1) as u16;
            match op.kind {
                OperandKind::Fixed(v) => {
                    if raw != v {
                        return None;
                    }
                }
                OperandKind::Reg => fields.push(raw),
                OperandKind::Num { sext: true } | OperandKind::Label => {
                    fields.push(sign_extend(raw, op.width))
                }
                OperandKind::Num { sext: false } => fields.push(raw),
            }
        }

        Some(fields)
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("operands", &self.operands)
            .finish_non_exhaustive()
    }
}

/// The full instruction table, indexed by mnemonic.
#[derive(Debug)]
pub struct IsaTable {
    instructions: Vec<Instruction>,
    by_name: HashMap<&'static str, Vec<usize>>,
}

impl IsaTable {
    /// Builds the LC-3 instruction table.
    pub fn new() -> Self {
        let instructions = build_table();

        let mut by_name: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for (i, inst) in instructions.iter().enumerate() {
            by_name.entry(inst.name).or_default().push(i);
        }

        IsaTable { instructions, by_name }
    }

    /// All encoding forms, in table order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Whether `name` (case-insensitive) is a known mnemonic.
    pub fn is_mnemonic(&self, name: &str) -> bool {
        self.by_name.contains_key(name.to_lowercase().as_str())
    }

    /// The indices of every encoding form sharing a mnemonic
    /// (case-insensitive). Empty if the mnemonic is unknown.
    pub fn candidates(&self, name: &str) -> &[usize] {
        self.by_name
            .get(name.to_lowercase().as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for IsaTable {
    fn default() -> Self {
        Self::new()
    }
}

fn build_table() -> Vec<Instruction> {
    use Operand as Op;

    let mut t = Vec::new();

    // ADD/AND, register and immediate forms
    t.push(Instruction::new(
        "add",
        vec![Op::fixed(0x1, 4), Op::reg(), Op::reg(), Op::fixed(0b000, 3), Op::reg()],
        build_add_reg,
    ));
    t.push(Instruction::new(
        "add",
        vec![Op::fixed(0x1, 4), Op::reg(), Op::reg(), Op::fixed(0b1, 1), Op::num_sext(5)],
        build_add_imm,
    ));
    t.push(Instruction::new(
        "and",
        vec![Op::fixed(0x5, 4), Op::reg(), Op::reg(), Op::fixed(0b000, 3), Op::reg()],
        build_and_reg,
    ));
    t.push(Instruction::new(
        "and",
        vec![Op::fixed(0x5, 4), Op::reg(), Op::reg(), Op::fixed(0b1, 1), Op::num_sext(5)],
        build_and_imm,
    ));

    // BR and its condition-code spellings
    for (name, cc) in [
        ("br", 0b111),
        ("brn", 0b100),
        ("brz", 0b010),
        ("brp", 0b001),
        ("brnz", 0b110),
        ("brnp", 0b101),
        ("brzp", 0b011),
        ("brnzp", 0b111),
    ] {
        t.push(Instruction::new(
            name,
            vec![Op::fixed(0x0, 4), Op::fixed(cc, 3), Op::label(9)],
            build_br,
        ));
    }

    t.push(Instruction::new(
        "jmp",
        vec![Op::fixed(0xC, 4), Op::fixed(0b000, 3), Op::reg(), Op::fixed(0, 6)],
        build_jmp,
    ));
    t.push(Instruction::new(
        "ret",
        vec![Op::fixed(0xC, 4), Op::fixed(0b000, 3), Op::fixed(7, 3), Op::fixed(0, 6)],
        build_jmp,
    ));
    t.push(Instruction::new(
        "jsr",
        vec![Op::fixed(0x4, 4), Op::fixed(0b1, 1), Op::label(11)],
        build_jsr,
    ));
    t.push(Instruction::new(
        "jsrr",
        vec![Op::fixed(0x4, 4), Op::fixed(0b000, 3), Op::reg(), Op::fixed(0, 6)],
        build_jsrr,
    ));

    t.push(Instruction::new("ld", vec![Op::fixed(0x2, 4), Op::reg(), Op::label(9)], build_ld));
    t.push(Instruction::new("ldi", vec![Op::fixed(0xA, 4), Op::reg(), Op::label(9)], build_ldi));
    t.push(Instruction::new(
        "ldr",
        vec![Op::fixed(0x6, 4), Op::reg(), Op::reg(), Op::num_sext(6)],
        build_ldr,
    ));
    t.push(Instruction::new("lea", vec![Op::fixed(0xE, 4), Op::reg(), Op::label(9)], build_lea));
    t.push(Instruction::new(
        "not",
        vec![Op::fixed(0x9, 4), Op::reg(), Op::reg(), Op::fixed(0x3F, 6)],
        build_not,
    ));
    t.push(Instruction::new("rti", vec![Op::fixed(0x8, 4), Op::fixed(0, 12)], build_rti));
    t.push(Instruction::new("st", vec![Op::fixed(0x3, 4), Op::reg(), Op::label(9)], build_st));
    t.push(Instruction::new("sti", vec![Op::fixed(0xB, 4), Op::reg(), Op::label(9)], build_sti));
    t.push(Instruction::new(
        "str",
        vec![Op::fixed(0x7, 4), Op::reg(), Op::reg(), Op::num_sext(6)],
        build_str,
    ));

    t.push(Instruction::new(
        "trap",
        vec![Op::fixed(0xF, 4), Op::fixed(0, 4), Op::num_zext(8)],
        build_trap,
    ));
    // Trap aliases: fixed TRAP encodings with their own mnemonics.
    for (name, vect) in [
        ("getc", 0x20),
        ("out", 0x21),
        ("putc", 0x21),
        ("puts", 0x22),
        ("in", 0x23),
        ("putsp", 0x24),
        ("halt", 0x25),
    ] {
        t.push(Instruction::new(
            name,
            vec![Op::fixed(0xF, 4), Op::fixed(0, 4), Op::fixed(vect, 8)],
            build_trap,
        ));
    }

    t.push(Instruction::new("nop", vec![Op::fixed(0x0, 4), Op::fixed(0, 12)], build_nop));

    t
}

fn reg(field: u16) -> Reg {
    Reg(field as u8)
}

fn build_add_reg(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    let (dst, src1, src2) = (reg(f[0]), reg(f[1]), reg(f[2]));
    vec![MicroOp::RegAddReg { dst, src1, src2 }, MicroOp::SetCc { src: dst }]
}

fn build_add_imm(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    let (dst, src) = (reg(f[0]), reg(f[1]));
    vec![
        MicroOp::RegAddImm { dst, src, imm: f[2] as i16 },
        MicroOp::SetCc { src: dst },
    ]
}

fn build_and_reg(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    let (dst, src1, src2) = (reg(f[0]), reg(f[1]), reg(f[2]));
    vec![MicroOp::RegAndReg { dst, src1, src2 }, MicroOp::SetCc { src: dst }]
}

fn build_and_imm(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    let (dst, src) = (reg(f[0]), reg(f[1]));
    vec![
        MicroOp::RegAndImm { dst, src, imm: f[2] as i16 },
        MicroOp::SetCc { src: dst },
    ]
}

fn build_not(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    let (dst, src) = (reg(f[0]), reg(f[1]));
    vec![MicroOp::RegNot { dst, src }, MicroOp::SetCc { src: dst }]
}

fn build_br(inst: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    let OperandKind::Fixed(cc) = inst.operands[1].kind else {
        unreachable!("BR condition codes should be a fixed field");
    };

    match (cc as u8) & state.psr().cc() != 0 {
        true => vec![MicroOp::PcAddImm { imm: f[0] as i16 }],
        false => vec![],
    }
}

fn build_nop(_: &Instruction, _: &[u16], _: &MachineState) -> Vec<MicroOp> {
    vec![]
}

fn build_jmp(inst: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    // RET has the base register hardwired to R7; JMP carries it in a field.
    let base = match inst.name {
        "ret" => R7,
        _ => reg(f[0]),
    };

    let mut chain = vec![MicroOp::PcWriteReg { src: base }];
    if base == R7 && state.peek_func_type() == Some(FuncType::Subroutine) {
        chain.push(MicroOp::PopFuncType);
        chain.push(MicroOp::PendCallback { which: CallbackType::SubExit });
    }
    chain
}

fn build_jsr(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    vec![
        MicroOp::RegWriteImm { dst: R7, value: state.pc },
        MicroOp::PcWriteImm { value: state.pc.wrapping_add_signed(f[0] as i16) },
        MicroOp::PushFuncType { func: FuncType::Subroutine },
        MicroOp::PendCallback { which: CallbackType::SubEnter },
    ]
}

fn build_jsrr(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    // The target is read before R7 is overwritten, so JSRR R7 jumps to the
    // address R7 held on entry.
    vec![
        MicroOp::MdrWriteReg { src: reg(f[0]) },
        MicroOp::RegWriteImm { dst: R7, value: state.pc },
        MicroOp::PcWriteMdr,
        MicroOp::PushFuncType { func: FuncType::Subroutine },
        MicroOp::PendCallback { which: CallbackType::SubEnter },
    ]
}

fn build_ld(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    let dst = reg(f[0]);
    let ea = state.pc.wrapping_add_signed(f[1] as i16);
    vec![
        MicroOp::MdrWriteMem { addr: MemAddr::Imm(ea) },
        MicroOp::RegWriteMdr { dst },
        MicroOp::SetCc { src: dst },
    ]
}

fn build_ldi(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    let dst = reg(f[0]);
    let ea = state.pc.wrapping_add_signed(f[1] as i16);
    vec![
        MicroOp::MdrWriteMem { addr: MemAddr::Imm(ea) },
        MicroOp::MdrWriteMem { addr: MemAddr::Mdr },
        MicroOp::RegWriteMdr { dst },
        MicroOp::SetCc { src: dst },
    ]
}

fn build_ldr(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    let dst = reg(f[0]);
    vec![
        MicroOp::MdrWriteMem { addr: MemAddr::RegOff(reg(f[1]), f[2] as i16) },
        MicroOp::RegWriteMdr { dst },
        MicroOp::SetCc { src: dst },
    ]
}

fn build_lea(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    // LEA does not set the condition codes.
    vec![MicroOp::RegWriteImm {
        dst: reg(f[0]),
        value: state.pc.wrapping_add_signed(f[1] as i16),
    }]
}

fn build_st(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    let ea = state.pc.wrapping_add_signed(f[1] as i16);
    vec![MicroOp::MemWriteFromReg { addr: MemAddr::Imm(ea), src: reg(f[0]) }]
}

fn build_sti(_: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    let ea = state.pc.wrapping_add_signed(f[1] as i16);
    vec![
        MicroOp::MdrWriteMem { addr: MemAddr::Imm(ea) },
        MicroOp::MemWriteFromReg { addr: MemAddr::Mdr, src: reg(f[0]) },
    ]
}

fn build_str(_: &Instruction, f: &[u16], _: &MachineState) -> Vec<MicroOp> {
    vec![MicroOp::MemWriteFromReg {
        addr: MemAddr::RegOff(reg(f[1]), f[2] as i16),
        src: reg(f[0]),
    }]
}

fn build_rti(_: &Instruction, _: &[u16], state: &MachineState) -> Vec<MicroOp> {
    if !state.psr().privileged() && !state.ignore_privilege() {
        return uop::exception_chain(state, Exception::PrivilegeViolation);
    }

    let mut chain = vec![
        MicroOp::MdrWriteMem { addr: MemAddr::Reg(R6) },
        MicroOp::PcWriteMdr,
        MicroOp::MdrWriteMem { addr: MemAddr::RegOff(R6, 1) },
        MicroOp::PsrWriteMdr,
        MicroOp::RegAddImm { dst: R6, src: R6, imm: 2 },
        MicroOp::SwapSavedSpIfUser,
    ];

    if let Some(func) = state.peek_func_type() {
        let exit = match func {
            FuncType::Subroutine | FuncType::Trap => CallbackType::SubExit,
            FuncType::Interrupt => CallbackType::IntExit,
            FuncType::Exception => CallbackType::ExExit,
        };
        chain.push(MicroOp::PopFuncType);
        chain.push(MicroOp::PendCallback { which: exit });
    }

    chain
}

fn build_trap(inst: &Instruction, f: &[u16], state: &MachineState) -> Vec<MicroOp> {
    // Aliases carry the vector as a fixed field; plain TRAP extracts it.
    let vect = match f.first() {
        Some(&v) => v,
        None => match inst.operands.last().map(|op| op.kind) {
            Some(OperandKind::Fixed(v)) => v,
            _ => unreachable!("trap alias should end in a fixed vector"),
        },
    };

    uop::system_enter_chain(state, vect, None, FuncType::Trap, CallbackType::SubEnter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_form_sums_to_a_word() {
        for inst in IsaTable::new().instructions() {
            let total: u32 = inst.operands.iter().map(|op| op.width).sum();
            assert_eq!(total, 16, "{} has a malformed encoding", inst.name);
        }
    }

    #[test]
    fn test_mnemonic_lookup() {
        let isa = IsaTable::new();
        assert!(isa.is_mnemonic("ADD"));
        assert!(isa.is_mnemonic("add"));
        assert!(isa.is_mnemonic("BRnzp"));
        assert!(isa.is_mnemonic("halt"));
        assert!(!isa.is_mnemonic("mov"));
        assert_eq!(isa.candidates("add").len(), 2);
        assert_eq!(isa.candidates("nop").len(), 1);
    }

    #[test]
    fn test_type_signatures() {
        let isa = IsaTable::new();
        let sigs: Vec<_> = isa
            .candidates("add")
            .iter()
            .map(|&i| isa.instructions()[i].type_signature())
            .collect();
        assert_eq!(sigs, ["rrr", "rrn"]);

        let i = isa.candidates("ld")[0];
        assert_eq!(isa.instructions()[i].type_signature(), "rl");

        let i = isa.candidates("halt")[0];
        assert_eq!(isa.instructions()[i].type_signature(), "");
    }

    #[test]
    fn test_match_word_extracts_fields() {
        let isa = IsaTable::new();

        // ADD R2, R1, #-1
        let i = isa.candidates("add")[1];
        let fields = isa.instructions()[i].match_word(0x147F).unwrap();
        assert_eq!(fields, [2, 1, 0xFFFF]);

        // The register form does not match an immediate-form word.
        let i = isa.candidates("add")[0];
        assert_eq!(isa.instructions()[i].match_word(0x147F), None);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111, 5), 0xFFFF);
        assert_eq!(sign_extend(0b01111, 5), 15);
        assert_eq!(sign_extend(0x1FF, 9), 0xFFFF);
        assert_eq!(sign_extend(0x0FF, 9), 0xFF);
    }
}
