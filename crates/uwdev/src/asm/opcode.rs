//! The conversation VM instruction set.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// How an instruction's operand word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand word.
    None,
    /// Plain immediate value.
    Immediate,
    /// Absolute word offset into the code vector (JMP, CALL).
    Absolute,
    /// Signed word offset from the instruction following the branch.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Opcode {
    Nop = 0x00,
    OpAdd = 0x01,
    OpMul = 0x02,
    OpSub = 0x03,
    OpDiv = 0x04,
    OpMod = 0x05,
    OpOr = 0x06,
    OpAnd = 0x07,
    OpNot = 0x08,
    TstGt = 0x09,
    TstGe = 0x0A,
    TstLt = 0x0B,
    TstLe = 0x0C,
    TstEq = 0x0D,
    TstNe = 0x0E,
    Jmp = 0x0F,
    Beq = 0x10,
    Bne = 0x11,
    Bra = 0x12,
    Call = 0x13,
    CallI = 0x14,
    Ret = 0x15,
    PushI = 0x16,
    PushIEff = 0x17,
    Pop = 0x18,
    Swap = 0x19,
    PushBp = 0x1A,
    PopBp = 0x1B,
    SpToBp = 0x1C,
    BpToSp = 0x1D,
    AddSp = 0x1E,
    FetchM = 0x1F,
    Sto = 0x20,
    Offset = 0x21,
    Start = 0x22,
    SaveReg = 0x23,
    PushReg = 0x24,
    StrCmp = 0x25,
    ExitOp = 0x26,
    SayOp = 0x27,
    RespondOp = 0x28,
    OpNeg = 0x29,
}

impl Opcode {
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::OpAdd => "OPADD",
            Opcode::OpMul => "OPMUL",
            Opcode::OpSub => "OPSUB",
            Opcode::OpDiv => "OPDIV",
            Opcode::OpMod => "OPMOD",
            Opcode::OpOr => "OPOR",
            Opcode::OpAnd => "OPAND",
            Opcode::OpNot => "OPNOT",
            Opcode::TstGt => "TSTGT",
            Opcode::TstGe => "TSTGE",
            Opcode::TstLt => "TSTLT",
            Opcode::TstLe => "TSTLE",
            Opcode::TstEq => "TSTEQ",
            Opcode::TstNe => "TSTNE",
            Opcode::Jmp => "JMP",
            Opcode::Beq => "BEQ",
            Opcode::Bne => "BNE",
            Opcode::Bra => "BRA",
            Opcode::Call => "CALL",
            Opcode::CallI => "CALLI",
            Opcode::Ret => "RET",
            Opcode::PushI => "PUSHI",
            Opcode::PushIEff => "PUSHI_EFF",
            Opcode::Pop => "POP",
            Opcode::Swap => "SWAP",
            Opcode::PushBp => "PUSHBP",
            Opcode::PopBp => "POPBP",
            Opcode::SpToBp => "SPTOBP",
            Opcode::BpToSp => "BPTOSP",
            Opcode::AddSp => "ADDSP",
            Opcode::FetchM => "FETCHM",
            Opcode::Sto => "STO",
            Opcode::Offset => "OFFSET",
            Opcode::Start => "START",
            Opcode::SaveReg => "SAVE_REG",
            Opcode::PushReg => "PUSH_REG",
            Opcode::StrCmp => "STRCMP",
            Opcode::ExitOp => "EXIT_OP",
            Opcode::SayOp => "SAY_OP",
            Opcode::RespondOp => "RESPOND_OP",
            Opcode::OpNeg => "OPNEG",
        }
    }

    #[must_use]
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        let all = (0x00..=0x29u16).filter_map(|word| Opcode::try_from(word).ok());
        for opcode in all {
            if opcode.mnemonic() == name {
                return Some(opcode);
            }
        }
        None
    }

    #[must_use]
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::Jmp | Opcode::Call => OperandKind::Absolute,
            Opcode::Beq | Opcode::Bne | Opcode::Bra => OperandKind::Relative,
            Opcode::CallI | Opcode::PushI | Opcode::PushIEff => OperandKind::Immediate,
            _ => OperandKind::None,
        }
    }

    #[must_use]
    pub fn has_operand(self) -> bool {
        self.operand_kind() != OperandKind::None
    }

    /// Instruction width in code words.
    #[must_use]
    pub fn width(self) -> u16 {
        if self.has_operand() { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_round_trip() {
        for word in 0x00..=0x29u16 {
            let opcode = Opcode::try_from(word).unwrap();
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(opcode));
            assert_eq!(u16::from(opcode), word);
        }
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert!(Opcode::try_from(0x2Au16).is_err());
        assert!(Opcode::try_from(0xFFFFu16).is_err());
    }

    #[test]
    fn operand_classes() {
        assert_eq!(Opcode::Jmp.operand_kind(), OperandKind::Absolute);
        assert_eq!(Opcode::Beq.operand_kind(), OperandKind::Relative);
        assert_eq!(Opcode::PushI.operand_kind(), OperandKind::Immediate);
        assert_eq!(Opcode::Ret.operand_kind(), OperandKind::None);
        assert_eq!(Opcode::PushIEff.width(), 2);
        assert_eq!(Opcode::Swap.width(), 1);
    }
}
