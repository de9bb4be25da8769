//! JVM opcode constants and the fixed per-opcode tables the method writer relies on
//!
//! Values follow the Java Virtual Machine Specification, chapter 6. Two
//! compile-time tables are derived from them: the net operand-stack effect of
//! every opcode whose effect does not depend on its operand, and the operand
//! family of every opcode, which fixes its encoded width.

// Constants
pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0a;
pub const FCONST_0: u8 = 0x0b;
pub const FCONST_1: u8 = 0x0c;
pub const FCONST_2: u8 = 0x0d;
pub const DCONST_0: u8 = 0x0e;
pub const DCONST_1: u8 = 0x0f;

// Literal pushes and constant pool loads
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

// Loads
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const ILOAD_1: u8 = 0x1b;
pub const ILOAD_2: u8 = 0x1c;
pub const ILOAD_3: u8 = 0x1d;
pub const LLOAD_0: u8 = 0x1e;
pub const LLOAD_1: u8 = 0x1f;
pub const LLOAD_2: u8 = 0x20;
pub const LLOAD_3: u8 = 0x21;
pub const FLOAD_0: u8 = 0x22;
pub const FLOAD_1: u8 = 0x23;
pub const FLOAD_2: u8 = 0x24;
pub const FLOAD_3: u8 = 0x25;
pub const DLOAD_0: u8 = 0x26;
pub const DLOAD_1: u8 = 0x27;
pub const DLOAD_2: u8 = 0x28;
pub const DLOAD_3: u8 = 0x29;
pub const ALOAD_0: u8 = 0x2a;
pub const ALOAD_1: u8 = 0x2b;
pub const ALOAD_2: u8 = 0x2c;
pub const ALOAD_3: u8 = 0x2d;
pub const IALOAD: u8 = 0x2e;
pub const LALOAD: u8 = 0x2f;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;

// Stores
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const ISTORE_1: u8 = 0x3c;
pub const ISTORE_2: u8 = 0x3d;
pub const ISTORE_3: u8 = 0x3e;
pub const LSTORE_0: u8 = 0x3f;
pub const LSTORE_1: u8 = 0x40;
pub const LSTORE_2: u8 = 0x41;
pub const LSTORE_3: u8 = 0x42;
pub const FSTORE_0: u8 = 0x43;
pub const FSTORE_1: u8 = 0x44;
pub const FSTORE_2: u8 = 0x45;
pub const FSTORE_3: u8 = 0x46;
pub const DSTORE_0: u8 = 0x47;
pub const DSTORE_1: u8 = 0x48;
pub const DSTORE_2: u8 = 0x49;
pub const DSTORE_3: u8 = 0x4a;
pub const ASTORE_0: u8 = 0x4b;
pub const ASTORE_1: u8 = 0x4c;
pub const ASTORE_2: u8 = 0x4d;
pub const ASTORE_3: u8 = 0x4e;
pub const IASTORE: u8 = 0x4f;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;

// Stack manipulation
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X1: u8 = 0x5d;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;

// Arithmetic
pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6a;
pub const DMUL: u8 = 0x6b;
pub const IDIV: u8 = 0x6c;
pub const LDIV: u8 = 0x6d;
pub const FDIV: u8 = 0x6e;
pub const DDIV: u8 = 0x6f;
pub const IREM: u8 = 0x70;
pub const LREM: u8 = 0x71;
pub const FREM: u8 = 0x72;
pub const DREM: u8 = 0x73;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;

// Shifts, bitwise and local increment
pub const ISHL: u8 = 0x78;
pub const LSHL: u8 = 0x79;
pub const ISHR: u8 = 0x7a;
pub const LSHR: u8 = 0x7b;
pub const IUSHR: u8 = 0x7c;
pub const LUSHR: u8 = 0x7d;
pub const IAND: u8 = 0x7e;
pub const LAND: u8 = 0x7f;
pub const IOR: u8 = 0x80;
pub const LOR: u8 = 0x81;
pub const IXOR: u8 = 0x82;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;

// Conversions
pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8a;
pub const F2I: u8 = 0x8b;
pub const F2L: u8 = 0x8c;
pub const F2D: u8 = 0x8d;
pub const D2I: u8 = 0x8e;
pub const D2L: u8 = 0x8f;
pub const D2F: u8 = 0x90;
pub const I2B: u8 = 0x91;
pub const I2C: u8 = 0x92;
pub const I2S: u8 = 0x93;

// Comparisons
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;

// Control flow
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;

// Fields, invocation and objects
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;

// Extended
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Mnemonics indexed by opcode, for `0x00..=0xc9`
const MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3",
    "iconst_4", "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2",
    "dconst_0", "dconst_1", "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload",
    "fload", "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1",
    "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1",
    "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload",
    "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore", "fstore",
    "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1",
    "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0",
    "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2", "astore_3",
    "iastore", "lastore", "fastore", "dastore", "aastore", "bastore", "castore", "sastore",
    "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap", "iadd",
    "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul", "fmul", "dmul",
    "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg", "lneg", "fneg",
    "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land", "ior", "lor",
    "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l", "f2d",
    "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg",
    "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne", "if_icmplt",
    "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto", "jsr", "ret",
    "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn", "areturn",
    "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual",
    "invokespecial", "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray",
    "anewarray", "arraylength", "athrow", "checkcast", "instanceof", "monitorenter",
    "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

/// Textual mnemonic of an opcode, `"<invalid>"` outside the defined range
pub fn mnemonic(op: u8) -> &'static str {
    MNEMONICS.get(op as usize).copied().unwrap_or("<invalid>")
}

/// Operand family of an opcode. The family alone determines how many bytes
/// the instruction occupies (switches and `wide` aside), which is all the
/// resizer needs to walk a code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnKind {
    /// No operand bytes
    NoArg,
    /// `iload_0`..`astore_3`: local slot folded into the opcode
    ImplicitVar,
    /// Signed byte operand (`bipush`) or array type code (`newarray`)
    Byte,
    /// Signed short operand (`sipush`)
    Short,
    /// One-byte local slot (`iload`, `ret`, ...)
    Var,
    /// One-byte constant pool index (`ldc`)
    Ldc,
    /// Two-byte constant pool index (`ldc_w`, `ldc2_w`)
    LdcWide,
    /// Two-byte pool index of a type (`new`, `checkcast`, ...)
    Type,
    /// Two-byte pool index of a field or method
    Member,
    /// `invokeinterface`: pool index, count and a zero byte
    InterfaceMember,
    /// `invokedynamic`: pool index and two zero bytes
    Dynamic,
    /// `iinc`: slot and signed byte
    Iinc,
    /// Branch with a signed 16-bit offset
    Jump,
    /// Branch with a signed 32-bit offset
    JumpWide,
    TableSwitch,
    LookupSwitch,
    /// `wide` prefix
    Wide,
    /// `multianewarray`: pool index and dimension count
    MultiANewArray,
    Invalid,
}

impl InsnKind {
    /// Encoded size for families of fixed width
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            InsnKind::NoArg | InsnKind::ImplicitVar => Some(1),
            InsnKind::Byte | InsnKind::Var | InsnKind::Ldc => Some(2),
            InsnKind::Short
            | InsnKind::LdcWide
            | InsnKind::Type
            | InsnKind::Member
            | InsnKind::Iinc
            | InsnKind::Jump => Some(3),
            InsnKind::MultiANewArray => Some(4),
            InsnKind::InterfaceMember | InsnKind::Dynamic | InsnKind::JumpWide => Some(5),
            InsnKind::TableSwitch | InsnKind::LookupSwitch | InsnKind::Wide | InsnKind::Invalid => None,
        }
    }
}

const fn kind_of(op: u8) -> InsnKind {
    match op {
        NOP..=DCONST_1 => InsnKind::NoArg,
        BIPUSH => InsnKind::Byte,
        SIPUSH => InsnKind::Short,
        LDC => InsnKind::Ldc,
        LDC_W | LDC2_W => InsnKind::LdcWide,
        ILOAD..=ALOAD => InsnKind::Var,
        ILOAD_0..=ALOAD_3 => InsnKind::ImplicitVar,
        IALOAD..=SALOAD => InsnKind::NoArg,
        ISTORE..=ASTORE => InsnKind::Var,
        ISTORE_0..=ASTORE_3 => InsnKind::ImplicitVar,
        IASTORE..=LXOR => InsnKind::NoArg,
        IINC => InsnKind::Iinc,
        I2L..=DCMPG => InsnKind::NoArg,
        IFEQ..=JSR => InsnKind::Jump,
        RET => InsnKind::Var,
        TABLESWITCH => InsnKind::TableSwitch,
        LOOKUPSWITCH => InsnKind::LookupSwitch,
        IRETURN..=RETURN => InsnKind::NoArg,
        GETSTATIC..=INVOKESTATIC => InsnKind::Member,
        INVOKEINTERFACE => InsnKind::InterfaceMember,
        INVOKEDYNAMIC => InsnKind::Dynamic,
        NEW => InsnKind::Type,
        NEWARRAY => InsnKind::Byte,
        ANEWARRAY => InsnKind::Type,
        ARRAYLENGTH | ATHROW => InsnKind::NoArg,
        CHECKCAST | INSTANCEOF => InsnKind::Type,
        MONITORENTER | MONITOREXIT => InsnKind::NoArg,
        WIDE => InsnKind::Wide,
        MULTIANEWARRAY => InsnKind::MultiANewArray,
        IFNULL | IFNONNULL => InsnKind::Jump,
        GOTO_W | JSR_W => InsnKind::JumpWide,
        _ => InsnKind::Invalid,
    }
}

const fn build_kinds() -> [InsnKind; 256] {
    let mut table = [InsnKind::Invalid; 256];
    let mut op = 0;
    while op < 256 {
        table[op] = kind_of(op as u8);
        op += 1;
    }
    table
}

/// Operand family of every opcode
pub const INSN_KINDS: [InsnKind; 256] = build_kinds();

/// Family of `op`
pub fn kind(op: u8) -> InsnKind {
    INSN_KINDS[op as usize]
}

// Net stack effect in words. Field access, invocation and `multianewarray`
// depend on their operand and are left at zero here; the writer computes
// them from the descriptor.
const fn effect_of(op: u8) -> i8 {
    match op {
        ACONST_NULL..=ICONST_5 => 1,
        LCONST_0 | LCONST_1 => 2,
        FCONST_0..=FCONST_2 => 1,
        DCONST_0 | DCONST_1 => 2,
        BIPUSH | SIPUSH | LDC | LDC_W => 1,
        LDC2_W => 2,
        ILOAD | FLOAD | ALOAD => 1,
        LLOAD | DLOAD => 2,
        ILOAD_0..=ILOAD_3 | FLOAD_0..=FLOAD_3 | ALOAD_0..=ALOAD_3 => 1,
        LLOAD_0..=LLOAD_3 | DLOAD_0..=DLOAD_3 => 2,
        LALOAD | DALOAD => 0,
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => -1,
        ISTORE | FSTORE | ASTORE => -1,
        LSTORE | DSTORE => -2,
        ISTORE_0..=ISTORE_3 | FSTORE_0..=FSTORE_3 | ASTORE_0..=ASTORE_3 => -1,
        LSTORE_0..=LSTORE_3 | DSTORE_0..=DSTORE_3 => -2,
        LASTORE | DASTORE => -4,
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => -3,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        SWAP => 0,
        // binary arithmetic alternates int, long, float, double
        IADD..=DREM => {
            if (op - IADD) % 2 == 0 {
                -1
            } else {
                -2
            }
        }
        INEG..=DNEG => 0,
        ISHL..=LUSHR => -1,
        IAND | IOR | IXOR => -1,
        LAND | LOR | LXOR => -2,
        IINC => 0,
        I2L | I2D | F2L | F2D => 1,
        L2I | L2F | D2I | D2F => -1,
        I2F | L2D | F2I | D2L | I2B | I2C | I2S => 0,
        LCMP | DCMPL | DCMPG => -3,
        FCMPL | FCMPG => -1,
        IFEQ..=IFLE => -1,
        IF_ICMPEQ..=IF_ACMPNE => -2,
        GOTO | RET => 0,
        JSR | JSR_W => 1,
        TABLESWITCH | LOOKUPSWITCH => -1,
        IRETURN | FRETURN | ARETURN => -1,
        LRETURN | DRETURN => -2,
        RETURN => 0,
        NEW => 1,
        NEWARRAY | ANEWARRAY | ARRAYLENGTH | ATHROW | CHECKCAST | INSTANCEOF => 0,
        MONITORENTER | MONITOREXIT => -1,
        IFNULL | IFNONNULL => -1,
        _ => 0,
    }
}

const fn build_effects() -> [i8; 256] {
    let mut table = [0i8; 256];
    let mut op = 0;
    while op < 256 {
        table[op] = effect_of(op as u8);
        op += 1;
    }
    table
}

/// Fixed operand-stack effect of every opcode
pub const STACK_EFFECTS: [i8; 256] = build_effects();

/// Stack effect of `op` as an `i32`
pub fn stack_effect(op: u8) -> i32 {
    STACK_EFFECTS[op as usize] as i32
}

/// Opcodes after which control never falls through to the next instruction
pub fn is_block_terminator(op: u8) -> bool {
    matches!(
        op,
        IRETURN..=RETURN | ATHROW | RET | GOTO | GOTO_W | TABLESWITCH | LOOKUPSWITCH
    )
}

/// Conditional branches, i.e. 16-bit branches other than `goto` and `jsr`
pub fn is_conditional(op: u8) -> bool {
    matches!(op, IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL)
}

/// Branch with the opposite condition, used when a conditional is rewritten
/// to jump over a `goto_w`
pub fn negate(op: u8) -> Option<u8> {
    let negated = match op {
        IFNULL => IFNONNULL,
        IFNONNULL => IFNULL,
        // ifeq/ifne, iflt/ifge, ... come in pairs starting at an odd opcode
        IFEQ..=IF_ACMPNE => ((op + 1) ^ 1) - 1,
        _ => return None,
    };
    Some(negated)
}

/// Long form of an unconditional 16-bit branch
pub fn widen_unconditional(op: u8) -> Option<u8> {
    match op {
        GOTO => Some(GOTO_W),
        JSR => Some(JSR_W),
        _ => None,
    }
}

/// Words occupied by values loaded or stored through a base load/store opcode
pub fn var_slot_size(op: u8) -> u32 {
    match op {
        LLOAD | DLOAD | LSTORE | DSTORE => 2,
        _ => 1,
    }
}
