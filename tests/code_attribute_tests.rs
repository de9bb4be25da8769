use tolc_codewriter::codegen::constpool::Constant;
use tolc_codewriter::codegen::opcodes::*;
use tolc_codewriter::codegen::{ConstantPool, LineNumberEntry, LocalVarEntry, MethodCode};
use tolc_codewriter::Error;

mod common;
use common::*;

/// Reads a `Code` attribute back the way a class file reader would
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u2(&mut self) -> u16 {
        let v = u16::from_be_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u4(&mut self) -> u32 {
        let v = u32::from_be_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        slice
    }
}

fn utf8_at(pool: &ConstantPool, index: u16) -> String {
    match pool.get(index).unwrap() {
        Constant::Utf8(value) => value.clone(),
        other => panic!("expected utf8 at {}, found {:?}", index, other),
    }
}

/// Method with a far forward branch and every side table populated
fn far_method_with_tables(pool: &mut ConstantPool) -> MethodCode {
    let mut mw = static_writer(pool, "(I)V");
    let (start, mid, far, end, handler) =
        (mw.new_label(), mw.new_label(), mw.new_label(), mw.new_label(), mw.new_label());
    mw.place_label(start).unwrap();
    mw.add_line_number(10, start).unwrap();
    mw.emit_var_insn(ILOAD, 0).unwrap();
    mw.emit_jump(IFEQ, far).unwrap();
    mw.place_label(mid).unwrap();
    mw.add_line_number(11, mid).unwrap();
    pad_to(&mut mw, 40_002);
    mw.place_label(far).unwrap();
    mw.add_line_number(12, far).unwrap();
    mw.emit_insn(RETURN).unwrap();
    mw.place_label(end).unwrap();
    mw.place_label(handler).unwrap();
    mw.emit_insn(ATHROW).unwrap();

    mw.add_local_variable("x", "I", None, start, end, 0).unwrap();
    mw.add_local_variable(
        "names",
        "Ljava/util/List;",
        Some("Ljava/util/List<Ljava/lang/String;>;"),
        mid,
        end,
        1,
    )
    .unwrap();
    mw.add_exception_handler(mid, far, handler, None).unwrap();
    mw.finish().unwrap()
}

/// Code attribute tests
///
/// Side tables recorded against pre-resize offsets must follow the code when
/// the resizer moves it, and the serialized attribute must parse back.
#[cfg(test)]
mod code_attribute_tests {
    use super::*;

    #[test]
    fn test_side_tables_follow_resize() {
        init_logging();
        let mut pool = ConstantPool::new();
        let code = far_method_with_tables(&mut pool);

        assert_eq!(code.resizes.len(), 1);
        assert_eq!(
            code.line_numbers,
            vec![
                LineNumberEntry { start_pc: 0, line_number: 10 },
                LineNumberEntry { start_pc: 9, line_number: 11 },
                LineNumberEntry { start_pc: 40_007, line_number: 12 },
            ]
        );

        let x = code.local_variables[0];
        assert_eq!((x.start_pc, x.length, x.index), (0, 40_008, 0));
        let names = code.local_variables[1];
        assert_eq!((names.start_pc, names.length, names.index), (9, 39_999, 1));
        assert_eq!(code.local_variable_types.len(), 1);
        let generic: LocalVarEntry = code.local_variable_types[0];
        assert_eq!(generic.start_pc, 9);
        assert_eq!(generic.name_index, names.name_index);
        assert_eq!(utf8_at(&pool, generic.descriptor_index), "Ljava/util/List<Ljava/lang/String;>;");

        let entry = code.exception_table[0];
        assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc, entry.catch_type), (9, 40_007, 40_008, 0));
        assert_eq!(code.code[40_008], ATHROW);
        assert_eq!(code.max_locals, 1);
    }

    #[test]
    fn test_code_attribute_layout() {
        let mut pool = ConstantPool::new();
        let code = far_method_with_tables(&mut pool);
        let bytes = code.to_code_attribute(&mut pool).unwrap();

        let mut r = Reader { bytes: &bytes, pos: 0 };
        assert_eq!(utf8_at(&pool, r.u2()), "Code");
        assert_eq!(r.u4() as usize, bytes.len() - 6);
        assert_eq!(r.u2(), code.max_stack);
        assert_eq!(r.u2(), code.max_locals);
        let code_length = r.u4() as usize;
        assert_eq!(r.take(code_length), &code.code[..]);
        assert_eq!(r.u2(), 1);
        assert_eq!(r.take(8), &code.exception_table[0].to_bytes()[..]);

        let mut names = Vec::new();
        let mut first_starts = Vec::new();
        for _ in 0..r.u2() {
            let name = utf8_at(&pool, r.u2());
            let len = r.u4() as usize;
            let mut body = Reader { bytes: r.take(len), pos: 0 };
            let rows = body.u2() as usize;
            let row_size = if name == "LineNumberTable" { 4 } else { 10 };
            assert_eq!(len, 2 + rows * row_size, "{}", name);
            first_starts.push(body.u2());
            names.push(name);
        }
        assert_eq!(names, vec!["LineNumberTable", "LocalVariableTable", "LocalVariableTypeTable"]);
        assert_eq!(first_starts, vec![0, 0, 9]);
        assert_eq!(r.pos, bytes.len());
    }

    #[test]
    fn test_empty_side_tables_are_omitted() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "()V");
        mw.emit_insn(RETURN).unwrap();
        let code = mw.finish().unwrap();
        let bytes = code.to_code_attribute(&mut pool).unwrap();
        // name, length, maxs, code length, code, no handlers, no attributes
        assert_eq!(bytes.len(), 2 + 4 + 4 + 4 + 1 + 2 + 2);
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_side_tables_need_placed_labels() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "()V");
        let (placed, pending) = (mw.new_label(), mw.new_label());
        mw.place_label(placed).unwrap();
        assert!(matches!(mw.add_line_number(3, pending), Err(Error::UnresolvedLabel { .. })));
        assert!(matches!(
            mw.add_local_variable("v", "I", None, placed, pending, 0),
            Err(Error::UnresolvedLabel { .. })
        ));
        mw.add_exception_handler(placed, placed, pending, Some("java/lang/Throwable")).unwrap();
        mw.emit_insn(RETURN).unwrap();
        assert!(matches!(mw.finish(), Err(Error::UnresolvedLabel { .. })));
    }

    #[test]
    fn test_oversized_code_rejected() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "()V");
        pad_to(&mut mw, 70_000);
        mw.emit_insn(RETURN).unwrap();
        let code = mw.finish().unwrap();
        assert!(matches!(
            code.to_code_attribute(&mut pool),
            Err(Error::CodeTooLarge { length: 70_001 })
        ));
    }
}
