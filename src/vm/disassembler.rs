//! Code segment listing for debug output.

use std::ops::Range;

use crate::runtime::Value;

use super::instruction::{Instruction, Mode, Opcode, Operand};
use super::segment::{CodeSegment, DataSegment};

/// Disassemble the whole code segment to a human-readable string.
pub fn disassemble(code: &CodeSegment, data: &DataSegment) -> String {
    disassemble_range(code, data, 0..code.len())
}

/// Disassemble the instructions in `range`, one line each. Words that fail
/// to decode are listed raw instead of aborting the listing.
pub fn disassemble_range(code: &CodeSegment, data: &DataSegment, range: Range<usize>) -> String {
    let mut out = String::new();
    for ip in range.start..range.end.min(code.len()) {
        out.push_str(&format!("{:04} ", ip));
        match code.fetch(ip) {
            Some(Ok(instruction)) => {
                out.push_str(&instruction.to_string());
                annotate(ip, &instruction, data, &mut out);
            }
            Some(Err(err)) => {
                let word = code.word(ip).unwrap_or_default();
                out.push_str(&format!("<{}> {:#018x}", err, word));
            }
            None => break,
        }
        out.push('\n');
    }
    out
}

fn annotate(ip: usize, instruction: &Instruction, data: &DataSegment, out: &mut String) {
    let mut notes = Vec::new();
    for operand in [instruction.a, instruction.b, instruction.c] {
        if let Some(note) = constant_note(operand, data) {
            notes.push(note);
        }
    }

    let target = |operand: Operand| ip as i64 + 1 + operand.address as i64;
    match instruction.opcode {
        Opcode::Jump | Opcode::JumpIfFalse => notes.push(format!("-> {:04}", target(instruction.a))),
        Opcode::Spawn => {
            notes.push(format!("cont {:04}", target(instruction.a)));
            notes.push(format!("exit {:04}", target(instruction.b)));
        }
        Opcode::Resume => notes.push(format!("exit {:04}", target(instruction.b))),
        Opcode::MakeFunction => notes.push(format!("entry {:04}", target(instruction.a))),
        _ => {}
    }

    if !notes.is_empty() {
        out.push_str("  ; ");
        out.push_str(&notes.join(", "));
    }
}

fn constant_note(operand: Operand, data: &DataSegment) -> Option<String> {
    if !matches!(operand.mode, Mode::Data | Mode::Global) || operand.address < 0 {
        return None;
    }
    let value = data.get(operand.address as usize)?;
    let text = match (operand.mode, value) {
        (Mode::Global, Value::String(name)) => name.to_string(),
        (_, Value::String(s)) => format!("{:?}", s.as_ref()),
        _ => value.to_string(),
    };
    Some(format!("{} = {}", operand, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constants_and_targets_are_annotated() {
        let mut code = CodeSegment::new();
        let mut data = DataSegment::new();
        let name = data.add_string("x");
        let greeting = data.add_string("hi");
        let store = Instruction::new(
            Opcode::Move,
            Operand::global(name).unwrap(),
            Operand::data(greeting).unwrap(),
            Operand::NONE,
        );
        let back = Instruction::new(
            Opcode::Jump,
            Operand::immediate(-2, "jump offset").unwrap(),
            Operand::NONE,
            Operand::NONE,
        );
        code.emit(store);
        code.emit(back);

        let expected = format!(
            "0000 {}  ; global[0] = x, data[1] = \"hi\"\n0001 {}  ; -> 0000\n",
            store, back
        );
        assert_eq!(disassemble(&code, &data), expected);
    }

    #[test]
    fn test_bad_words_are_listed_raw() {
        let code = CodeSegment::from_words(vec![u64::MAX]);
        assert_eq!(
            disassemble(&code, &DataSegment::new()),
            "0000 <unknown opcode 127> 0xffffffffffffffff\n"
        );
    }

    #[test]
    fn test_range_is_clamped() {
        let mut code = CodeSegment::new();
        code.emit(Instruction::bare(Opcode::Pop));
        code.emit(Instruction::bare(Opcode::IterEnd));
        let listing = disassemble_range(&code, &DataSegment::new(), 1..10);
        assert_eq!(listing, format!("0001 {}\n", Instruction::bare(Opcode::IterEnd)));
    }
}
