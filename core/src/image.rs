//! The image module turns a text program image into data preload values and
//! an instruction table. The format is deliberately minimal: this is a
//! loader for hand-written or generated images, not a general assembler.

use thiserror::Error;

use crate::instruction::{Instruction, Opcode};
use crate::memory::Word;

const BEGIN_DATA: &str = "Begin Data Section";
const END_DATA: &str = "End Data Section";
const BEGIN_INSTR: &str = "Begin Instruction Section";
const END_INSTR: &str = "End Instruction Section";

/// Everything that can go wrong while parsing an image.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("line {line}: expected a section marker before any content")]
    MissingSectionMarker { line: usize },
    #[error("line {line}: \"{marker}\" has no matching close before end of file")]
    UnclosedSection { line: usize, marker: &'static str },
    #[error("line {line}: \"{marker}\" does not close any open section")]
    UnmatchedClose { line: usize, marker: &'static str },
    #[error("line {line}: a new section cannot start inside an already-open section")]
    NestedSection { line: usize },
    #[error("line {line}: malformed data entry {text:?}")]
    MalformedData { line: usize, text: String },
    #[error("line {line}: malformed instruction entry {text:?}")]
    MalformedInstruction { line: usize, text: String },
    #[error("line {line}: unknown opcode {mnemonic:?}")]
    UnknownOpcode { line: usize, mnemonic: String },
    #[error("line {line}: {mnemonic} takes {expected} operand(s), found {found}")]
    WrongOperandCount {
        line: usize,
        mnemonic: String,
        expected: u8,
        found: u8,
    },
    #[error("line {line}: index {index} is negative")]
    NegativeIndex { line: usize, index: i64 },
}

/// The result of parsing an image: data preload values and the instruction
/// table, both dense and zero/hole-filled up to the highest index seen.
#[derive(Debug, Clone, Default)]
pub struct Image {
    /// `(address, value)` pairs from the data section, in file order. The
    /// caller applies these to memory after construction; the image itself
    /// does not know the machine's memory size.
    pub data: Vec<(Word, Word)>,
    /// Dense instruction table, indexed by PC. Unfilled slots are holes
    /// (see [`Instruction::is_hole`]).
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Data,
    Instructions,
}

/// Parse a full image from its text form (§4.6/§6). Blank lines and lines
/// starting with `#` are ignored everywhere; `#` also starts a trailing
/// comment on a content line. Section markers are case-sensitive exact
/// matches and must be properly paired.
pub fn parse(text: &str) -> Result<Image, ImageError> {
    let mut section: Option<(Section, usize)> = None;
    let mut data = Vec::new();
    let mut sparse_instructions: Vec<(usize, Instruction)> = Vec::new();
    let mut max_instruction_index: Option<usize> = None;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        match line {
            BEGIN_DATA | BEGIN_INSTR => {
                if section.is_some() {
                    return Err(ImageError::NestedSection { line: line_no });
                }
                let kind = if line == BEGIN_DATA { Section::Data } else { Section::Instructions };
                section = Some((kind, line_no));
                continue;
            }
            END_DATA => {
                close_section(&mut section, Section::Data, END_DATA, line_no)?;
                continue;
            }
            END_INSTR => {
                close_section(&mut section, Section::Instructions, END_INSTR, line_no)?;
                continue;
            }
            _ => {}
        }

        match section {
            None => return Err(ImageError::MissingSectionMarker { line: line_no }),
            Some((Section::Data, _)) => {
                let (index, value) = parse_data_line(line, line_no)?;
                data.push((index, value));
            }
            Some((Section::Instructions, _)) => {
                let (index, instr) = parse_instruction_line(line, line_no)?;
                warn_on_index_shape(index, max_instruction_index, line_no);
                if sparse_instructions.iter().any(|(i, _)| *i == index) {
                    log::warn!("line {}: instruction index {} is a duplicate; the later entry wins", line_no, index);
                    sparse_instructions.retain(|(i, _)| *i != index);
                }
                max_instruction_index = Some(max_instruction_index.map_or(index, |m| m.max(index)));
                sparse_instructions.push((index, instr));
            }
        }
    }

    if let Some((kind, opened_at)) = section {
        let marker = match kind {
            Section::Data => BEGIN_DATA,
            Section::Instructions => BEGIN_INSTR,
        };
        return Err(ImageError::UnclosedSection { line: opened_at, marker });
    }

    let instructions = densify(sparse_instructions, max_instruction_index);
    Ok(Image { data, instructions })
}

fn close_section(
    section: &mut Option<(Section, usize)>,
    expected: Section,
    marker: &'static str,
    line_no: usize,
) -> Result<(), ImageError> {
    match *section {
        Some((kind, _)) if kind == expected => {
            *section = None;
            Ok(())
        }
        _ => Err(ImageError::UnmatchedClose { line: line_no, marker }),
    }
}

fn warn_on_index_shape(index: usize, max_instruction_index: Option<usize>, line_no: usize) {
    match max_instruction_index {
        Some(prev_max) if index < prev_max => {
            log::warn!(
                "line {}: instruction index {} is out of sequence (previous max was {})",
                line_no,
                index,
                prev_max
            );
        }
        Some(prev_max) if index > prev_max + 1 => {
            log::warn!(
                "line {}: instruction index {} leaves a gap after {}; the skipped slots become holes",
                line_no,
                index,
                prev_max
            );
        }
        None if index > 0 => {
            log::warn!(
                "line {}: instruction table does not start at index 0 ({} slots before it become holes)",
                line_no,
                index
            );
        }
        _ => {}
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Data lines look like `17 42` (index, value) or `17, 42`.
fn parse_data_line(line: &str, line_no: usize) -> Result<(Word, Word), ImageError> {
    let tokens: Vec<&str> = split_tokens(line);
    if tokens.len() != 2 {
        return Err(ImageError::MalformedData {
            line: line_no,
            text: line.to_string(),
        });
    }
    let index = parse_index(tokens[0], line_no)?;
    let value: Word = tokens[1].parse().map_err(|_| ImageError::MalformedData {
        line: line_no,
        text: line.to_string(),
    })?;
    Ok((index, value))
}

/// Instruction lines look like `3 SET 10 1001` or `3 SYSCALL PRN 1`: an
/// index, a mnemonic, and the operands the opcode takes, comma- or
/// space-separated.
fn parse_instruction_line(line: &str, line_no: usize) -> Result<(usize, Instruction), ImageError> {
    let tokens: Vec<&str> = split_tokens(line);
    let mut it = tokens.iter();
    let index_tok = it.next().ok_or_else(|| ImageError::MalformedInstruction {
        line: line_no,
        text: line.to_string(),
    })?;
    let index = parse_index(index_tok, line_no)?;

    let mnemonic_tok = it.next().ok_or_else(|| ImageError::MalformedInstruction {
        line: line_no,
        text: line.to_string(),
    })?;

    let (opcode, rest_tokens): (Opcode, Vec<&str>) = if mnemonic_tok.eq_ignore_ascii_case("SYSCALL") {
        let subtype = it.next().ok_or_else(|| ImageError::MalformedInstruction {
            line: line_no,
            text: line.to_string(),
        })?;
        let opcode = match subtype.to_ascii_uppercase().as_str() {
            "PRN" => Opcode::SyscallPrn,
            "HLT" => Opcode::SyscallHlt,
            "YIELD" => Opcode::SyscallYield,
            _ => {
                return Err(ImageError::UnknownOpcode {
                    line: line_no,
                    mnemonic: format!("SYSCALL {}", subtype),
                })
            }
        };
        (opcode, it.copied().collect())
    } else {
        let opcode = Opcode::from_mnemonic(mnemonic_tok).ok_or_else(|| ImageError::UnknownOpcode {
            line: line_no,
            mnemonic: mnemonic_tok.to_string(),
        })?;
        (opcode, it.copied().collect())
    };

    let expected = opcode.operand_count();
    if rest_tokens.len() as u8 != expected {
        return Err(ImageError::WrongOperandCount {
            line: line_no,
            mnemonic: mnemonic_tok.to_string(),
            expected,
            found: rest_tokens.len() as u8,
        });
    }
    let mut operands = [0 as Word; 2];
    for (slot, tok) in operands.iter_mut().zip(rest_tokens.iter()) {
        *slot = tok.parse().map_err(|_| ImageError::MalformedInstruction {
            line: line_no,
            text: line.to_string(),
        })?;
    }

    let instr = Instruction::new(opcode, operands[0], operands[1], expected, line.to_string());
    Ok((index as usize, instr))
}

fn parse_index(tok: &str, line_no: usize) -> Result<Word, ImageError> {
    let index: i64 = tok.parse().map_err(|_| ImageError::MalformedInstruction {
        line: line_no,
        text: tok.to_string(),
    })?;
    if index < 0 {
        return Err(ImageError::NegativeIndex { line: line_no, index });
    }
    Ok(index)
}

/// Split on commas and/or whitespace, dropping empty tokens, so either
/// `SET 10, 1001` or `SET 10 1001` parses the same way.
fn split_tokens(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

fn densify(sparse: Vec<(usize, Instruction)>, max_index: Option<usize>) -> Vec<Instruction> {
    let len = max_index.map_or(0, |m| m + 1);
    let mut table: Vec<Instruction> = (0..len).map(|_| Instruction::default()).collect();
    for (index, instr) in sparse {
        table[index] = instr;
    }
    table
}
