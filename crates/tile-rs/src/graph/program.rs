use std::fmt;

use super::{ComputeSetId, Tensor};
use crate::error::{TileError, TileResult};

/// Control program executed against the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    Sequence(Sequence),
    Copy {
        src: Tensor,
        dst: Tensor,
    },
    Execute {
        compute_set: ComputeSetId,
        debug_name: String,
    },
}

impl Program {
    /// Copy between two views of identical element type and shape.
    pub fn copy(src: &Tensor, dst: &Tensor) -> TileResult<Program> {
        if src.element_type() != dst.element_type() || src.shape() != dst.shape() {
            return Err(TileError::invalid_view(format!(
                "copy from {:?} {:?} to {:?} {:?}",
                src.element_type(),
                src.shape(),
                dst.element_type(),
                dst.shape()
            )));
        }
        Ok(Program::Copy {
            src: src.clone(),
            dst: dst.clone(),
        })
    }

    pub fn execute(compute_set: ComputeSetId, debug_name: impl Into<String>) -> Program {
        Program::Execute {
            compute_set,
            debug_name: debug_name.into(),
        }
    }

    /// Visits every leaf step in execution order.
    pub fn visit<F: FnMut(&Program)>(&self, f: &mut F) {
        match self {
            Program::Sequence(seq) => {
                for program in &seq.programs {
                    program.visit(f);
                }
            }
            leaf => f(leaf),
        }
    }

    pub fn count_copies(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |p| {
            if matches!(p, Program::Copy { .. }) {
                count += 1;
            }
        });
        count
    }

    pub fn count_executes(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |p| {
            if matches!(p, Program::Execute { .. }) {
                count += 1;
            }
        });
        count
    }
}

/// Ordered list of programs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    programs: Vec<Program>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, program: impl Into<Program>) {
        match program.into() {
            // Flatten nested sequences so fragments appended by primitives stay readable.
            Program::Sequence(inner) => self.programs.extend(inner.programs),
            other => self.programs.push(other),
        }
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl From<Sequence> for Program {
    fn from(seq: Sequence) -> Self {
        Program::Sequence(seq)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_program(self, 0, f)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_sequence(self, 0, f)
    }
}

fn fmt_sequence(seq: &Sequence, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_line(f, indent, "sequence {")?;
    for program in &seq.programs {
        fmt_program(program, indent + 1, f)?;
    }
    write_line(f, indent, "}")
}

fn fmt_program(program: &Program, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match program {
        Program::Sequence(seq) => fmt_sequence(seq, indent, f),
        Program::Copy { src, dst } => write_line(
            f,
            indent,
            &format!(
                "copy {} {:?} {} -> {}",
                src.element_type(),
                src.shape(),
                fmt_intervals(src),
                fmt_intervals(dst)
            ),
        ),
        Program::Execute {
            compute_set,
            debug_name,
        } => write_line(
            f,
            indent,
            &format!("execute cs{} \"{debug_name}\"", compute_set.0),
        ),
    }
}

fn fmt_intervals(tensor: &Tensor) -> String {
    let parts: Vec<String> = tensor
        .intervals()
        .iter()
        .map(|iv| format!("%{}[{}..{}]", iv.variable.0, iv.begin, iv.end))
        .collect();
    parts.join(",")
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}
