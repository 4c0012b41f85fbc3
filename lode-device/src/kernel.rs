//! Kernel program format of the host device.
//!
//! The planner hands the scan an opaque source blob; the host device reads it
//! as UTF-8 text, one conjunctive predicate per line:
//!
//! ```text
//! # qualifying rows satisfy every line
//! col 1 gt i64:42
//! col 3 le f64:0.5
//! ```
//!
//! Blank lines and `#` comments are ignored. Parse failures produce a build
//! log naming each offending line, surfaced through `Error::DeviceBuild`.

use std::fmt::Write as _;
use std::sync::Arc;

use arrow::buffer::BooleanBuffer;
use lode_result::{Error, Result};
use lode_types::{CellValue, ColumnOrdinal, cell_width};

use crate::{KernelColumn, KernelInput};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
}

impl CmpOp {
    fn parse(token: &str) -> Option<CmpOp> {
        match token {
            "ge" => Some(CmpOp::Ge),
            "gt" => Some(CmpOp::Gt),
            "le" => Some(CmpOp::Le),
            "lt" => Some(CmpOp::Lt),
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            _ => None,
        }
    }

    fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum KernelLiteral {
    I64(i64),
    F64(f64),
}

#[derive(Clone, Debug)]
pub struct Predicate {
    pub column: ColumnOrdinal,
    pub op: CmpOp,
    pub literal: KernelLiteral,
}

impl Predicate {
    fn holds(&self, cell: CellValue) -> bool {
        match self.literal {
            KernelLiteral::I64(rhs) => match cell.as_i64() {
                Some(lhs) => self.op.holds(lhs, rhs),
                // Float cell against an integer literal: compare numerically.
                None => self.op.holds(cell.as_f64(), rhs as f64),
            },
            KernelLiteral::F64(rhs) => self.op.holds(cell.as_f64(), rhs),
        }
    }
}

/// A compiled conjunction of single-column predicates.
#[derive(Clone, Debug)]
pub struct KernelProgram {
    predicates: Arc<Vec<Predicate>>,
}

impl KernelProgram {
    /// Parse kernel source; `Err` carries the accumulated build log.
    pub fn parse(source: &[u8]) -> std::result::Result<KernelProgram, String> {
        let text = match std::str::from_utf8(source) {
            Ok(t) => t,
            Err(_) => return Err("kernel source is not valid UTF-8".to_string()),
        };
        let mut predicates = Vec::new();
        let mut log = String::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Ok(p) => predicates.push(p),
                Err(reason) => {
                    let _ = writeln!(log, "line {}: {}", lineno + 1, reason);
                }
            }
        }
        if log.is_empty() {
            Ok(KernelProgram {
                predicates: Arc::new(predicates),
            })
        } else {
            Err(log.trim_end().to_string())
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Evaluate the conjunction over one chunk, narrowing the rowmap to the
    /// live rows whose predicates all hold. A null operand drops the row.
    pub(crate) fn evaluate(&self, input: &KernelInput) -> Result<BooleanBuffer> {
        // Resolve every referenced column up front; a missing column means
        // the loader and the planner disagreed about clause columns.
        let mut resolved: Vec<(&Predicate, &KernelColumn, usize)> =
            Vec::with_capacity(self.predicates.len());
        for predicate in self.predicates.iter() {
            let column = input
                .columns
                .iter()
                .find(|c| c.ordinal == predicate.column)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "kernel references column {} absent from chunk input",
                        predicate.column
                    ))
                })?;
            let width = cell_width(&column.data_type).ok_or_else(|| {
                Error::Internal(format!(
                    "column {} has no device-storable width",
                    predicate.column
                ))
            })?;
            resolved.push((predicate, column, width));
        }

        let out = BooleanBuffer::collect_bool(input.rows, |row| {
            if !input.rowmap.value(row) {
                return false;
            }
            resolved.iter().all(|(predicate, column, width)| {
                if let Some(validity) = &column.validity {
                    if !bit_set(validity, row) {
                        return false;
                    }
                }
                match CellValue::from_le_bytes(&column.data_type, &column.values[row * width..]) {
                    Some(cell) => predicate.holds(cell),
                    None => false,
                }
            })
        });
        Ok(out)
    }
}

fn parse_line(line: &str) -> std::result::Result<Predicate, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["col", ordinal, op, literal] => {
            let column: ColumnOrdinal = ordinal
                .parse()
                .map_err(|_| format!("invalid column ordinal '{ordinal}'"))?;
            let op = CmpOp::parse(op).ok_or_else(|| format!("unknown operator '{op}'"))?;
            let literal = parse_literal(literal)?;
            Ok(Predicate {
                column,
                op,
                literal,
            })
        }
        _ => Err(format!("expected 'col <ordinal> <op> <lit>', got '{line}'")),
    }
}

fn parse_literal(token: &str) -> std::result::Result<KernelLiteral, String> {
    match token.split_once(':') {
        Some(("i64", v)) => v
            .parse()
            .map(KernelLiteral::I64)
            .map_err(|_| format!("invalid i64 literal '{v}'")),
        Some(("f64", v)) => v
            .parse()
            .map(KernelLiteral::F64)
            .map_err(|_| format!("invalid f64 literal '{v}'")),
        _ => Err(format!("expected '<i64|f64>:<value>', got '{token}'")),
    }
}

#[inline]
fn bit_set(bytes: &[u8], idx: usize) -> bool {
    bytes[idx / 8] & (1 << (idx % 8)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conjunctions_and_comments() {
        let program = KernelProgram::parse(b"# keep rows over 5\ncol 0 gt i64:5\n\ncol 1 le f64:2.5\n")
            .expect("valid program");
        assert_eq!(program.predicates().len(), 2);
    }

    #[test]
    fn build_log_names_every_bad_line() {
        let log = KernelProgram::parse(b"col 0 gt i64:5\ncol x gt i64:1\ncol 1 zz i64:2\n")
            .expect_err("two bad lines");
        assert!(log.contains("line 2"), "{log}");
        assert!(log.contains("line 3"), "{log}");
        assert!(!log.contains("line 1"), "{log}");
    }
}
