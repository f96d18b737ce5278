//! Core types for the term IR: sorts, operators and declarations

use std::fmt;

/// Sort (type) of a term
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    Int,
    /// Single-constructor algebraic sort with one accessor per field
    Tuple(Vec<Sort>),
}

impl Sort {
    /// Scalar sorts are the only ones a shape parameter can take
    pub fn is_scalar(&self) -> bool {
        matches!(self, Sort::Bool | Sort::Int)
    }

    /// Field sorts of a tuple sort
    pub fn fields(&self) -> Option<&[Sort]> {
        match self {
            Sort::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    /// Sort of the field at `index`, if this is a tuple sort with that many fields
    pub fn field(&self, index: usize) -> Option<&Sort> {
        self.fields().and_then(|fields| fields.get(index))
    }

    /// Number of scalar leaves once nested tuples are flattened
    pub fn scalar_width(&self) -> usize {
        match self {
            Sort::Bool | Sort::Int => 1,
            Sort::Tuple(fields) => fields.iter().map(Sort::scalar_width).sum(),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "bool"),
            Sort::Int => write!(f, "int"),
            Sort::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Built-in operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Not,
    Neg,
    And,
    Or,
    Xor,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Op {
    /// Result sort; it only depends on the operator
    pub fn result_sort(&self) -> Sort {
        match self {
            Op::Not
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Eq
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge => Sort::Bool,
            Op::Neg | Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => Sort::Int,
        }
    }

    /// Check operand sorts
    pub fn accepts(&self, args: &[&Sort]) -> bool {
        let all = |sort: &Sort| args.iter().all(|s| *s == sort);
        match self {
            Op::Not => args.len() == 1 && all(&Sort::Bool),
            Op::Neg => args.len() == 1 && all(&Sort::Int),
            Op::And | Op::Or => !args.is_empty() && all(&Sort::Bool),
            Op::Xor => args.len() == 2 && all(&Sort::Bool),
            Op::Eq => args.len() == 2 && args[0] == args[1],
            Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Sub | Op::Div | Op::Mod => {
                args.len() == 2 && all(&Sort::Int)
            }
            Op::Add | Op::Mul => !args.is_empty() && all(&Sort::Int),
        }
    }

    /// Associative-commutative operators are flattened by the simplifier
    pub fn is_associative(&self) -> bool {
        matches!(self, Op::And | Op::Or | Op::Add | Op::Mul)
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, Op::Not | Op::Neg)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Not => "!",
            Op::Neg => "-",
            Op::And => "&&",
            Op::Or => "||",
            Op::Xor => "^",
            Op::Eq => "==",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Identity of an automaton state
///
/// Minted by the registry; two states never share an id even when their
/// shapes later turn out to be equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl StateId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Z{}", self.0)
    }
}

/// Function symbol of an application node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decl {
    Op(Op),
    /// Uninterpreted application of an automaton state to its parameters
    State(StateId),
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decl::Op(op) => write!(f, "{}", op),
            Decl::State(id) => write!(f, "{}", id),
        }
    }
}
