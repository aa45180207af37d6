//! Check expression AST, three-valued evaluation, and SQL rendering.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::value::{Row, Value};

/// Three-valued logic result of a check expression.
///
/// A CHECK constraint is violated only by a definite `False`; `Unknown`
/// (NULL involved) satisfies the constraint, per SQL semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    /// Definitely true.
    True,
    /// Definitely false.
    False,
    /// NULL was involved; neither true nor false.
    Unknown,
}

impl Truth {
    /// Kleene AND.
    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    /// Kleene OR.
    pub fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }

    /// Kleene NOT.
    pub fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    /// Whether this result satisfies a CHECK constraint.
    pub fn satisfies_check(self) -> bool {
        self != Truth::False
    }

    fn from_bool(b: bool) -> Truth {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=` / `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// A comparison operand: a column reference or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A column of the owning table.
    Column(String),
    /// A constant.
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, row: &'a Row) -> &'a Value {
        match self {
            Operand::Column(name) => row.value(name),
            Operand::Literal(value) => value,
        }
    }

    fn rename_column(&mut self, old: &str, new: &str) {
        if let Operand::Column(name) = self {
            if *name == old {
                *name = new.to_string();
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(name) => write!(f, "{}", name),
            Operand::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// A parsed check constraint expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckExpr {
    /// `left op right`
    Compare {
        /// Left operand.
        left: Operand,
        /// The operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// `operand IS [NOT] NULL`
    IsNull {
        /// The tested operand.
        operand: Operand,
        /// True for `IS NOT NULL`.
        negated: bool,
    },
    /// `operand [NOT] IN (literal, ...)`
    InList {
        /// The tested operand.
        operand: Operand,
        /// The allowed constants.
        list: Vec<Value>,
        /// True for `NOT IN`.
        negated: bool,
    },
    /// `left AND right`
    And(Box<CheckExpr>, Box<CheckExpr>),
    /// `left OR right`
    Or(Box<CheckExpr>, Box<CheckExpr>),
    /// `NOT inner`
    Not(Box<CheckExpr>),
}

impl CheckExpr {
    /// Evaluate the expression against a row under three-valued logic.
    ///
    /// Columns absent from the row read as NULL; incomparable operands
    /// yield `Unknown` rather than an error, so evaluation never fails.
    pub fn eval(&self, row: &Row) -> Truth {
        match self {
            CheckExpr::Compare { left, op, right } => {
                match left.resolve(row).compare(right.resolve(row)) {
                    Some(ord) => Truth::from_bool(op.matches(ord)),
                    None => Truth::Unknown,
                }
            }
            CheckExpr::IsNull { operand, negated } => {
                let is_null = operand.resolve(row).is_null();
                Truth::from_bool(is_null != *negated)
            }
            CheckExpr::InList {
                operand,
                list,
                negated,
            } => {
                let value = operand.resolve(row);
                if value.is_null() {
                    return Truth::Unknown;
                }
                let found = list
                    .iter()
                    .any(|allowed| value.compare(allowed) == Some(Ordering::Equal));
                Truth::from_bool(found != *negated)
            }
            CheckExpr::And(left, right) => left.eval(row).and(right.eval(row)),
            CheckExpr::Or(left, right) => left.eval(row).or(right.eval(row)),
            CheckExpr::Not(inner) => inner.eval(row).not(),
        }
    }

    /// Collect the column names referenced by this expression.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        fn operand(o: &Operand, out: &mut BTreeSet<String>) {
            if let Operand::Column(name) = o {
                out.insert(name.clone());
            }
        }
        match self {
            CheckExpr::Compare { left, right, .. } => {
                operand(left, out);
                operand(right, out);
            }
            CheckExpr::IsNull { operand: o, .. } | CheckExpr::InList { operand: o, .. } => {
                operand(o, out)
            }
            CheckExpr::And(left, right) | CheckExpr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            CheckExpr::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Rewrite references to a renamed column. The rule's meaning is
    /// unchanged; only its textual representation moves.
    pub fn rename_column(&mut self, old: &str, new: &str) {
        match self {
            CheckExpr::Compare { left, right, .. } => {
                left.rename_column(old, new);
                right.rename_column(old, new);
            }
            CheckExpr::IsNull { operand, .. } | CheckExpr::InList { operand, .. } => {
                operand.rename_column(old, new)
            }
            CheckExpr::And(left, right) | CheckExpr::Or(left, right) => {
                left.rename_column(old, new);
                right.rename_column(old, new);
            }
            CheckExpr::Not(inner) => inner.rename_column(old, new),
        }
    }

    /// Render the expression as canonical SQL text.
    pub fn to_sql(&self) -> String {
        match self {
            CheckExpr::Compare { left, op, right } => format!("{} {} {}", left, op, right),
            CheckExpr::IsNull { operand, negated } => {
                if *negated {
                    format!("{} IS NOT NULL", operand)
                } else {
                    format!("{} IS NULL", operand)
                }
            }
            CheckExpr::InList {
                operand,
                list,
                negated,
            } => {
                let items = list
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if *negated {
                    format!("{} NOT IN ({})", operand, items)
                } else {
                    format!("{} IN ({})", operand, items)
                }
            }
            CheckExpr::And(left, right) => format!(
                "{} AND {}",
                Self::child_sql(left, Prec::And),
                Self::child_sql(right, Prec::And)
            ),
            CheckExpr::Or(left, right) => format!(
                "{} OR {}",
                Self::child_sql(left, Prec::Or),
                Self::child_sql(right, Prec::Or)
            ),
            CheckExpr::Not(inner) => format!("NOT {}", Self::child_sql(inner, Prec::Not)),
        }
    }

    fn precedence(&self) -> Prec {
        match self {
            CheckExpr::Or(..) => Prec::Or,
            CheckExpr::And(..) => Prec::And,
            CheckExpr::Not(..) => Prec::Not,
            _ => Prec::Atom,
        }
    }

    fn child_sql(child: &CheckExpr, parent: Prec) -> String {
        if child.precedence() < parent {
            format!("({})", child.to_sql())
        } else {
            child.to_sql()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Or,
    And,
    Not,
    Atom,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;

    fn row(pairs: Vec<(&str, Value)>) -> Row {
        let mut row = Row::new();
        for (column, value) in pairs {
            row.set(column, value);
        }
        row
    }

    #[test]
    fn test_null_comparison_is_unknown() {
        let expr = parse("age >= 0").unwrap();
        let result = expr.eval(&row(vec![("age", Value::Null)]));

        assert_eq!(result, Truth::Unknown);
        assert!(result.satisfies_check());
    }

    #[test]
    fn test_definite_false_fails_check() {
        let expr = parse("age >= 0").unwrap();
        let result = expr.eval(&row(vec![("age", Value::Int(-1))]));

        assert_eq!(result, Truth::False);
        assert!(!result.satisfies_check());
    }

    #[test]
    fn test_kleene_and_or() {
        // UNKNOWN AND FALSE = FALSE
        let expr = parse("a > 0 AND b > 0").unwrap();
        let result = expr.eval(&row(vec![("a", Value::Null), ("b", Value::Int(-1))]));
        assert_eq!(result, Truth::False);

        // UNKNOWN OR TRUE = TRUE
        let expr = parse("a > 0 OR b > 0").unwrap();
        let result = expr.eval(&row(vec![("a", Value::Null), ("b", Value::Int(1))]));
        assert_eq!(result, Truth::True);

        // UNKNOWN AND TRUE = UNKNOWN
        let expr = parse("a > 0 AND b > 0").unwrap();
        let result = expr.eval(&row(vec![("a", Value::Null), ("b", Value::Int(1))]));
        assert_eq!(result, Truth::Unknown);
    }

    #[test]
    fn test_not_unknown_is_unknown() {
        let expr = parse("NOT a > 0").unwrap();
        let result = expr.eval(&row(vec![("a", Value::Null)]));
        assert_eq!(result, Truth::Unknown);
    }

    #[test]
    fn test_in_list() {
        let expr = parse("status IN ('active', 'pending')").unwrap();

        let active = row(vec![("status", Value::String("active".into()))]);
        assert_eq!(expr.eval(&active), Truth::True);

        let archived = row(vec![("status", Value::String("archived".into()))]);
        assert_eq!(expr.eval(&archived), Truth::False);

        let null = row(vec![("status", Value::Null)]);
        assert_eq!(expr.eval(&null), Truth::Unknown);
    }

    #[test]
    fn test_is_null() {
        let expr = parse("email IS NOT NULL").unwrap();

        assert_eq!(
            expr.eval(&row(vec![("email", Value::String("x@y".into()))])),
            Truth::True
        );
        assert_eq!(expr.eval(&row(vec![("email", Value::Null)])), Truth::False);
    }

    #[test]
    fn test_columns() {
        let expr = parse("a > 0 AND (b = c OR d IS NULL)").unwrap();
        let columns: Vec<String> = expr.columns().into_iter().collect();
        assert_eq!(columns, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_rename_column() {
        let mut expr = parse("age >= 0 AND age <= 150").unwrap();
        expr.rename_column("age", "years");

        assert_eq!(expr.to_sql(), "years >= 0 AND years <= 150");
        assert!(!expr.columns().contains("age"));

        let ok = row(vec![("years", Value::Int(30))]);
        assert_eq!(expr.eval(&ok), Truth::True);
    }

    #[test]
    fn test_to_sql_parenthesizes_by_precedence() {
        let expr = parse("(a = 1 OR b = 2) AND c = 3").unwrap();
        assert_eq!(expr.to_sql(), "(a = 1 OR b = 2) AND c = 3");

        let expr = parse("a = 1 OR b = 2 AND c = 3").unwrap();
        assert_eq!(expr.to_sql(), "a = 1 OR b = 2 AND c = 3");

        let expr = parse("NOT (a = 1 AND b = 2)").unwrap();
        assert_eq!(expr.to_sql(), "NOT (a = 1 AND b = 2)");
    }
}
