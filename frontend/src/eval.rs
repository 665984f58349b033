// eval.rs — Evaluating parsed expressions against a symbol table
//
// Values are tree values: scalars, or node handles reached through a leaf
// name (`Buffer.attributes.depth`). `/` always yields a float, `//` and
// `%` floor toward negative infinity, integer powers with a non-negative
// exponent stay integers, and integer overflow is an error.
//
// Preconditions: `tree` holds every node a symbol refers to.
// Postconditions: none.
// Failure modes: unknown names, type errors and arithmetic errors, as a
//   message; the caller attaches the tree path.
// Side effects: none.

use indexmap::IndexMap;

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::tree::{Tree, Value};

pub type Symbols = IndexMap<String, Value>;

/// Why an evaluation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A bare name that no layer binds.
    Unbound(String),
    Other(String),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Unbound(name) => write!(f, "name '{name}' is not defined"),
            EvalError::Other(message) => f.write_str(message),
        }
    }
}

type EResult<T> = std::result::Result<T, EvalError>;

fn fail<T>(message: impl Into<String>) -> EResult<T> {
    Err(EvalError::Other(message.into()))
}

/// Symbol lookup across layers; the first layer binding a name wins.
pub struct Scope<'a> {
    pub layers: Vec<&'a Symbols>,
}

impl<'a> Scope<'a> {
    pub fn new(layers: Vec<&'a Symbols>) -> Self {
        Self { layers }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.layers.iter().find_map(|layer| layer.get(name))
    }
}

pub struct Evaluator<'a> {
    pub tree: &'a Tree,
    pub scope: Scope<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(tree: &'a Tree, scope: Scope<'a>) -> Self {
        Self { tree, scope }
    }

    pub fn eval(&self, expr: &Expr) -> EResult<Value> {
        match expr {
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::Null),
            Expr::Name(name) => self
                .scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::Unbound(name.clone())),
            Expr::Attr(base, name) => {
                let base = self.eval(base)?;
                self.attribute(&base, name)
            }
            Expr::Call(callee, args) => {
                let Some(function) = callee.as_name() else {
                    return fail("only built-in functions can be called");
                };
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<EResult<Vec<_>>>()?;
                self.call(function, &args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, &value, self.tree)
            }
            Expr::Binary(BinOp::And, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if truthy(self.tree, &lhs) {
                    self.eval(rhs)
                } else {
                    Ok(lhs)
                }
            }
            Expr::Binary(BinOp::Or, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if truthy(self.tree, &lhs) {
                    Ok(lhs)
                } else {
                    self.eval(rhs)
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs)
            }
        }
    }

    fn attribute(&self, base: &Value, name: &str) -> EResult<Value> {
        let Value::Node(id) = base else {
            return fail(format!("{} has no attribute '{name}'", base.type_name()));
        };
        if !self.tree.is_dict(*id) {
            return fail(format!("{} has no attribute '{name}'", self.tree.kind(*id)));
        }
        match self.tree.get(*id, name) {
            Ok(Some(value)) => Ok(value.clone()),
            Ok(None) => fail(format!(
                "{} has no attribute '{name}'. Available: {:?}",
                self.tree.kind(*id),
                self.tree.keys(*id)
            )),
            Err(e) => fail(e.to_string()),
        }
    }

    fn call(&self, function: &str, args: &[Value]) -> EResult<Value> {
        let arity = |n: usize| -> EResult<()> {
            if args.len() == n {
                Ok(())
            } else {
                fail(format!(
                    "{function}() takes {n} argument(s), {} given",
                    args.len()
                ))
            }
        };
        match function {
            "len" => {
                arity(1)?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::Node(id) => Ok(Value::Int(self.tree.size(*id) as i64)),
                    other => fail(format!("object of type {} has no len()", other.type_name())),
                }
            }
            "min" | "max" => {
                let items: Vec<Value> = match args {
                    [Value::Node(id)] if !self.tree.is_dict(*id) => self.tree.items(*id).to_vec(),
                    _ => args.to_vec(),
                };
                let mut best: Option<Value> = None;
                for item in items {
                    number(&item)?;
                    best = Some(match best {
                        None => item,
                        Some(current) => {
                            let replace = if function == "min" {
                                as_f64(&item)? < as_f64(&current)?
                            } else {
                                as_f64(&item)? > as_f64(&current)?
                            };
                            if replace {
                                item
                            } else {
                                current
                            }
                        }
                    });
                }
                best.map_or_else(
                    || fail(format!("{function}() arg is an empty sequence")),
                    Ok,
                )
            }
            "abs" => {
                arity(1)?;
                match &args[0] {
                    Value::Int(i) => i
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| EvalError::Other("integer overflow".into())),
                    other => Ok(Value::Float(as_f64(other)?.abs())),
                }
            }
            "round" => match args {
                [x] => float_to_int(round_half_even(as_f64(x)?)),
                [x, digits] => {
                    let x = as_f64(x)?;
                    let Ok(digits) = i32::try_from(as_i64(digits)?) else {
                        return fail("round() digit count out of range");
                    };
                    let scale = 10f64.powi(digits);
                    if !scale.is_finite() {
                        return Ok(Value::Float(x));
                    }
                    if scale == 0.0 {
                        return Ok(Value::Float(0.0));
                    }
                    Ok(Value::Float(round_half_even(x * scale) / scale))
                }
                _ => fail("round() takes 1 or 2 arguments"),
            },
            "int" => {
                arity(1)?;
                match &args[0] {
                    Value::Int(i) => Ok(Value::Int(*i)),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::Float(x) => float_to_int(x.trunc()),
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .or_else(|_| fail(format!("invalid literal for int(): '{s}'"))),
                    other => fail(format!("int() can't convert {}", other.type_name())),
                }
            }
            "float" => {
                arity(1)?;
                match &args[0] {
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .or_else(|_| fail(format!("could not convert string to float: '{s}'"))),
                    other => Ok(Value::Float(as_f64(other)?)),
                }
            }
            "str" => {
                arity(1)?;
                Ok(Value::Str(text_of(self.tree, &args[0])))
            }
            "ceil" | "floor" => {
                arity(1)?;
                let x = as_f64(&args[0])?;
                float_to_int(if function == "ceil" {
                    x.ceil()
                } else {
                    x.floor()
                })
            }
            "sqrt" => {
                arity(1)?;
                let x = as_f64(&args[0])?;
                if x < 0.0 {
                    return fail("math domain error");
                }
                Ok(Value::Float(x.sqrt()))
            }
            "log" | "log2" => {
                let (x, base) = match (function, args) {
                    ("log2", [x]) => (as_f64(x)?, 2.0),
                    ("log", [x]) => (as_f64(x)?, std::f64::consts::E),
                    ("log", [x, base]) => (as_f64(x)?, as_f64(base)?),
                    _ => return fail(format!("{function}() got the wrong number of arguments")),
                };
                if x <= 0.0 || base <= 0.0 || base == 1.0 {
                    return fail("math domain error");
                }
                Ok(Value::Float(x.ln() / base.ln()))
            }
            other => fail(format!("unknown function '{other}'")),
        }
    }
}

// ── Operators ──────────────────────────────────────────────────────────────

pub fn truthy(tree: &Tree, value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(x) => *x != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::Node(id) => tree.size(*id) > 0,
    }
}

fn number(value: &Value) -> EResult<()> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(()),
        other => fail(format!("expected a number, found {}", other.type_name())),
    }
}

fn as_f64(value: &Value) -> EResult<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(x) => Ok(*x),
        Value::Bool(b) => Ok(f64::from(u8::from(*b))),
        other => fail(format!("expected a number, found {}", other.type_name())),
    }
}

fn as_i64(value: &Value) -> EResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => fail(format!("expected an integer, found {}", other.type_name())),
    }
}

fn float_to_int(x: f64) -> EResult<Value> {
    if x.is_finite() && x.abs() < 9.2e18 {
        Ok(Value::Int(x as i64))
    } else {
        fail(format!("cannot convert {x} to integer"))
    }
}

fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

fn unary(op: UnaryOp, value: &Value, tree: &Tree) -> EResult<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!truthy(tree, v))),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Other("integer overflow".into())),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v.clone()),
        (_, Value::Bool(b)) => unary(op, &Value::Int(i64::from(*b)), tree),
        (op, v) => fail(format!(
            "bad operand type for unary {op:?}: {}",
            v.type_name()
        )),
    }
}

fn overflow() -> EvalError {
    EvalError::Other("integer overflow".into())
}

fn int_binary(op: BinOp, a: i64, b: i64) -> EResult<Value> {
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return fail("division by zero");
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv | BinOp::Mod => {
            if b == 0 {
                return fail("integer division or modulo by zero");
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let r = a - q * b;
            let (q, r) = if r != 0 && (r < 0) != (b < 0) {
                (q - 1, r + b)
            } else {
                (q, r)
            };
            if op == BinOp::FloorDiv {
                q
            } else {
                r
            }
        }
        BinOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
        _ => return compare(op, &Value::Int(a), &Value::Int(b)),
    };
    Ok(Value::Int(value))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> EResult<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            return fail("float division by zero")
        }
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
        _ => return compare(op, &Value::Float(a), &Value::Float(b)),
    };
    Ok(Value::Float(value))
}

fn compare(op: BinOp, a: &Value, b: &Value) -> EResult<Value> {
    use std::cmp::Ordering;
    let ordering = match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => match (as_f64(a), as_f64(b)) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y),
            _ => None,
        },
    };
    let result = match (op, ordering) {
        (BinOp::Eq, ord) => ord == Some(Ordering::Equal),
        (BinOp::Ne, ord) => ord != Some(Ordering::Equal),
        (_, None) => {
            return fail(format!(
                "'{op}' not supported between {} and {}",
                a.type_name(),
                b.type_name()
            ))
        }
        (BinOp::Lt, Some(o)) => o == Ordering::Less,
        (BinOp::Le, Some(o)) => o != Ordering::Greater,
        (BinOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinOp::Ge, Some(o)) => o != Ordering::Less,
        (op, _) => return fail(format!("'{op}' is not a comparison")),
    };
    Ok(Value::Bool(result))
}

/// Longest string a repetition may produce.
const MAX_REPEAT_LEN: usize = 1 << 20;

fn repeat_str(s: &str, n: i64) -> EResult<Value> {
    let count = usize::try_from(n).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::Str(s.repeat(count))),
        _ => fail(format!(
            "repeating a string of length {} {n} times exceeds {MAX_REPEAT_LEN} bytes",
            s.len()
        )),
    }
}

fn binary(op: BinOp, a: &Value, b: &Value) -> EResult<Value> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) if op == BinOp::Add => Ok(Value::Str(format!("{x}{y}"))),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if op == BinOp::Mul => {
            repeat_str(s, *n)
        }
        (Value::Int(x), Value::Int(y)) => int_binary(op, *x, *y),
        (Value::Bool(_), _) | (_, Value::Bool(_)) if !matches!(op, BinOp::Eq | BinOp::Ne) => {
            binary(op, &bool_to_int(a), &bool_to_int(b))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_binary(op, as_f64(a)?, as_f64(b)?)
        }
        _ if matches!(
            op,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        ) =>
        {
            compare(op, a, b)
        }
        _ => fail(format!(
            "unsupported operand type(s) for {op}: {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

fn bool_to_int(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Int(i64::from(*b)),
        other => other.clone(),
    }
}

/// Text form of a value, used when substituting values into text.
pub fn text_of(tree: &Tree, value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
            format!("{x:.1}")
        }
        Value::Float(x) => x.to_string(),
        Value::Str(s) => s.clone(),
        Value::Node(_) => tree.display(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval_with(symbols: &Symbols, source: &str) -> EResult<Value> {
        let tree = Tree::new();
        let expr = parse(source).map_err(EvalError::Other)?;
        Evaluator::new(&tree, Scope::new(vec![symbols])).eval(&expr)
    }

    fn eval(source: &str) -> EResult<Value> {
        eval_with(&Symbols::new(), source)
    }

    #[test]
    fn floored_division_and_powers() {
        assert_eq!(eval("7 / 2"), Ok(Value::Float(3.5)));
        assert_eq!(eval("7 // 2"), Ok(Value::Int(3)));
        assert_eq!(eval("-7 // 2"), Ok(Value::Int(-4)));
        assert_eq!(eval("-7 % 3"), Ok(Value::Int(2)));
        assert_eq!(eval("2 ** 10"), Ok(Value::Int(1024)));
        assert_eq!(eval("2 ** -1"), Ok(Value::Float(0.5)));
        assert!(eval("1 // 0").is_err());
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("max(3, 8.5, 2)"), Ok(Value::Float(8.5)));
        assert_eq!(eval("min(3, 8, 2)"), Ok(Value::Int(2)));
        assert_eq!(eval("ceil(log2(1000))"), Ok(Value::Int(10)));
        assert_eq!(eval("round(2.5)"), Ok(Value::Int(2)));
        assert_eq!(eval("int('12') + len('abc')"), Ok(Value::Int(15)));
        assert_eq!(eval("str(4) + 'x'"), Ok(Value::Str("4x".into())));
        assert!(eval("frobnicate(1)").is_err());
    }

    #[test]
    fn string_repetition_is_bounded() {
        assert_eq!(eval("'ab' * 3"), Ok(Value::Str("ababab".into())));
        assert_eq!(eval("2 * 'x'"), Ok(Value::Str("xx".into())));
        assert!(matches!(
            eval("'ab' * 9000000000000000000"),
            Err(EvalError::Other(_))
        ));
        assert!(matches!(eval("'x' * 2000000"), Err(EvalError::Other(_))));
    }

    #[test]
    fn round_digit_counts() {
        assert_eq!(eval("round(3.14159, 2)"), Ok(Value::Float(3.14)));
        assert_eq!(eval("round(2.5, 400)"), Ok(Value::Float(2.5)));
        assert_eq!(eval("round(2.5, -400)"), Ok(Value::Float(0.0)));
        assert!(matches!(
            eval("round(2.5, 9000000000)"),
            Err(EvalError::Other(_))
        ));
    }

    #[test]
    fn names_and_boolean_logic() {
        let mut symbols = Symbols::new();
        symbols.insert("width".into(), Value::Int(16));
        symbols.insert("enabled".into(), Value::Bool(true));
        assert!(eval_with(&symbols, "width * 2 if_missing").is_err());
        assert_eq!(eval_with(&symbols, "width * 2"), Ok(Value::Int(32)));
        assert_eq!(eval_with(&symbols, "enabled and width"), Ok(Value::Int(16)));
        assert_eq!(eval_with(&symbols, "width >= 16"), Ok(Value::Bool(true)));
        assert_eq!(
            eval_with(&symbols, "depth"),
            Err(EvalError::Unbound("depth".into()))
        );
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(eval("9223372036854775807 + 1").is_err());
        assert!(eval("10 ** 30").is_err());
    }

    #[test]
    fn text_of_keeps_float_points() {
        let tree = Tree::new();
        assert_eq!(text_of(&tree, &Value::Float(2.0)), "2.0");
        assert_eq!(text_of(&tree, &Value::Float(0.25)), "0.25");
        assert_eq!(text_of(&tree, &Value::Bool(false)), "False");
    }
}
