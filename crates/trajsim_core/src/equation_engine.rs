use crate::error::{Result, SimError};
use crate::traits::Scalar;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    /// Indices follow the variable layout given to the `Compiler`
    /// (states, then inputs, then time for time-variant systems).
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top two values (x, y), pushes atan2(y, x).
    Atan2,
    /// Pops top two values (b, a), pushes max(a, b).
    Max,
    /// Pops top two values (b, a), pushes min(a, b).
    Min,
    Sin,
    Cos,
    Tan,
    Atan,
    Exp,
    Ln,
    Sqrt,
    Abs,
    /// Pops top value (a), pushes -1, 0 or 1 according to its sign.
    Sign,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
///
/// Bytecode is only produced by the `Compiler`, so the stack discipline of
/// every sequence is valid by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Variable vector (read-only).
/// - `params`: Parameter vector (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the result of the evaluation (the value left on the stack).
pub struct VM;

impl VM {
    /// Executes the bytecode.
    ///
    /// # Type Parameters
    /// * `T`: The scalar type (e.g., `f64` or `f32`).
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(*val).unwrap()),
                OpCode::LoadVar(idx) => stack.push(vars[*idx]),
                OpCode::LoadParam(idx) => stack.push(params[*idx]),
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
                OpCode::Pow => binary(stack, |a, b| a.powf(b)),
                OpCode::Atan2 => binary(stack, |y, x| y.atan2(x)),
                OpCode::Max => binary(stack, |a, b| a.max(b)),
                OpCode::Min => binary(stack, |a, b| a.min(b)),
                OpCode::Sin => unary(stack, |a| a.sin()),
                OpCode::Cos => unary(stack, |a| a.cos()),
                OpCode::Tan => unary(stack, |a| a.tan()),
                OpCode::Atan => unary(stack, |a| a.atan()),
                OpCode::Exp => unary(stack, |a| a.exp()),
                OpCode::Ln => unary(stack, |a| a.ln()),
                OpCode::Sqrt => unary(stack, |a| a.sqrt()),
                OpCode::Abs => unary(stack, |a| a.abs()),
                OpCode::Sign => unary(stack, sign),
                OpCode::Neg => unary(stack, |a| -a),
            }
        }

        stack.pop().unwrap_or_else(T::zero)
    }
}

fn binary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T, T) -> T) {
    let b = stack.pop().unwrap();
    let a = stack.pop().unwrap();
    stack.push(f(a, b));
}

fn unary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T) -> T) {
    let a = stack.pop().unwrap();
    stack.push(f(a));
}

// Unlike `Float::signum`, zero maps to zero.
fn sign<T: Scalar>(a: T) -> T {
    if a.is_nan() {
        a
    } else if a > T::zero() {
        T::one()
    } else if a < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

// --- AST ---

/// Abstract Syntax Tree nodes for expressions.
///
/// Trees come either from `parse` or from the builder methods and operator
/// overloads below, which let equations of motion be written as ordinary
/// Rust arithmetic over symbols.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Vec<Expr>),            // functions like sin(x), atan2(y, x)
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn num(value: f64) -> Self {
        Expr::Number(value)
    }

    fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call(name.to_string(), args)
    }

    pub fn sin(self) -> Self {
        Self::call("sin", vec![self])
    }

    pub fn cos(self) -> Self {
        Self::call("cos", vec![self])
    }

    pub fn tan(self) -> Self {
        Self::call("tan", vec![self])
    }

    pub fn atan(self) -> Self {
        Self::call("atan", vec![self])
    }

    pub fn exp(self) -> Self {
        Self::call("exp", vec![self])
    }

    pub fn ln(self) -> Self {
        Self::call("ln", vec![self])
    }

    pub fn sqrt(self) -> Self {
        Self::call("sqrt", vec![self])
    }

    pub fn abs(self) -> Self {
        Self::call("abs", vec![self])
    }

    pub fn sign(self) -> Self {
        Self::call("sign", vec![self])
    }

    pub fn powf(self, exponent: impl Into<Expr>) -> Self {
        Expr::Binary(Box::new(self), '^', Box::new(exponent.into()))
    }

    /// Four-quadrant arctangent of `self / x`, matching `f64::atan2`.
    pub fn atan2(self, x: impl Into<Expr>) -> Self {
        Self::call("atan2", vec![self, x.into()])
    }

    pub fn max(self, other: impl Into<Expr>) -> Self {
        Self::call("max", vec![self, other.into()])
    }

    pub fn min(self, other: impl Into<Expr>) -> Self {
        Self::call("min", vec![self, other.into()])
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl From<&Expr> for Expr {
    fn from(value: &Expr) -> Self {
        value.clone()
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:literal) => {
        impl $trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::Binary(Box::new(self), $op, Box::new(rhs))
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::Binary(Box::new(self), $op, Box::new(rhs.clone()))
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::Binary(Box::new(self), $op, Box::new(Expr::Number(rhs)))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::Binary(Box::new(Expr::Number(self)), $op, Box::new(rhs))
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::Binary(Box::new(Expr::Number(self)), $op, Box::new(rhs.clone()))
            }
        }
    };
}

impl_binary_op!(Add, add, '+');
impl_binary_op!(Sub, sub, '-');
impl_binary_op!(Mul, mul, '*');
impl_binary_op!(Div, div, '/');

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary('-', Box::new(self))
    }
}

/// Fully parenthesised rendering that `parse` reads back into the same value.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) if *n < 0.0 => write!(f, "(-{:?})", -n),
            Expr::Number(n) => write!(f, "{n:?}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Binary(left, op, right) => write!(f, "({left} {op} {right})"),
            Expr::Unary(op, operand) => write!(f, "({op}{operand})"),
            Expr::Call(func, args) => {
                write!(f, "{func}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// --- Compiler ---

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let mut var_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            var_map.insert(name.clone(), i);
        }

        let mut param_map = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            param_map.insert(name.clone(), i);
        }

        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else if name == "pi" {
                    ops.push(OpCode::LoadConst(std::f64::consts::PI));
                } else {
                    return Err(SimError::Compilation(format!(
                        "Unknown variable or parameter: {name}"
                    )));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => {
                        return Err(SimError::Compilation(format!(
                            "Unknown binary operator: {op}"
                        )))
                    }
                });
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    '+' => {}
                    _ => {
                        return Err(SimError::Compilation(format!(
                            "Unknown unary operator: {op}"
                        )))
                    }
                }
            }
            Expr::Call(func, args) => {
                let (arity, code) = match func.as_str() {
                    "sin" => (1, OpCode::Sin),
                    "cos" => (1, OpCode::Cos),
                    "tan" => (1, OpCode::Tan),
                    "atan" => (1, OpCode::Atan),
                    "exp" => (1, OpCode::Exp),
                    "ln" | "log" => (1, OpCode::Ln),
                    "sqrt" => (1, OpCode::Sqrt),
                    "abs" => (1, OpCode::Abs),
                    "sign" => (1, OpCode::Sign),
                    "atan2" => (2, OpCode::Atan2),
                    "max" => (2, OpCode::Max),
                    "min" => (2, OpCode::Min),
                    _ => {
                        return Err(SimError::Compilation(format!(
                            "Unsupported function: {func}"
                        )))
                    }
                };
                if args.len() != arity {
                    return Err(SimError::Compilation(format!(
                        "Function '{func}' expects {arity} argument(s), got {}",
                        args.len()
                    )));
                }
                for arg in args {
                    self.compile_recursive(arg, ops)?;
                }
                ops.push(code);
            }
        }
        Ok(())
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> std::result::Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("Empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("Unexpected token {token:?} after expression")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Exponent part, e.g. 1e-8 or 2.5E+3.
            if let Some(&e) = chars.peek() {
                if e == 'e' || e == 'E' {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&s) = lookahead.peek() {
                        if s == '+' || s == '-' {
                            exponent.push(s);
                            lookahead.next();
                        }
                    }
                    if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                        while let Some(&d) = lookahead.peek() {
                            if d.is_ascii_digit() {
                                exponent.push(d);
                                lookahead.next();
                            } else {
                                break;
                            }
                        }
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| format!("Invalid number '{num_str}'"))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                _ => return Err(format!("Unexpected character '{c}'")),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> std::result::Result<(), String> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err("Expected ')'".to_string()),
        }
    }

    fn parse_expression(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> std::result::Result<Expr, String> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // Unary minus binds looser than '^', so -x^2 is -(x^2).
    fn parse_unary(&mut self) -> std::result::Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary('-', Box::new(expr)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Right associative: a^b^c is a^(b^c).
    fn parse_power(&mut self) -> std::result::Result<Expr, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> std::result::Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let mut args = vec![self.parse_expression()?];
                    while let Some(Token::Comma) = self.peek() {
                        self.consume();
                        args.push(self.parse_expression()?);
                    }
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(format!("Unexpected token {token:?}")),
            None => Err("Unexpected end of expression".to_string()),
        }
    }
}

/// Parses and compiles a single expression against the given names.
pub fn compile_expression(
    expression: &str,
    var_names: &[String],
    param_names: &[String],
) -> Result<Bytecode> {
    let parsed = parse(expression)
        .map_err(|err| SimError::Compilation(format!("Failed to parse '{expression}': {err}")))?;
    Compiler::new(var_names, param_names).compile(&parsed)
}

#[cfg(test)]
mod tests {
    use super::{compile_expression, parse, Compiler, Expr, OpCode, VM};
    use crate::error::SimError;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn eval(expression: &str, vars: &[(&str, f64)]) -> f64 {
        let var_names: Vec<String> = vars.iter().map(|(n, _)| n.to_string()).collect();
        let values: Vec<f64> = vars.iter().map(|(_, v)| *v).collect();
        let code = compile_expression(expression, &var_names, &[]).expect("should compile");
        VM::execute(&code, &values, &[], &mut Vec::new())
    }

    #[test]
    fn parser_respects_precedence_and_associativity() {
        assert!((eval("1 + 2 * 3", &[]) - 7.0).abs() < 1e-12);
        assert!((eval("(1 + 2) * 3", &[]) - 9.0).abs() < 1e-12);
        assert!((eval("8 / 4 / 2", &[]) - 1.0).abs() < 1e-12);
        assert!((eval("2 ^ 3 ^ 2", &[]) - 512.0).abs() < 1e-9);
        assert!((eval("-x^2", &[("x", 3.0)]) + 9.0).abs() < 1e-12);
        assert!((eval("2^-1", &[]) - 0.5).abs() < 1e-12);
        assert!((eval("10 - 4 - 3", &[]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn parser_reads_scientific_notation_and_pi() {
        assert!((eval("1e-8 * 1e8", &[]) - 1.0).abs() < 1e-12);
        assert!((eval("2.5E+2", &[]) - 250.0).abs() < 1e-12);
        assert!((eval("cos(pi)", &[]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn parser_handles_multi_argument_calls() {
        let value = eval("atan2(y, x)", &[("y", 1.0), ("x", -1.0)]);
        assert!((value - 3.0 * std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert!((eval("max(x, 0.1)", &[("x", 0.0)]) - 0.1).abs() < 1e-12);
        assert!((eval("min(x, 0.1)", &[("x", 0.0)])).abs() < 1e-12);
    }

    #[test]
    fn parser_rejects_malformed_input() {
        assert!(parse("").is_err());
        assert!(parse("x +").is_err());
        assert!(parse("(x + 1").is_err());
        assert!(parse("x y").is_err());
        assert!(parse("x $ y").is_err());
    }

    #[test]
    fn sign_maps_zero_to_zero() {
        assert_eq!(eval("sign(x)", &[("x", -2.0)]), -1.0);
        assert_eq!(eval("sign(x)", &[("x", 0.0)]), 0.0);
        assert_eq!(eval("sign(x)", &[("x", 5.0)]), 1.0);
    }

    #[test]
    fn compiler_resolves_variables_before_parameters() {
        let compiler = Compiler::new(&names(&["x", "k"]), &names(&["k", "a"]));
        let code = compiler
            .compile(&parse("a * x + k").expect("parse"))
            .expect("compile");
        assert_eq!(
            code.ops(),
            &[
                OpCode::LoadParam(1),
                OpCode::LoadVar(0),
                OpCode::Mul,
                OpCode::LoadVar(1),
                OpCode::Add,
            ]
        );
        let value: f64 = VM::execute(&code, &[2.0, 5.0], &[100.0, 3.0], &mut Vec::new());
        assert!((value - 11.0).abs() < 1e-12);
    }

    #[test]
    fn compiler_reports_unknown_names_and_functions() {
        let err = compile_expression("x + missing", &names(&["x"]), &[])
            .expect_err("unknown symbol should fail");
        assert!(
            matches!(&err, SimError::Compilation(msg) if msg.contains("missing")),
            "unexpected error: {err}"
        );

        let err = compile_expression("cosh(x)", &names(&["x"]), &[])
            .expect_err("unsupported function should fail");
        assert!(err.to_string().contains("Unsupported function: cosh"));

        let err = compile_expression("atan2(x)", &names(&["x"]), &[])
            .expect_err("wrong arity should fail");
        assert!(err.to_string().contains("expects 2 argument(s), got 1"));

        let bad = Expr::Binary(Box::new(Expr::num(1.0)), '%', Box::new(Expr::num(2.0)));
        assert!(Compiler::new(&[], &[]).compile(&bad).is_err());
    }

    #[test]
    fn operator_overloads_build_parser_equivalent_trees() {
        let x = Expr::var("x");
        let y = Expr::var("y");
        let built = 2.0 * x.clone() + y.clone().sin() / (x - 1.0);
        assert_eq!(built, parse("2 * x + sin(y) / (x - 1)").expect("parse"));

        let neg = -y.powf(2.0);
        assert_eq!(neg, parse("-(y ^ 2)").expect("parse"));
    }

    #[test]
    fn display_round_trips_through_parser() {
        let x = Expr::var("x");
        let expr = (x.clone() * -3.5).atan2(x.clone().max(0.1)) - (-x).exp();
        let reparsed = parse(&expr.to_string()).expect("display output should parse");

        let var_names = names(&["x"]);
        let compiler = Compiler::new(&var_names, &[]);
        let original = compiler.compile(&expr).expect("compile");
        let round_trip = compiler.compile(&reparsed).expect("compile");
        for value in [-2.0f64, 0.0, 0.7, 3.0] {
            let a = VM::execute(&original, &[value], &[], &mut Vec::new());
            let b = VM::execute(&round_trip, &[value], &[], &mut Vec::new());
            assert!((a - b).abs() < 1e-12, "mismatch at x = {value}: {a} vs {b}");
        }
    }

    #[test]
    fn vm_evaluates_in_single_precision() {
        let code = compile_expression("x * x + 1", &names(&["x"]), &[]).expect("compile");
        let value: f32 = VM::execute(&code, &[3.0f32], &[], &mut Vec::new());
        assert!((value - 10.0).abs() < 1e-6);
    }
}
