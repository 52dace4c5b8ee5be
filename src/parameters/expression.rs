//! Expression parsing and evaluation for dependent parameters.
//!
//! A parameter may be defined as an arithmetic expression over other
//! parameters. References are written with a `$` prefix followed by the full
//! parameter label, which may contain dots: `$rates.k1 * 2 + $shift`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::recognize,
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use std::collections::HashMap;
use thiserror::Error;

/// Error that can occur during expression parsing or evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression: {message}")]
    ParseError { message: String },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },
}

type ExprResult<T> = Result<T, ExpressionError>;

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),

    /// Reference to another parameter by label
    Variable(String),

    Neg(Box<Expression>),

    Binary(BinaryOp, Box<Expression>, Box<Expression>),

    Function(String, Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Source of variable values during evaluation.
pub trait EvaluationContext {
    fn get_variable(&self, name: &str) -> ExprResult<f64>;
}

impl EvaluationContext for HashMap<String, f64> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

impl Expression {
    /// Parse an expression from a string
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use tarfit_rs::parameters::Expression;
    ///
    /// let expr = Expression::parse("$rates.k1 * 2 - 1").unwrap();
    /// let mut values = HashMap::new();
    /// values.insert("rates.k1".to_string(), 0.5);
    /// assert_eq!(expr.evaluate(&values).unwrap(), 0.0);
    /// ```
    pub fn parse(input: &str) -> ExprResult<Self> {
        match expr_parser(input.trim()) {
            Ok((remainder, expr)) if remainder.trim().is_empty() => Ok(expr),
            Ok((remainder, _)) => Err(ExpressionError::ParseError {
                message: format!("Unexpected trailing characters: '{}'", remainder),
            }),
            Err(e) => Err(ExpressionError::ParseError {
                message: format!("{:?}", e),
            }),
        }
    }

    /// Evaluate the expression with the given context
    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Variable(name) => context.get_variable(name),
            Self::Neg(expr) => Ok(-expr.evaluate(context)?),
            Self::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div if rhs == 0.0 => Err(ExpressionError::DivisionByZero),
                    BinaryOp::Div => Ok(lhs / rhs),
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }
            Self::Function(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<_>>>()?;
                call_function(name, &args)
            }
        }
    }

    /// Labels of all parameters referenced by the expression, sorted and
    /// deduplicated.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => vars.push(name.clone()),
            Self::Neg(expr) => expr.collect_variables(vars),
            Self::Binary(_, left, right) => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Self::Function(_, args) => args.iter().for_each(|a| a.collect_variables(vars)),
        }
    }
}

fn call_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let unary = |f: fn(f64) -> f64| -> ExprResult<f64> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(ExpressionError::InvalidOperation {
                message: format!("{}() requires 1 argument, got {}", name, args.len()),
            }),
        }
    };

    match name {
        "exp" => unary(f64::exp),
        "log" | "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "min" | "max" if args.len() < 2 => Err(ExpressionError::InvalidOperation {
            message: format!("{}() requires at least 2 arguments, got {}", name, args.len()),
        }),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

// Parser functions using nom

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn function_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

/// `$label.with.dots`
fn variable(input: &str) -> IResult<&str, Expression> {
    let (input, label) = preceded(
        char::<_, nom::error::Error<&str>>('$'),
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    )
    .parse(input)?;
    Ok((input, Expression::Variable(label.to_string())))
}

fn number(input: &str) -> IResult<&str, Expression> {
    let (input, num) = double(input)?;
    Ok((input, Expression::Number(num)))
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (input, name) = function_name(input)?;
    let (mut input, _) = ws(char('(')).parse(input)?;

    let mut args = Vec::new();
    if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(')').parse(input) {
        return Ok((rest, Expression::Function(name.to_string(), args)));
    }
    loop {
        let (rest, arg) = expr_parser(input)?;
        args.push(arg);
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(',').parse(rest) {
            input = rest;
            continue;
        }
        let (rest, _) = char::<_, nom::error::Error<_>>(')').parse(rest)?;
        return Ok((rest, Expression::Function(name.to_string(), args)));
    }
}

fn parens(input: &str) -> IResult<&str, Expression> {
    delimited(char('('), expr_parser, char(')')).parse(input)
}

fn primary(input: &str) -> IResult<&str, Expression> {
    ws(alt((variable, number, function_call, parens))).parse(input)
}

fn unary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0::<&str, nom::error::Error<&str>>(input)?;
    match char::<_, nom::error::Error<_>>('-').parse(input) {
        Ok((rest, _)) => {
            let (rest, expr) = unary(rest)?;
            Ok((rest, Expression::Neg(Box::new(expr))))
        }
        Err(_) => primary(input),
    }
}

/// `a ^ b`, right associative
fn power(input: &str) -> IResult<&str, Expression> {
    let (input, base) = unary(input)?;
    match char::<_, nom::error::Error<_>>('^').parse(input) {
        Ok((rest, _)) => {
            let (rest, exponent) = power(rest)?;
            Ok((
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

/// Left-associative chain of `operand (op operand)*`.
fn left_chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expression>,
    operators: [(char, BinaryOp); 2],
) -> IResult<&'a str, Expression> {
    let (mut input, mut acc) = operand(input)?;
    'outer: loop {
        for (symbol, op) in operators {
            if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(symbol).parse(input) {
                let (rest, rhs) = operand(rest)?;
                acc = Expression::Binary(op, Box::new(acc), Box::new(rhs));
                input = rest;
                continue 'outer;
            }
        }
        return Ok((input, acc));
    }
}

fn term(input: &str) -> IResult<&str, Expression> {
    left_chain(input, power, [('*', BinaryOp::Mul), ('/', BinaryOp::Div)])
}

fn expr_parser(input: &str) -> IResult<&str, Expression> {
    left_chain(input, term, [('+', BinaryOp::Add), ('-', BinaryOp::Sub)])
}
