// dqcheck-core/src/domain/evaluation/expression.rs
//
// Sandbox for `custom` rules. The logic is parsed as a SQL expression and
// lowered into a small tree that is interpreted in-process. Anything outside
// the allow-list below is refused at parse time.

use regex::Regex;
use sqlparser::ast::{
    BinaryOperator, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments,
    UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::domain::data::{Row, Value};
use crate::domain::error::DomainError;
use crate::domain::rules::{Aggregation, ComparisonOperator};

/// Where an expression is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Row,
    Dataset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarFn {
    Lower,
    Upper,
    Trim,
    Length,
    Abs,
    Round,
    Coalesce,
}

impl ScalarFn {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            "trim" => Some(Self::Trim),
            "length" | "len" => Some(Self::Length),
            "abs" => Some(Self::Abs),
            "round" => Some(Self::Round),
            "coalesce" => Some(Self::Coalesce),
            _ => None,
        }
    }

    fn accepts(&self, arity: usize) -> bool {
        match self {
            Self::Round => (1..=2).contains(&arity),
            Self::Coalesce => arity >= 1,
            _ => arity == 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Column(String),
    Literal(Value),
    Negate(Box<Node>),
    Not(Box<Node>),
    Arith(ArithOp, Box<Node>, Box<Node>),
    Concat(Box<Node>, Box<Node>),
    Compare(ComparisonOperator, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    IsNull {
        node: Box<Node>,
        negated: bool,
    },
    Between {
        node: Box<Node>,
        low: Box<Node>,
        high: Box<Node>,
        negated: bool,
    },
    InList {
        node: Box<Node>,
        list: Vec<Node>,
        negated: bool,
    },
    Like {
        node: Box<Node>,
        matcher: Regex,
        negated: bool,
    },
    Call(ScalarFn, Vec<Node>),
    Aggregate(Aggregation, Option<String>),
}

/// Source of aggregate values during dataset-scope evaluation.
pub type AggregateLookup<'a> = &'a dyn Fn(Aggregation, Option<&str>) -> Option<f64>;

enum Context<'a> {
    Row(&'a Row),
    Dataset(AggregateLookup<'a>),
}

/// A validated `rule_logic` expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
    scope: Scope,
}

impl Expression {
    pub fn parse(logic: &str) -> Result<Self, DomainError> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(logic)
            .map_err(|e| invalid(format!("cannot parse rule_logic: {}", e)))?;
        let expr = parser
            .parse_expr()
            .map_err(|e| invalid(format!("cannot parse rule_logic: {}", e)))?;
        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(invalid(format!(
                "unexpected '{}' after the expression",
                trailing.token
            )));
        }

        let root = lower(&expr)?;

        let mut shape = Shape::default();
        shape.visit(&root);
        if shape.aggregate && shape.bare_column {
            return Err(invalid(
                "rule_logic mixes aggregate functions with row columns".to_string(),
            ));
        }

        Ok(Self {
            source: logic.trim().to_string(),
            root,
            scope: if shape.aggregate {
                Scope::Dataset
            } else {
                Scope::Row
            },
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Every column referenced, inside aggregates or not.
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_columns(&self.root, &mut out);
        out
    }

    /// Distinct aggregate calls; `None` column means `count(*)`.
    pub fn aggregates(&self) -> Vec<(Aggregation, Option<String>)> {
        let mut out = Vec::new();
        collect_aggregates(&self.root, &mut out);
        out
    }

    pub fn evaluate_row(&self, row: &Row) -> Result<Value, String> {
        eval(&self.root, &Context::Row(row))
    }

    pub fn evaluate_dataset(&self, lookup: AggregateLookup<'_>) -> Result<Value, String> {
        eval(&self.root, &Context::Dataset(lookup))
    }
}

fn invalid(message: String) -> DomainError {
    DomainError::InvalidRule(message)
}

fn unsupported(what: impl std::fmt::Display) -> DomainError {
    invalid(format!("'{}' is not allowed in rule_logic", what))
}

#[derive(Default)]
struct Shape {
    aggregate: bool,
    bare_column: bool,
}

impl Shape {
    fn visit(&mut self, node: &Node) {
        match node {
            Node::Column(_) => self.bare_column = true,
            Node::Aggregate(..) => self.aggregate = true,
            other => children(other).into_iter().for_each(|c| self.visit(c)),
        }
    }
}

fn children(node: &Node) -> Vec<&Node> {
    match node {
        Node::Column(_) | Node::Literal(_) | Node::Aggregate(..) => vec![],
        Node::Negate(n) | Node::Not(n) => vec![n.as_ref()],
        Node::Arith(_, l, r)
        | Node::Concat(l, r)
        | Node::Compare(_, l, r)
        | Node::And(l, r)
        | Node::Or(l, r) => vec![l.as_ref(), r.as_ref()],
        Node::IsNull { node, .. } | Node::Like { node, .. } => vec![node.as_ref()],
        Node::Between {
            node, low, high, ..
        } => vec![node.as_ref(), low.as_ref(), high.as_ref()],
        Node::InList { node, list, .. } => std::iter::once(node.as_ref()).chain(list).collect(),
        Node::Call(_, args) => args.iter().collect(),
    }
}

fn collect_columns(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::Column(c) | Node::Aggregate(_, Some(c)) => {
            if !out.contains(c) {
                out.push(c.clone());
            }
        }
        other => children(other)
            .into_iter()
            .for_each(|c| collect_columns(c, out)),
    }
}

fn collect_aggregates(node: &Node, out: &mut Vec<(Aggregation, Option<String>)>) {
    match node {
        Node::Aggregate(agg, col) => {
            let key = (*agg, col.clone());
            if !out.contains(&key) {
                out.push(key);
            }
        }
        other => children(other)
            .into_iter()
            .for_each(|c| collect_aggregates(c, out)),
    }
}

// --- Lowering -------------------------------------------------------------

fn lower(expr: &Expr) -> Result<Node, DomainError> {
    match expr {
        Expr::Identifier(ident) => Ok(Node::Column(ident.value.clone())),
        Expr::Value(v) => literal(&v.value).map(Node::Literal),
        Expr::Nested(inner) => lower(inner),
        Expr::UnaryOp { op, expr } => {
            let inner = Box::new(lower(expr)?);
            match op {
                UnaryOperator::Not => Ok(Node::Not(inner)),
                UnaryOperator::Minus => Ok(Node::Negate(inner)),
                UnaryOperator::Plus => Ok(*inner),
                other => Err(unsupported(other)),
            }
        }
        Expr::BinaryOp { left, op, right } => {
            let l = Box::new(lower(left)?);
            let r = Box::new(lower(right)?);
            let node = match op {
                BinaryOperator::Plus => Node::Arith(ArithOp::Add, l, r),
                BinaryOperator::Minus => Node::Arith(ArithOp::Sub, l, r),
                BinaryOperator::Multiply => Node::Arith(ArithOp::Mul, l, r),
                BinaryOperator::Divide => Node::Arith(ArithOp::Div, l, r),
                BinaryOperator::Modulo => Node::Arith(ArithOp::Mod, l, r),
                BinaryOperator::StringConcat => Node::Concat(l, r),
                BinaryOperator::Lt => Node::Compare(ComparisonOperator::Lt, l, r),
                BinaryOperator::LtEq => Node::Compare(ComparisonOperator::Le, l, r),
                BinaryOperator::Gt => Node::Compare(ComparisonOperator::Gt, l, r),
                BinaryOperator::GtEq => Node::Compare(ComparisonOperator::Ge, l, r),
                BinaryOperator::Eq => Node::Compare(ComparisonOperator::Eq, l, r),
                BinaryOperator::NotEq => Node::Compare(ComparisonOperator::Ne, l, r),
                BinaryOperator::And => Node::And(l, r),
                BinaryOperator::Or => Node::Or(l, r),
                other => return Err(unsupported(other)),
            };
            Ok(node)
        }
        Expr::IsNull(inner) => Ok(Node::IsNull {
            node: Box::new(lower(inner)?),
            negated: false,
        }),
        Expr::IsNotNull(inner) => Ok(Node::IsNull {
            node: Box::new(lower(inner)?),
            negated: true,
        }),
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Node::Between {
            node: Box::new(lower(expr)?),
            low: Box::new(lower(low)?),
            high: Box::new(lower(high)?),
            negated: *negated,
        }),
        Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Node::InList {
            node: Box::new(lower(expr)?),
            list: list.iter().map(lower).collect::<Result<_, _>>()?,
            negated: *negated,
        }),
        Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if escape_char.is_some() {
                return Err(unsupported("LIKE ... ESCAPE"));
            }
            like(expr, pattern, *negated, false)
        }
        Expr::ILike {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if escape_char.is_some() {
                return Err(unsupported("ILIKE ... ESCAPE"));
            }
            like(expr, pattern, *negated, true)
        }
        Expr::Function(f) => function(f),
        other => Err(unsupported(other)),
    }
}

fn literal(value: &SqlValue) -> Result<Value, DomainError> {
    match value {
        SqlValue::Number(n, _) => n
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| n.parse::<f64>().map(Value::Float))
            .map_err(|_| invalid(format!("bad numeric literal '{}'", n))),
        SqlValue::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
        SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(unsupported(other)),
    }
}

fn like(expr: &Expr, pattern: &Expr, negated: bool, insensitive: bool) -> Result<Node, DomainError> {
    let Expr::Value(v) = pattern else {
        return Err(invalid("LIKE pattern must be a string literal".to_string()));
    };
    let SqlValue::SingleQuotedString(p) = &v.value else {
        return Err(invalid("LIKE pattern must be a string literal".to_string()));
    };

    let mut source = String::from(if insensitive { "(?is)^" } else { "(?s)^" });
    for c in p.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    let matcher = Regex::new(&source).map_err(|e| invalid(format!("bad LIKE pattern: {}", e)))?;
    Ok(Node::Like {
        node: Box::new(lower(expr)?),
        matcher,
        negated,
    })
}

fn function(f: &Function) -> Result<Node, DomainError> {
    let name = f.name.to_string().to_lowercase();
    if f.over.is_some()
        || f.filter.is_some()
        || !f.within_group.is_empty()
        || !matches!(f.parameters, FunctionArguments::None)
    {
        return Err(unsupported(format!("{} with window/filter clauses", name)));
    }
    let FunctionArguments::List(list) = &f.args else {
        return Err(unsupported(&name));
    };
    if list.duplicate_treatment.is_some() || !list.clauses.is_empty() {
        return Err(unsupported(format!("{} with DISTINCT/ORDER BY arguments", name)));
    }

    if let Ok(aggregation) = name.parse::<Aggregation>() {
        let column = match list.args.as_slice() {
            [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)]
                if aggregation == Aggregation::Count =>
            {
                None
            }
            [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Identifier(ident)))] => {
                Some(ident.value.clone())
            }
            _ => {
                return Err(invalid(format!(
                    "aggregate '{}' takes exactly one column",
                    name
                )));
            }
        };
        return Ok(Node::Aggregate(aggregation, column));
    }

    let func = ScalarFn::from_name(&name).ok_or_else(|| unsupported(format!("function {}", name)))?;
    let args = list
        .args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => lower(e),
            other => Err(unsupported(other)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if !func.accepts(args.len()) {
        return Err(invalid(format!(
            "wrong number of arguments for {} ({})",
            name,
            args.len()
        )));
    }
    Ok(Node::Call(func, args))
}

// --- Interpretation -------------------------------------------------------

fn eval(node: &Node, ctx: &Context<'_>) -> Result<Value, String> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Column(name) => match ctx {
            Context::Row(row) => row
                .get(name)
                .cloned()
                .ok_or_else(|| format!("unknown column '{}'", name)),
            Context::Dataset(_) => Err(format!("column '{}' used outside an aggregate", name)),
        },
        Node::Aggregate(agg, column) => match ctx {
            Context::Dataset(lookup) => Ok(lookup(*agg, column.as_deref())
                .map(Value::Float)
                .unwrap_or(Value::Null)),
            Context::Row(_) => Err(format!("aggregate {} used in row scope", agg)),
        },
        Node::Negate(inner) => match eval(inner, ctx)? {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(i as f64)))),
            other => number(&other).map(|n| Value::Float(-n)),
        },
        Node::Not(inner) => Ok(match truth(eval(inner, ctx)?)? {
            Some(b) => Value::Bool(!b),
            None => Value::Null,
        }),
        Node::And(l, r) => {
            let l = truth(eval(l, ctx)?)?;
            if l == Some(false) {
                return Ok(Value::Bool(false));
            }
            let r = truth(eval(r, ctx)?)?;
            Ok(match (l, r) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            })
        }
        Node::Or(l, r) => {
            let l = truth(eval(l, ctx)?)?;
            if l == Some(true) {
                return Ok(Value::Bool(true));
            }
            let r = truth(eval(r, ctx)?)?;
            Ok(match (l, r) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            })
        }
        Node::Arith(op, l, r) => arith(*op, eval(l, ctx)?, eval(r, ctx)?),
        Node::Concat(l, r) => {
            let (l, r) = (eval(l, ctx)?, eval(r, ctx)?);
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Text(format!("{}{}", l, r)))
        }
        Node::Compare(op, l, r) => {
            let (l, r) = (eval(l, ctx)?, eval(r, ctx)?);
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Bool(compare(*op, &l, &r)))
        }
        Node::IsNull { node, negated } => {
            let is_null = eval(node, ctx)?.is_null();
            Ok(Value::Bool(is_null != *negated))
        }
        Node::Between {
            node,
            low,
            high,
            negated,
        } => {
            let v = eval(node, ctx)?;
            let (lo, hi) = (eval(low, ctx)?, eval(high, ctx)?);
            if v.is_null() || lo.is_null() || hi.is_null() {
                return Ok(Value::Null);
            }
            let inside = compare(ComparisonOperator::Ge, &v, &lo)
                && compare(ComparisonOperator::Le, &v, &hi);
            Ok(Value::Bool(inside != *negated))
        }
        Node::InList {
            node,
            list,
            negated,
        } => {
            let v = eval(node, ctx)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let item = eval(item, ctx)?;
                if item.is_null() {
                    saw_null = true;
                } else if compare(ComparisonOperator::Eq, &v, &item) {
                    return Ok(Value::Bool(!*negated));
                }
            }
            Ok(if saw_null {
                Value::Null
            } else {
                Value::Bool(*negated)
            })
        }
        Node::Like {
            node,
            matcher,
            negated,
        } => {
            let v = eval(node, ctx)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Bool(matcher.is_match(&v.to_string()) != *negated))
        }
        Node::Call(func, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            call(*func, args)
        }
    }
}

fn truth(value: Value) -> Result<Option<bool>, String> {
    match value {
        Value::Bool(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

fn number(value: &Value) -> Result<f64, String> {
    value
        .as_number()
        .ok_or_else(|| format!("expected a number, got '{}'", value))
}

fn arith(op: ArithOp, l: Value, r: Value) -> Result<Value, String> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        let exact = match op {
            ArithOp::Add => a.checked_add(*b),
            ArithOp::Sub => a.checked_sub(*b),
            ArithOp::Mul => a.checked_mul(*b),
            ArithOp::Div | ArithOp::Mod => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }

    let (a, b) = (number(&l)?, number(&r)?);
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div | ArithOp::Mod if b == 0.0 => return Err("division by zero".to_string()),
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
    };
    Ok(Value::Float(result))
}

/// Numbers compare numerically, dates chronologically, everything else as text.
fn compare(op: ComparisonOperator, l: &Value, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
        return op.compare(a, b);
    }
    if let (Some(a), Some(b)) = (l.as_datetime(), r.as_datetime()) {
        return op.compare_ord(&a, &b);
    }
    op.compare_ord(&l.to_string(), &r.to_string())
}

fn call(func: ScalarFn, args: Vec<Value>) -> Result<Value, String> {
    if func == ScalarFn::Coalesce {
        return Ok(args
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null));
    }

    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Value::Null);
    if first.is_null() {
        return Ok(Value::Null);
    }

    match func {
        ScalarFn::Lower => Ok(Value::Text(first.to_string().to_lowercase())),
        ScalarFn::Upper => Ok(Value::Text(first.to_string().to_uppercase())),
        ScalarFn::Trim => Ok(Value::Text(first.to_string().trim().to_string())),
        ScalarFn::Length => Ok(Value::Int(first.to_string().chars().count() as i64)),
        ScalarFn::Abs => match first {
            Value::Int(i) => Ok(i
                .checked_abs()
                .map(Value::Int)
                .unwrap_or(Value::Float((i as f64).abs()))),
            other => number(&other).map(|n| Value::Float(n.abs())),
        },
        ScalarFn::Round => {
            let digits = match args.next() {
                None => 0,
                Some(Value::Null) => return Ok(Value::Null),
                Some(d) => number(&d)? as i32,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Float((number(&first)? * factor).round() / factor))
        }
        ScalarFn::Coalesce => Ok(first),
    }
}
