use log::warn;
use serde::Serialize;

use crate::error::PanelError;

use super::commands::MacroDefinition;

/// Primitive shapes an aperture macro can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    /// Code 1
    Circle,
    /// Code 20 (or the legacy 2)
    VectorLine,
    /// Code 21
    CenterLine,
    /// Code 4
    Outline,
    /// Code 5
    Polygon,
}

impl PrimitiveKind {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(PrimitiveKind::Circle),
            "2" | "20" => Some(PrimitiveKind::VectorLine),
            "21" => Some(PrimitiveKind::CenterLine),
            "4" => Some(PrimitiveKind::Outline),
            "5" => Some(PrimitiveKind::Polygon),
            _ => None,
        }
    }
}

/// One primitive statement, its fields kept as unevaluated expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub exposure: String,
    pub expressions: Vec<String>,
}

/// A primitive with every expression evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedPrimitive {
    pub kind: PrimitiveKind,
    pub exposure: bool,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Primitive(Primitive),
    /// `$n=<expr>`
    Assign { index: usize, expression: String },
}

/// A parsed aperture macro.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    statements: Vec<Statement>,
}

impl Macro {
    pub fn parse(definition: &MacroDefinition) -> Result<Self, PanelError> {
        let mut statements = Vec::new();
        for block in &definition.blocks {
            if let Some(stmt) = parse_statement(block)? {
                statements.push(stmt);
            }
        }
        Ok(Self {
            name: definition.name.clone(),
            statements,
        })
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Primitive(p) => Some(p),
            Statement::Assign { .. } => None,
        })
    }

    /// Evaluate every primitive with the aperture's parameters (`$1` is `params[0]`).
    /// Each call starts from the source text; nothing is cached.
    pub fn eval(&self, params: &[f64]) -> Result<Vec<EvaluatedPrimitive>, PanelError> {
        let mut vars = params.to_vec();
        let mut out = Vec::new();
        for stmt in &self.statements {
            match stmt {
                Statement::Primitive(p) => out.push(p.eval(&vars)?),
                Statement::Assign { index, expression } => {
                    let value = eval_expression(expression, &vars)?;
                    if vars.len() < *index {
                        vars.resize(*index, 0.0);
                    }
                    vars[index - 1] = value;
                }
            }
        }
        Ok(out)
    }
}

impl Primitive {
    pub fn eval(&self, params: &[f64]) -> Result<EvaluatedPrimitive, PanelError> {
        let exposure = eval_expression(&self.exposure, params)?;
        let values = self
            .expressions
            .iter()
            .map(|e| eval_expression(e, params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EvaluatedPrimitive {
            kind: self.kind,
            exposure: (exposure - 1.0).abs() < f64::EPSILON,
            values,
        })
    }
}

fn parse_statement(block: &str) -> Result<Option<Statement>, PanelError> {
    let trimmed = block.trim();
    if trimmed.is_empty() || (trimmed.starts_with('0') && !trimmed.starts_with("0.")) {
        // Code 0 is a comment.
        return Ok(None);
    }

    if let Some(rest) = trimmed.strip_prefix('$') {
        let (index, expression) = rest
            .split_once('=')
            .ok_or_else(|| PanelError::Format(format!("AM: bad statement: {trimmed}")))?;
        let index: usize = index
            .trim()
            .parse()
            .ok()
            .filter(|i| *i > 0)
            .ok_or_else(|| PanelError::Format(format!("AM: bad variable in: {trimmed}")))?;
        return Ok(Some(Statement::Assign {
            index,
            expression: expression.trim().to_string(),
        }));
    }

    let mut fields = trimmed.split(',').map(str::trim);
    let code = fields.next().unwrap_or_default();
    let Some(kind) = PrimitiveKind::from_code(code) else {
        warn!("Skipping unsupported macro primitive with code {code}");
        return Ok(None);
    };
    let exposure = fields
        .next()
        .ok_or_else(|| PanelError::Format(format!("AM: missing exposure in: {trimmed}")))?
        .to_string();
    Ok(Some(Statement::Primitive(Primitive {
        kind,
        exposure,
        expressions: fields.map(str::to_string).collect(),
    })))
}

/// Replace every `$n` with the n-th parameter printed to six decimals.
/// Undefined parameters read as zero.
pub fn substitute(expression: &str, params: &[f64]) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut chars = expression.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.next_if(|c| c.is_ascii_digit()) {
            digits.push(d);
        }
        let value = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i))
            .copied()
            .unwrap_or(0.0);
        out.push_str(&format!("{value:.6}"));
    }
    out
}

/// Substitute parameters into `expression` and evaluate the arithmetic.
pub fn eval_expression(expression: &str, params: &[f64]) -> Result<f64, PanelError> {
    let text = substitute(expression, params);
    let tokens = tokenize_expr(&text)?;
    if tokens.is_empty() {
        return Ok(0.0);
    }
    let (value, rest) = parse_add_sub(&tokens)?;
    if !rest.is_empty() {
        return Err(PanelError::Format(format!(
            "AM expr: unexpected tokens after expression: {text}"
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy)]
enum ExprToken {
    Num(f64),
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
}

fn tokenize_expr(s: &str) -> Result<Vec<ExprToken>, PanelError> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(ExprToken::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(ExprToken::Minus);
            }
            // Gerber multiplies with 'x' because '*' ends the statement.
            'x' | 'X' => {
                chars.next();
                tokens.push(ExprToken::Mul);
            }
            '/' => {
                chars.next();
                tokens.push(ExprToken::Div);
            }
            '(' => {
                chars.next();
                tokens.push(ExprToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprToken::RParen);
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut num_str = String::new();
                while let Some(d) = chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
                    num_str.push(d);
                }
                let val: f64 = num_str.parse().map_err(|_| {
                    PanelError::Format(format!("AM expr: bad number: {num_str}"))
                })?;
                tokens.push(ExprToken::Num(val));
            }
            _ => {
                return Err(PanelError::Format(format!(
                    "AM expr: unexpected char '{ch}' in: {s}"
                )));
            }
        }
    }

    Ok(tokens)
}

// Recursive descent: add/sub -> mul/div -> unary/atom
fn parse_add_sub(tokens: &[ExprToken]) -> Result<(f64, &[ExprToken]), PanelError> {
    let (mut left, mut rest) = parse_mul_div(tokens)?;
    loop {
        match rest.first() {
            Some(ExprToken::Plus) => {
                let (right, r) = parse_mul_div(&rest[1..])?;
                left += right;
                rest = r;
            }
            Some(ExprToken::Minus) => {
                let (right, r) = parse_mul_div(&rest[1..])?;
                left -= right;
                rest = r;
            }
            _ => break,
        }
    }
    Ok((left, rest))
}

fn parse_mul_div(tokens: &[ExprToken]) -> Result<(f64, &[ExprToken]), PanelError> {
    let (mut left, mut rest) = parse_atom(tokens)?;
    loop {
        match rest.first() {
            Some(ExprToken::Mul) => {
                let (right, r) = parse_atom(&rest[1..])?;
                left *= right;
                rest = r;
            }
            Some(ExprToken::Div) => {
                let (right, r) = parse_atom(&rest[1..])?;
                left = if right.abs() < 1e-15 { 0.0 } else { left / right };
                rest = r;
            }
            _ => break,
        }
    }
    Ok((left, rest))
}

fn parse_atom(tokens: &[ExprToken]) -> Result<(f64, &[ExprToken]), PanelError> {
    match tokens.first() {
        Some(ExprToken::Num(v)) => Ok((*v, &tokens[1..])),
        Some(ExprToken::Minus) => {
            let (v, rest) = parse_atom(&tokens[1..])?;
            Ok((-v, rest))
        }
        Some(ExprToken::Plus) => parse_atom(&tokens[1..]),
        Some(ExprToken::LParen) => {
            let (v, rest) = parse_add_sub(&tokens[1..])?;
            match rest.first() {
                Some(ExprToken::RParen) => Ok((v, &rest[1..])),
                _ => Err(PanelError::Format("AM expr: missing closing paren".into())),
            }
        }
        _ => Err(PanelError::Format(
            "AM expr: unexpected end of expression".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn definition(blocks: &[&str]) -> MacroDefinition {
        MacroDefinition {
            name: "TEST".into(),
            blocks: blocks.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn one_to_ten() -> Vec<f64> {
        (1..=10).map(f64::from).collect()
    }

    #[test]
    fn test_outline_with_parameters() {
        let m = Macro::parse(&definition(&["4,1,4,$2,$3,$4,$5,$6,$7,$8+$7,$9,$2,$3,0"])).unwrap();
        let prims = m.eval(&one_to_ten()).unwrap();
        assert_eq!(prims.len(), 1);
        let p = &prims[0];
        assert_eq!(p.kind, PrimitiveKind::Outline);
        assert!(p.exposure);
        assert_eq!(p.values.len(), 12);
        assert_relative_eq!(p.values[0], 4.0);
        assert_relative_eq!(p.values[1], 2.0);
        assert_relative_eq!(p.values[5], 6.0);
        assert_relative_eq!(p.values[7], 15.0);
        assert_relative_eq!(p.values[11], 0.0);
    }

    #[test]
    fn test_circle_with_spaces_and_multiplication() {
        let m = Macro::parse(&definition(&["1 , 0 ,  $2 , $7, $8 x $7,0"])).unwrap();
        let p = &m.eval(&one_to_ten()).unwrap()[0];
        assert_eq!(p.kind, PrimitiveKind::Circle);
        assert!(!p.exposure);
        assert_relative_eq!(p.values[0], 2.0);
        assert_relative_eq!(p.values[1], 7.0);
        assert_relative_eq!(p.values[2], 56.0);
    }

    #[test]
    fn test_comments_and_unknown_codes_skipped() {
        let m = Macro::parse(&definition(&[
            "0 Rounded rectangle",
            "7,0,0,1,0.8,0.1,45",
            "21,1,$1,$2,0,0,0",
        ]))
        .unwrap();
        assert_eq!(m.primitives().count(), 1);
        assert_eq!(
            m.primitives().next().map(|p| p.kind),
            Some(PrimitiveKind::CenterLine)
        );
    }

    #[test]
    fn test_variable_assignment() {
        let m = Macro::parse(&definition(&["$3=$1x2", "1,1,$3,0,0"])).unwrap();
        let p = &m.eval(&[0.5]).unwrap()[0];
        assert_relative_eq!(p.values[0], 1.0);
    }

    #[test]
    fn test_eval_is_fresh_each_call() {
        let m = Macro::parse(&definition(&["1,1,$1,0,0"])).unwrap();
        assert_relative_eq!(m.eval(&[1.0]).unwrap()[0].values[0], 1.0);
        assert_relative_eq!(m.eval(&[3.0]).unwrap()[0].values[0], 3.0);
    }

    #[test]
    fn test_substitute_distinguishes_multi_digit_indices() {
        let params = one_to_ten();
        assert_eq!(substitute("$1+$10", &params), "1.000000+10.000000");
        assert_eq!(substitute("$11", &params), "0.000000");
    }

    #[test]
    fn test_negative_parameters() {
        assert_relative_eq!(eval_expression("$1-$2", &[1.0, -0.5]).unwrap(), 1.5);
        assert_relative_eq!(eval_expression("-$1", &[-2.0]).unwrap(), 2.0);
        assert_relative_eq!(eval_expression("$1x-$2", &[2.0, 3.0]).unwrap(), -6.0);
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_relative_eq!(eval_expression("1+2x3", &[]).unwrap(), 7.0);
        assert_relative_eq!(eval_expression("(1+2)x3", &[]).unwrap(), 9.0);
        assert_relative_eq!(eval_expression("10/4", &[]).unwrap(), 2.5);
        assert!(eval_expression("(1+2", &[]).is_err());
        assert!(eval_expression("1 2", &[]).is_err());
    }

    #[test]
    fn test_bad_statements_fail() {
        assert!(Macro::parse(&definition(&["1"])).is_err());
        assert!(Macro::parse(&definition(&["$0=1"])).is_err());
    }
}
