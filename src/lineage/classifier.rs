use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::ast::{Expr, FrameBound, FunctionExpr, NamedWindowExpr, ParseToken, TokenType};
use crate::dialect::Dialect;
use crate::parser::parse_expression;
use crate::scanner::Scanner;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TransformationType {
    Direct,
    Indirect,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TransformationSubtype {
    Identity,
    Transformation,
    Aggregation,
    Join,
    GroupBy,
    Filter,
    Sort,
    Window,
    Conditional,
}

impl TransformationSubtype {
    /// The transformation type this subtype refines.
    pub fn transformation_type(&self) -> TransformationType {
        match self {
            TransformationSubtype::Identity
            | TransformationSubtype::Transformation
            | TransformationSubtype::Aggregation => TransformationType::Direct,
            _ => TransformationType::Indirect,
        }
    }
}

pub const DIRECT_REFERENCE_DESCRIPTION: &str = "Direct column reference";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
    pub description: String,
}

impl Classification {
    pub fn new(subtype: TransformationSubtype, description: String) -> Self {
        Self {
            transformation_type: subtype.transformation_type(),
            transformation_subtype: subtype,
            description,
        }
    }

    pub fn identity() -> Self {
        Self::new(
            TransformationSubtype::Identity,
            DIRECT_REFERENCE_DESCRIPTION.to_owned(),
        )
    }

    pub fn is_identity(&self) -> bool {
        self.transformation_subtype == TransformationSubtype::Identity
    }
}

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "sum",
    "count",
    "avg",
    "min",
    "max",
    "array_agg",
    "listagg",
    "string_agg",
];

const STRING_FUNCTIONS: &[&str] = &[
    "concat",
    "upper",
    "lower",
    "trim",
    "ltrim",
    "rtrim",
    "substring",
    "substr",
    "replace",
    "coalesce",
    "left",
    "right",
    "lpad",
    "rpad",
];

const DATE_FUNCTIONS: &[&str] = &[
    "dateadd",
    "datediff",
    "date_trunc",
    "to_date",
    "to_timestamp",
    "current_date",
    "current_timestamp",
    "last_day",
    "add_months",
];

const CONDITIONAL_FUNCTIONS: &[&str] = &["if", "iif", "decode"];

/// Which function/operator families occur in an expression.
#[derive(Debug, Default)]
struct ExprFeatures {
    aggregate: bool,
    window: bool,
    string: bool,
    date: bool,
    arithmetic: bool,
    conditional: bool,
}

impl ExprFeatures {
    fn add_function_name(&mut self, name: &str, dialect: Dialect) {
        if AGGREGATE_FUNCTIONS.contains(&name) || dialect.extra_aggregate_functions().contains(&name)
        {
            self.aggregate = true;
        } else if STRING_FUNCTIONS.contains(&name) || dialect.extra_string_functions().contains(&name)
        {
            self.string = true;
        } else if DATE_FUNCTIONS.contains(&name) || dialect.extra_date_functions().contains(&name) {
            self.date = true;
        } else if CONDITIONAL_FUNCTIONS.contains(&name) {
            self.conditional = true;
        }
    }

    fn add_operator(&mut self, operator: &ParseToken) {
        if let ParseToken::Single(tok) = operator {
            match tok.kind {
                TokenType::Plus
                | TokenType::Minus
                | TokenType::Star
                | TokenType::Slash
                | TokenType::Percent => self.arithmetic = true,
                TokenType::ConcatOperator => self.string = true,
                _ => {}
            }
        }
    }

    fn visit_function(&mut self, function: &FunctionExpr, dialect: Dialect) {
        self.add_function_name(&function.function_name(), dialect);
        for arg in &function.arguments {
            self.visit(arg, dialect);
        }
        if let Some(filter) = &function.filter {
            self.visit(filter, dialect);
        }
        for order_by in function
            .order_by
            .iter()
            .chain(function.within_group.iter())
            .flatten()
        {
            self.visit(&order_by.expr, dialect);
        }
        if let Some(over) = &function.over {
            self.window = true;
            if let NamedWindowExpr::WindowSpec(spec) = over {
                for expr in spec.partition_by.iter().flatten() {
                    self.visit(expr, dialect);
                }
                for order_by in spec.order_by.iter().flatten() {
                    self.visit(&order_by.expr, dialect);
                }
                if let Some(frame) = &spec.frame {
                    for bound in std::iter::once(&frame.start).chain(frame.end.iter()) {
                        if let FrameBound::Preceding(expr) | FrameBound::Following(expr) = bound {
                            self.visit(expr, dialect);
                        }
                    }
                }
            }
        }
    }

    fn visit(&mut self, expr: &Expr, dialect: Dialect) {
        match expr {
            Expr::Binary(binary) => {
                self.add_operator(&binary.operator);
                self.visit(&binary.left, dialect);
                self.visit(&binary.right, dialect);
            }
            Expr::Unary(unary) => {
                self.add_operator(&unary.operator);
                self.visit(&unary.right, dialect);
            }
            Expr::Grouping(grouping) => self.visit(&grouping.expr, dialect),
            Expr::Tuple(exprs) => exprs.iter().for_each(|e| self.visit(e, dialect)),
            Expr::Array(array) => array.exprs.iter().for_each(|e| self.visit(e, dialect)),
            Expr::Interval(interval) => self.visit(&interval.value, dialect),
            Expr::Between(between) => {
                self.visit(&between.expr, dialect);
                self.visit(&between.low, dialect);
                self.visit(&between.high, dialect);
            }
            Expr::Case(case) => {
                self.conditional = true;
                if let Some(operand) = &case.case {
                    self.visit(operand, dialect);
                }
                for (when, then) in &case.when_thens {
                    self.visit(when, dialect);
                    self.visit(then, dialect);
                }
                if let Some(r#else) = &case.r#else {
                    self.visit(r#else, dialect);
                }
            }
            // Casts only change the type of a value
            Expr::Cast(cast) => self.visit(&cast.expr, dialect),
            Expr::Extract(extract) => {
                self.date = true;
                self.visit(&extract.expr, dialect);
            }
            Expr::Function(function) => self.visit_function(function, dialect),
            // Subqueries are classified on their own
            Expr::Exists(_) | Expr::Query(_) => {}
            Expr::Column(_)
            | Expr::QualifiedStar(_)
            | Expr::String(_)
            | Expr::Number(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Star
            | Expr::Parameter(_)
            | Expr::TypedString(_) => {}
        }
    }

    fn classification(&self, text: &str) -> Classification {
        let (subtype, description) = if self.aggregate {
            (
                TransformationSubtype::Aggregation,
                format!("Aggregated: {}", text),
            )
        } else if self.window {
            (
                TransformationSubtype::Window,
                format!("Window function: {}", text),
            )
        } else if self.string {
            (
                TransformationSubtype::Transformation,
                format!("Transformed: {}", text),
            )
        } else if self.date {
            (
                TransformationSubtype::Transformation,
                format!("Date transformation: {}", text),
            )
        } else if self.arithmetic {
            (
                TransformationSubtype::Transformation,
                format!("Calculated: {}", text),
            )
        } else if self.conditional {
            (
                TransformationSubtype::Conditional,
                format!("Conditional: {}", text),
            )
        } else {
            return Classification::identity();
        };
        Classification::new(subtype, description)
    }
}

/// Classifies the whole expression `expr`, whose source text is `text`.
pub fn classify_expr(expr: &Expr, text: &str, dialect: Dialect) -> Classification {
    let mut features = ExprFeatures::default();
    features.visit(expr, dialect);
    features.classification(text)
}

/// Classifies expression text. Text the parser rejects is classified from its tokens,
/// and text that cannot even be scanned is a direct reference.
pub fn classify_sql_expression(text: &str, dialect: Dialect) -> Classification {
    let text = text.trim();
    match parse_expression(text, dialect) {
        Ok(expr) => classify_expr(&expr, text, dialect),
        Err(err) => {
            log::debug!("Classifying `{}` from tokens: {}", text, err);
            let mut scanner = Scanner::new(text, dialect);
            if scanner.scan().is_err() {
                return Classification::identity();
            }
            let tokens = scanner.tokens();
            let mut features = ExprFeatures::default();
            for (i, tok) in tokens.iter().enumerate() {
                let next_is_paren = tokens
                    .get(i + 1)
                    .is_some_and(|next| next.kind == TokenType::LeftParen);
                match &tok.kind {
                    TokenType::Identifier(name) | TokenType::QuotedIdentifier(name)
                        if next_is_paren =>
                    {
                        features.add_function_name(&name.to_lowercase(), dialect);
                    }
                    TokenType::Left | TokenType::Right if next_is_paren => features.string = true,
                    TokenType::Over => features.window = true,
                    TokenType::Case => features.conditional = true,
                    _ => features.add_operator(&ParseToken::Single(tok.clone())),
                }
            }
            features.classification(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TransformationSubtype, TransformationType, classify_sql_expression};
    use crate::dialect::Dialect;

    fn subtype(text: &str) -> TransformationSubtype {
        classify_sql_expression(text, Dialect::Redshift).transformation_subtype
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(subtype("SUM(UPPER(a))"), TransformationSubtype::Aggregation);
        assert_eq!(subtype("SUM(a) OVER (PARTITION BY b)"), TransformationSubtype::Aggregation);
        assert_eq!(subtype("ROW_NUMBER() OVER (ORDER BY a)"), TransformationSubtype::Window);
        assert_eq!(subtype("COALESCE(a, b) + 1"), TransformationSubtype::Transformation);
        assert_eq!(subtype("CASE WHEN a > 0 THEN a * 2 END"), TransformationSubtype::Transformation);
        assert_eq!(subtype("CASE WHEN a > 0 THEN b END"), TransformationSubtype::Conditional);
        assert_eq!(subtype("t.a"), TransformationSubtype::Identity);
    }

    #[test]
    fn test_descriptions() {
        let classification = classify_sql_expression("UPPER(name)", Dialect::Redshift);
        assert_eq!(classification.description, "Transformed: UPPER(name)");
        assert_eq!(classification.transformation_type, TransformationType::Direct);

        let classification = classify_sql_expression("DATEADD(day, 1, ts)", Dialect::Redshift);
        assert_eq!(classification.description, "Date transformation: DATEADD(day, 1, ts)");

        let classification = classify_sql_expression("a - b", Dialect::Redshift);
        assert_eq!(classification.description, "Calculated: a - b");

        let classification = classify_sql_expression("id", Dialect::Redshift);
        assert_eq!(classification.description, "Direct column reference");
    }

    #[test]
    fn test_cast_is_transparent() {
        assert_eq!(subtype("CAST(a AS varchar)"), TransformationSubtype::Identity);
        assert_eq!(subtype("a::int"), TransformationSubtype::Identity);
        assert_eq!(subtype("CAST(a + 1 AS int)"), TransformationSubtype::Transformation);
    }

    #[test]
    fn test_literals_do_not_count_as_operators() {
        assert_eq!(subtype("'2024-01-01'"), TransformationSubtype::Identity);
        assert_eq!(subtype("a || '-' || b"), TransformationSubtype::Transformation);
    }

    #[test]
    fn test_dialect_specific_function_names() {
        assert_eq!(
            classify_sql_expression("approx_distinct(user_id)", Dialect::Presto)
                .transformation_subtype,
            TransformationSubtype::Aggregation
        );
        assert_eq!(
            classify_sql_expression("approx_distinct(user_id)", Dialect::Postgres)
                .transformation_subtype,
            TransformationSubtype::Identity
        );
    }

    #[test]
    fn test_classification_is_total() {
        for text in ["", "(((", "SUM(", "'unterminated", "CASE WHEN", "a +", "🙂"] {
            let classification = classify_sql_expression(text, Dialect::Redshift);
            assert_eq!(
                classification.transformation_type,
                classification.transformation_subtype.transformation_type()
            );
        }
        assert_eq!(subtype("SUM("), TransformationSubtype::Aggregation);
        assert_eq!(subtype("a +"), TransformationSubtype::Transformation);
    }

    #[test]
    fn test_subtype_wire_names() {
        assert_eq!(TransformationSubtype::GroupBy.to_string(), "GROUP_BY");
        assert_eq!(
            serde_json::to_string(&TransformationType::Indirect).unwrap(),
            "\"INDIRECT\""
        );
        assert_eq!(
            "group_by".parse::<TransformationSubtype>().unwrap(),
            TransformationSubtype::GroupBy
        );
    }
}
