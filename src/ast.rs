use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use strum_macros::EnumDiscriminants;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Query(QueryStatement),
    Insert(InsertStatement),
    CreateTable(CreateTableStatement),
    CreateView(CreateViewStatement),
    Delete(DeleteStatement),
    Update(UpdateStatement),
    Truncate(TruncateStatement),
    Drop(DropStatement),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatement {
    pub query: QueryExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: PathExpr,
    pub columns: Option<Vec<ParseToken>>,
    pub values: Option<Vec<Vec<Expr>>>,
    pub query: Option<QueryExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableStatement {
    pub name: PathExpr,
    pub schema: Option<Vec<ColumnSchema>>,
    pub replace: bool,
    pub is_temporary: bool,
    pub if_not_exists: bool,
    pub query: Option<QueryExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateViewStatement {
    pub name: PathExpr,
    pub replace: bool,
    pub columns: Option<Vec<ParseToken>>,
    pub query: QueryExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: ParseToken,
    pub r#type: DataType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub table: PathExpr,
    pub alias: Option<ParseToken>,
    pub using: Option<From>,
    pub r#where: Option<Where>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItem {
    pub column: ParseToken,
    pub expr: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub table: PathExpr,
    pub alias: Option<ParseToken>,
    pub update_items: Vec<UpdateItem>,
    pub from: Option<From>,
    pub r#where: Option<Where>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateStatement {
    pub table: PathExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DropKind {
    Table,
    View,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropStatement {
    pub kind: DropKind,
    pub name: PathExpr,
    pub if_exists: bool,
}

/// Column or cast target type, kept as normalized text (e.g. `varchar(256)`, `array<int>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Grouping(GroupingExpr),
    Column(ColumnExpr),
    QualifiedStar(ColumnExpr),
    Tuple(Vec<Expr>),
    Array(ArrayExpr),
    String(String),
    Number(String),
    Bool(bool),
    Null,
    Star,
    Parameter(String),
    TypedString(TypedStringExpr),
    Interval(IntervalExpr),
    Between(BetweenExpr),
    Exists(Box<QueryExpr>),
    Query(Box<QueryExpr>),
    Case(CaseExpr),
    Cast(CastExpr),
    Extract(ExtractExpr),
    Function(Box<FunctionExpr>),
}

/// Possibly qualified column reference, e.g. `["s", "orders", "amount"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnExpr {
    pub path: Vec<String>,
}

impl ColumnExpr {
    pub fn name(&self) -> &str {
        self.path.last().map_or("", |s| s.as_str())
    }

    pub fn qualifier(&self) -> Option<String> {
        if self.path.len() > 1 {
            Some(self.path[..self.path.len() - 1].join("."))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseExpr {
    pub case: Option<Box<Expr>>,
    pub when_thens: Vec<(Expr, Expr)>,
    pub r#else: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CastKind {
    Cast,
    TryCast,
    DoubleColon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastExpr {
    pub kind: CastKind,
    pub expr: Box<Expr>,
    pub r#type: DataType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractExpr {
    pub field: String,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedStringExpr {
    pub r#type: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalExpr {
    pub value: Box<Expr>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetweenExpr {
    pub expr: Box<Expr>,
    pub negated: bool,
    pub low: Box<Expr>,
    pub high: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub name: ParseToken,
    pub distinct: bool,
    pub arguments: Vec<Expr>,
    pub order_by: Option<Vec<OrderByExpr>>,
    pub filter: Option<Box<Expr>>,
    pub within_group: Option<Vec<OrderByExpr>>,
    pub over: Option<NamedWindowExpr>,
}

impl FunctionExpr {
    /// Lowercased, unqualified function name.
    pub fn function_name(&self) -> String {
        let name = self.name.identifier();
        name.rsplit('.')
            .next()
            .map_or(name.to_lowercase(), |s| s.to_lowercase())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub operator: ParseToken,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub operator: ParseToken,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingExpr {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayExpr {
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryExpr {
    Grouping(GroupingQueryExpr),
    Select(SelectQueryExpr),
    SetSelect(SetSelectQueryExpr),
}

impl QueryExpr {
    pub fn with(&self) -> Option<&With> {
        match self {
            QueryExpr::Grouping(grouping) => grouping.with.as_ref(),
            QueryExpr::Select(select) => select.with.as_ref(),
            QueryExpr::SetSelect(set_select) => set_select.with.as_ref(),
        }
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        match self {
            QueryExpr::Grouping(grouping) => grouping.order_by.as_ref(),
            QueryExpr::Select(select) => select.order_by.as_ref(),
            QueryExpr::SetSelect(set_select) => set_select.order_by.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingQueryExpr {
    pub with: Option<With>,
    pub query: Box<QueryExpr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectQueryExpr {
    pub with: Option<With>,
    pub select: Select,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSelectQueryExpr {
    pub with: Option<With>,
    pub left_query: Box<QueryExpr>,
    pub set_operator: SetQueryOperator,
    pub right_query: Box<QueryExpr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetQueryOperator {
    Union,
    UnionDistinct,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub exprs: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderBySortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderByNulls {
    First,
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub sort_direction: Option<OrderBySortDirection>,
    pub nulls: Option<OrderByNulls>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limit {
    pub count: Option<Box<Expr>>,
    pub offset: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct With {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub name: ParseToken,
    pub columns: Option<Vec<ParseToken>>,
    pub query: QueryExpr,
}

/// Character offsets `[start, end)` into the scanned source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub distinct_on: Option<Vec<Expr>>,
    pub top: Option<Box<Expr>>,
    pub exprs: Vec<SelectExpr>,
    pub from: Option<From>,
    pub r#where: Option<Where>,
    pub group_by: Option<GroupBy>,
    pub having: Option<Having>,
    pub qualify: Option<Qualify>,
    pub window: Option<Window>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SelectExpr {
    Col(SelectColExpr),
    ColAll(SelectColAllExpr),
    All(SelectAllExpr),
}

impl SelectExpr {
    pub fn span(&self) -> Span {
        match self {
            SelectExpr::Col(col) => col.span,
            SelectExpr::ColAll(col_all) => col_all.span,
            SelectExpr::All(all) => all.span,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectColExpr {
    pub expr: Expr,
    pub alias: Option<ParseToken>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectColAllExpr {
    pub qualifier: ColumnExpr,
    pub except: Option<Vec<ParseToken>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectAllExpr {
    pub except: Option<Vec<ParseToken>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct From {
    pub expr: Box<FromExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromExpr {
    Join(JoinExpr),
    CrossJoin(CrossJoinExpr),
    Path(FromPathExpr),
    TableFunction(TableFunctionExpr),
    GroupingQuery(FromGroupingQueryExpr),
    GroupingFrom(GroupingFromExpr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossJoinExpr {
    pub left: Box<FromExpr>,
    pub right: Box<FromExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinExpr {
    pub kind: JoinKind,
    pub left: Box<FromExpr>,
    pub right: Box<FromExpr>,
    pub cond: JoinCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<ParseToken>),
}

/// Set-returning function in a FROM clause, e.g. `UNNEST(arr) AS t(x)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFunctionExpr {
    pub function: Box<Expr>,
    pub alias: Option<ParseToken>,
    pub columns: Option<Vec<ParseToken>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathExpr {
    pub expr: ParseToken,
}

impl PathExpr {
    /// Dotted name as written, e.g. `catalog.db.table`.
    pub fn name(&self) -> String {
        self.expr.identifier()
    }

    /// Last path component.
    pub fn base_name(&self) -> String {
        let name = self.name();
        name.rsplit('.').next().map_or(name.clone(), str::to_owned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromPathExpr {
    pub path: PathExpr,
    pub alias: Option<ParseToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingFromExpr {
    pub query: Box<FromExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromGroupingQueryExpr {
    pub query: Box<QueryExpr>,
    pub alias: Option<ParseToken>,
    pub columns: Option<Vec<ParseToken>>,
    pub lateral: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Where {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupByExpr {
    Items(Vec<Expr>),
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    pub expr: GroupByExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Having {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qualify {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub named_windows: Vec<NamedWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedWindow {
    pub name: ParseToken,
    pub window: NamedWindowExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NamedWindowExpr {
    Reference(ParseToken),
    WindowSpec(WindowSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub window_name: Option<ParseToken>,
    pub partition_by: Option<Vec<Expr>>,
    pub order_by: Option<Vec<OrderByExpr>>,
    pub frame: Option<WindowFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowFrame {
    pub kind: WindowFrameKind,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(Box<Expr>),
    UnboundedFollowing,
    Following(Box<Expr>),
    CurrentRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WindowFrameKind {
    Range,
    Rows,
    Groups,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParseToken {
    Single(Token),
    Multiple(Vec<Token>),
}

impl ParseToken {
    pub fn lexeme(&self, join_char: Option<&str>) -> String {
        match self {
            ParseToken::Single(token) => token.lexeme.clone(),
            ParseToken::Multiple(vec) => vec
                .iter()
                .map(|tok| tok.lexeme.clone())
                .collect::<Vec<String>>()
                .join(join_char.map_or(" ", |c| c)),
        }
    }

    /// Identifier text with quotes stripped. String literals (`AS 'alias'`) yield their value. Other tokens contribute their lexeme.
    pub fn identifier(&self) -> String {
        fn token_identifier(tok: &Token) -> String {
            match &tok.kind {
                TokenType::Identifier(ident) => ident.to_owned(),
                TokenType::QuotedIdentifier(qident) => qident.to_owned(),
                TokenType::String(str) => str.to_owned(),
                _ => tok.lexeme.to_owned(),
            }
        }

        match self {
            ParseToken::Single(token) => token_identifier(token),
            ParseToken::Multiple(vec) => vec.iter().map(token_identifier).collect::<String>(),
        }
    }
}

#[derive(PartialEq, Clone, Debug, EnumDiscriminants, Serialize, Deserialize)]
#[strum_discriminants(name(TokenTypeVariant))]
pub enum TokenType {
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    Comma,
    Dot,
    Minus,
    Plus,
    Percent,
    BitwiseNot,
    BitwiseOr,
    BitwiseAnd,
    BitwiseXor,
    BitwiseRightShift,
    BitwiseLeftShift,
    Colon,
    DoubleColon,
    Semicolon,
    Slash,
    Star,
    ConcatOperator,
    Bang,
    BangEqual,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    QuotedIdentifier(String),
    Identifier(String),
    String(String),
    Number(String),
    Parameter(String),
    Eof,

    // Reserved Keywords
    All,
    And,
    As,
    Asc,
    Between,
    By,
    Case,
    Cast,
    Create,
    Cross,
    Desc,
    Distinct,
    Else,
    End,
    Except,
    Exists,
    False,
    From,
    Full,
    Group,
    Having,
    In,
    Inner,
    Intersect,
    Interval,
    Into,
    Is,
    Join,
    Left,
    Like,
    Limit,
    Not,
    Null,
    On,
    Or,
    Order,
    Outer,
    Over,
    Partition,
    Qualify,
    Recursive,
    Right,
    Select,
    Set,
    Then,
    True,
    Union,
    Using,
    When,
    Where,
    Window,
    With,
}

impl TokenTypeVariant {
    /// How the token is spelled in SQL, for error messages.
    pub(crate) fn variant_str(&self) -> Cow<'static, str> {
        let symbol = match self {
            TokenTypeVariant::LeftParen => "(",
            TokenTypeVariant::RightParen => ")",
            TokenTypeVariant::LeftSquare => "[",
            TokenTypeVariant::RightSquare => "]",
            TokenTypeVariant::Comma => ",",
            TokenTypeVariant::Dot => ".",
            TokenTypeVariant::Minus => "-",
            TokenTypeVariant::Plus => "+",
            TokenTypeVariant::Percent => "%",
            TokenTypeVariant::BitwiseNot => "~",
            TokenTypeVariant::BitwiseOr => "|",
            TokenTypeVariant::BitwiseAnd => "&",
            TokenTypeVariant::BitwiseXor => "^",
            TokenTypeVariant::BitwiseRightShift => ">>",
            TokenTypeVariant::BitwiseLeftShift => "<<",
            TokenTypeVariant::Colon => ":",
            TokenTypeVariant::DoubleColon => "::",
            TokenTypeVariant::Semicolon => ";",
            TokenTypeVariant::Slash => "/",
            TokenTypeVariant::Star => "*",
            TokenTypeVariant::ConcatOperator => "||",
            TokenTypeVariant::Bang => "!",
            TokenTypeVariant::BangEqual => "!=",
            TokenTypeVariant::Equal => "=",
            TokenTypeVariant::NotEqual => "<>",
            TokenTypeVariant::Greater => ">",
            TokenTypeVariant::GreaterEqual => ">=",
            TokenTypeVariant::Less => "<",
            TokenTypeVariant::LessEqual => "<=",
            TokenTypeVariant::QuotedIdentifier => "quoted identifier",
            TokenTypeVariant::Identifier => "identifier",
            TokenTypeVariant::String => "string",
            TokenTypeVariant::Number => "number",
            TokenTypeVariant::Parameter => "parameter",
            // Keywords are spelled as their variant name
            keyword => return Cow::Owned(format!("{:?}", keyword).to_uppercase()),
        };
        Cow::Borrowed(symbol)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
    pub start: usize,
    pub end: usize,
}
