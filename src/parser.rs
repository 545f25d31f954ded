use anyhow::anyhow;
use strum::IntoDiscriminant;

use crate::ast::{
    ArrayExpr, Ast, BetweenExpr, BinaryExpr, CaseExpr, CastExpr, CastKind, ColumnExpr,
    ColumnSchema, CreateTableStatement, CreateViewStatement, CrossJoinExpr, Cte, DataType,
    DeleteStatement, DropKind, DropStatement, Expr, ExtractExpr, FrameBound, From, FromExpr,
    FromGroupingQueryExpr, FromPathExpr, FunctionExpr, GroupBy, GroupByExpr, GroupingExpr,
    GroupingFromExpr, GroupingQueryExpr, Having, InsertStatement, IntervalExpr, JoinCondition,
    JoinExpr, JoinKind, Limit, NamedWindow, NamedWindowExpr, OrderBy, OrderByExpr, OrderByNulls,
    OrderBySortDirection, ParseToken, PathExpr, Qualify, QueryExpr, QueryStatement, Select,
    SelectAllExpr, SelectColAllExpr, SelectColExpr, SelectExpr, SelectQueryExpr,
    SetQueryOperator, SetSelectQueryExpr, Span, Statement, TableFunctionExpr, Token, TokenType,
    TokenTypeVariant, TruncateStatement, TypedStringExpr, UnaryExpr, UpdateItem,
    UpdateStatement, Where, Window, WindowFrame, WindowFrameKind, WindowSpec, With,
};
use crate::dialect::Dialect;
use crate::scanner::Scanner;

/// Non-reserved words that never act as an implicit alias.
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "minus",
    "offset",
    "fetch",
    "natural",
    "lateral",
    "returning",
    "ilike",
    "tablesample",
    "pivot",
    "unpivot",
];

const INTERVAL_UNITS: &[&str] = &[
    "year",
    "years",
    "quarter",
    "quarters",
    "month",
    "months",
    "week",
    "weeks",
    "day",
    "days",
    "hour",
    "hours",
    "minute",
    "minutes",
    "second",
    "seconds",
    "millisecond",
    "milliseconds",
    "microsecond",
    "microseconds",
];

const TYPED_STRING_PREFIXES: &[&str] = &["date", "time", "timestamp", "timestamptz", "datetime"];

const NILADIC_FUNCTIONS: &[&str] = &[
    "current_date",
    "current_time",
    "current_timestamp",
    "localtime",
    "localtimestamp",
    "sysdate",
];

pub struct Parser<'a> {
    source_tokens: &'a Vec<Token>,
    dialect: Dialect,
    curr: usize,
}

fn binary(left: Expr, operator: ParseToken, right: Expr) -> Expr {
    Expr::Binary(BinaryExpr {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    })
}

fn is_keyword(token: &Token) -> bool {
    !matches!(
        token.kind,
        TokenType::Identifier(_)
            | TokenType::QuotedIdentifier(_)
            | TokenType::String(_)
            | TokenType::Number(_)
            | TokenType::Parameter(_)
            | TokenType::Eof
    ) && token
        .lexeme
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_')
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a Vec<Token>, dialect: Dialect) -> Parser<'a> {
        Self {
            source_tokens: tokens,
            dialect,
            curr: 0,
        }
    }

    pub fn parse(&mut self) -> anyhow::Result<Ast> {
        self.parse_query()
    }

    fn peek_prev(&self) -> &Token {
        &self.source_tokens[self.curr.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        &self.source_tokens[self.curr]
    }

    fn peek_next_i(&self, i: usize) -> &Token {
        let last = self.source_tokens.len() - 1; // Eof
        &self.source_tokens[std::cmp::min(self.curr + i, last)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            // Do not advance if we peek Eof
            self.curr += 1;
        }
        self.peek_prev()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }

    fn check_token_type(&self, token_type: TokenTypeVariant) -> bool {
        self.peek().kind.discriminant() == token_type
    }

    fn match_token_type(&mut self, token_type: TokenTypeVariant) -> bool {
        if self.check_token_type(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_token_types(&mut self, token_types: &[TokenTypeVariant]) -> bool {
        for tok in token_types {
            if self.check_token_type(*tok) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check_non_reserved_keyword(&self, value: &str) -> bool {
        match &self.peek().kind {
            TokenType::Identifier(ident) => ident.eq_ignore_ascii_case(value),
            _ => false,
        }
    }

    fn check_next_non_reserved_keyword(&self, i: usize, value: &str) -> bool {
        match &self.peek_next_i(i).kind {
            TokenType::Identifier(ident) => ident.eq_ignore_ascii_case(value),
            _ => false,
        }
    }

    fn check_identifier(&self) -> bool {
        self.check_token_type(TokenTypeVariant::Identifier)
            || self.check_token_type(TokenTypeVariant::QuotedIdentifier)
    }

    fn match_non_reserved_keyword(&mut self, value: &str) -> bool {
        if self.check_non_reserved_keyword(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_non_reserved_keyword(&mut self, value: &str) -> anyhow::Result<&Token> {
        if self.check_non_reserved_keyword(value) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", value.to_uppercase());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume_one_of_non_reserved_keywords(&mut self, values: &[&str]) -> anyhow::Result<&Token> {
        for value in values {
            if self.check_non_reserved_keyword(value) {
                return Ok(self.advance());
            }
        }
        let err_msg = values
            .iter()
            .map(|el| format!("`{}`", el.to_uppercase()))
            .collect::<Vec<String>>()
            .join(" or ");
        Err(anyhow!(self.error(
            self.peek(),
            &format!("Expected one of: {}.", err_msg)
        )))
    }

    fn consume(&mut self, token_type: TokenTypeVariant) -> anyhow::Result<&Token> {
        if self.check_token_type(token_type) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", token_type.variant_str());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume_identifier(&mut self) -> anyhow::Result<&Token> {
        self.consume_one_of(&[
            TokenTypeVariant::Identifier,
            TokenTypeVariant::QuotedIdentifier,
        ])
    }

    fn consume_one_of(&mut self, token_types: &[TokenTypeVariant]) -> anyhow::Result<&Token> {
        for token_type in token_types {
            if self.check_token_type(*token_type) {
                return Ok(self.advance());
            }
        }
        let err_msg = token_types
            .iter()
            .map(|el| format!("`{}`", el.variant_str()))
            .collect::<Vec<String>>()
            .join(" or ");
        Err(anyhow!(self.error(
            self.peek(),
            &format!("Expected one of: {}.", err_msg)
        )))
    }

    fn error(&self, token: &Token, message: &str) -> String {
        format!(
            "[line {}, col {}] Error {}: {}",
            token.line,
            token.col,
            &format!("at '{}'", token.lexeme),
            message
        )
    }

    // identifier_list -> "(" ("Identifier" | "QuotedIdentifier") ("," ("Identifier" | "QuotedIdentifier"))* ")"
    fn parse_identifier_list(&mut self) -> anyhow::Result<Vec<ParseToken>> {
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut identifiers = vec![];
        loop {
            identifiers.push(ParseToken::Single(self.consume_identifier()?.clone()));
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(identifiers)
    }

    /// Skips tokens up to the next `,` or `)` at the current nesting level.
    fn skip_list_item(&mut self) -> anyhow::Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenType::Eof => {
                    return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
                }
                TokenType::Comma | TokenType::RightParen if depth == 0 => return Ok(()),
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    /// Skips storage options between a table name and its `AS` query
    /// (`DISTKEY(...)`, `WITH (format = 'PARQUET')`, `STORED AS ...`, ...).
    fn skip_table_options(&mut self) {
        let mut depth = 0usize;
        loop {
            let kind = &self.peek().kind;
            if depth == 0 {
                match kind {
                    TokenType::As | TokenType::Select | TokenType::Semicolon | TokenType::Eof => {
                        break;
                    }
                    TokenType::With if self.peek_next_i(1).kind != TokenType::LeftParen => break,
                    _ => {}
                }
            }
            match kind {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => depth = depth.saturating_sub(1),
                TokenType::Eof => break,
                _ => {}
            }
            self.advance();
        }
    }

    // query -> statement (";" statement)* [";"]
    fn parse_query(&mut self) -> anyhow::Result<Ast> {
        let mut statements = vec![];

        loop {
            while self.match_token_type(TokenTypeVariant::Semicolon) {}
            if self.check_token_type(TokenTypeVariant::Eof) {
                break;
            }

            statements.push(self.parse_statement()?);

            if !self.match_token_type(TokenTypeVariant::Semicolon) {
                break;
            }
        }

        self.consume(TokenTypeVariant::Eof)?;
        Ok(Ast { statements })
    }

    fn parse_statement(&mut self) -> anyhow::Result<Statement> {
        let peek = self.peek();

        let statement = match &peek.kind {
            TokenType::Create => self.parse_create_statement()?,
            TokenType::Identifier(non_reserved_keyword) => {
                match non_reserved_keyword.to_lowercase().as_str() {
                    "insert" => self.parse_insert_statement()?,
                    "delete" => self.parse_delete_statement()?,
                    "update" => self.parse_update_statement()?,
                    "truncate" => self.parse_truncate_statement()?,
                    "drop" => self.parse_drop_statement()?,
                    _ => {
                        return Err(anyhow!(self.error(
                            peek,
                            &format!(
                                "Unexpected non reserved keyword: `{}`.",
                                non_reserved_keyword
                            ),
                        )));
                    }
                }
            }
            _ => self.parse_query_statement()?,
        };
        Ok(statement)
    }

    // query_statement -> query_expr
    fn parse_query_statement(&mut self) -> anyhow::Result<Statement> {
        let query_expr = self.parse_query_expr()?;
        Ok(Statement::Query(QueryStatement { query: query_expr }))
    }

    // create_statement -> "CREATE" ["OR" "REPLACE"] [["LOCAL"] ("TEMP" | "TEMPORARY")] ["EXTERNAL"] (create_table | create_view)
    fn parse_create_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume(TokenTypeVariant::Create)?;
        let replace = self.match_token_type(TokenTypeVariant::Or);
        if replace {
            self.consume_non_reserved_keyword("replace")?;
        }

        self.match_non_reserved_keyword("local");
        let is_temporary =
            self.match_non_reserved_keyword("temp") || self.match_non_reserved_keyword("temporary");
        self.match_non_reserved_keyword("external");
        let materialized = self.match_non_reserved_keyword("materialized");

        if self.check_non_reserved_keyword("view") {
            self.parse_create_view_statement(replace)
        } else if materialized {
            Err(anyhow!(self.error(self.peek(), "Expected `VIEW`.")))
        } else {
            self.parse_create_table_statement(replace, is_temporary)
        }
    }

    // create_table -> "TABLE" ["IF" "NOT" "EXISTS"] path
    // ["(" column_schema ("," column_schema)* ")"]
    // [table_options]
    // [["AS"] query_expr]
    // where:
    // column_schema -> ("Identifier" | "QuotedIdentifier") data_type [column_constraints]
    fn parse_create_table_statement(
        &mut self,
        replace: bool,
        is_temporary: bool,
    ) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("table")?;

        let if_not_exists = self.match_non_reserved_keyword("if");
        if if_not_exists {
            self.consume(TokenTypeVariant::Not)?;
            self.consume(TokenTypeVariant::Exists)?;
        }

        let name = self.parse_path()?;

        let schema = if self.check_token_type(TokenTypeVariant::LeftParen)
            && !matches!(
                self.peek_next_i(1).kind,
                TokenType::Select | TokenType::With
            ) {
            self.advance();
            let mut column_schema = vec![];
            loop {
                let is_table_constraint = ["primary", "unique", "foreign", "constraint", "check"]
                    .iter()
                    .any(|kw| self.check_non_reserved_keyword(kw));
                if is_table_constraint || self.check_non_reserved_keyword("like") {
                    self.skip_list_item()?;
                } else {
                    let col_name = self.consume_identifier()?.clone();
                    let col_type = self.parse_data_type()?;
                    self.skip_list_item()?;
                    column_schema.push(ColumnSchema {
                        name: ParseToken::Single(col_name),
                        r#type: col_type,
                    });
                }

                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            Some(column_schema)
        } else {
            None
        };

        self.skip_table_options();

        let query = if self.match_token_type(TokenTypeVariant::As)
            || self.check_token_type(TokenTypeVariant::Select)
            || self.check_token_type(TokenTypeVariant::With)
        {
            Some(self.parse_query_expr()?)
        } else {
            None
        };

        Ok(Statement::CreateTable(CreateTableStatement {
            name,
            schema,
            replace,
            is_temporary,
            if_not_exists,
            query,
        }))
    }

    // create_view -> "VIEW" ["IF" "NOT" "EXISTS"] path [identifier_list] [view_options] "AS" query_expr
    // ["WITH" "NO" "SCHEMA" "BINDING"]
    fn parse_create_view_statement(&mut self, replace: bool) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("view")?;

        if self.match_non_reserved_keyword("if") {
            self.consume(TokenTypeVariant::Not)?;
            self.consume(TokenTypeVariant::Exists)?;
        }

        let name = self.parse_path()?;
        let columns = if self.check_token_type(TokenTypeVariant::LeftParen) {
            Some(self.parse_identifier_list()?)
        } else {
            None
        };

        self.skip_table_options();
        self.consume(TokenTypeVariant::As)?;
        let query = self.parse_query_expr()?;

        // Redshift late-binding views
        if self.check_token_type(TokenTypeVariant::With)
            && self.check_next_non_reserved_keyword(1, "no")
        {
            self.advance();
            self.advance();
            self.consume_non_reserved_keyword("schema")?;
            self.consume_non_reserved_keyword("binding")?;
        }

        Ok(Statement::CreateView(CreateViewStatement {
            name,
            replace,
            columns,
            query,
        }))
    }

    // insert_statement -> "INSERT" ["INTO" | "OVERWRITE"] ["TABLE"] path ["PARTITION" "(" ... ")"] [identifier_list] input
    // where:
    // input -> query_expr | "VALUES" "(" expr ("," expr)* ")" ("," "(" expr ("," expr)* ")")*
    fn parse_insert_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("insert")?;
        if !self.match_token_type(TokenTypeVariant::Into) {
            self.match_non_reserved_keyword("overwrite");
        }
        self.match_non_reserved_keyword("table");
        let table = self.parse_path()?;

        if self.match_token_type(TokenTypeVariant::Partition) {
            self.consume(TokenTypeVariant::LeftParen)?;
            loop {
                self.skip_list_item()?;
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
        }

        let columns = if self.check_token_type(TokenTypeVariant::LeftParen)
            && !matches!(
                self.peek_next_i(1).kind,
                TokenType::Select | TokenType::With | TokenType::LeftParen
            ) {
            Some(self.parse_identifier_list()?)
        } else {
            None
        };

        let values = if self.match_non_reserved_keyword("values") {
            let mut rows = vec![];
            loop {
                self.consume(TokenTypeVariant::LeftParen)?;
                let mut row = vec![];
                loop {
                    row.push(self.parse_expr()?);
                    if !self.match_token_type(TokenTypeVariant::Comma) {
                        break;
                    }
                }
                self.consume(TokenTypeVariant::RightParen)?;
                rows.push(row);

                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            Some(rows)
        } else {
            None
        };

        let query = if values.is_none() {
            Some(self.parse_query_expr()?)
        } else {
            None
        };

        Ok(Statement::Insert(InsertStatement {
            table,
            columns,
            values,
            query,
        }))
    }

    // delete_statement -> "DELETE" ["FROM"] path [as_alias] ["USING" from_expr] ["WHERE" expr]
    fn parse_delete_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("delete")?;
        self.match_token_type(TokenTypeVariant::From);
        let table = self.parse_path()?;
        let alias = self.parse_as_alias()?;
        let using = if self.match_token_type(TokenTypeVariant::Using) {
            Some(From {
                expr: Box::new(self.parse_from_expr()?),
            })
        } else {
            None
        };
        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(Where {
                expr: Box::new(self.parse_expr()?),
            })
        } else {
            None
        };
        Ok(Statement::Delete(DeleteStatement {
            table,
            alias,
            using,
            r#where,
        }))
    }

    // update_statement -> "UPDATE" path [as_alias] "SET" update_item ("," update_item)* ["FROM" from_expr] ["WHERE" expr]
    // where:
    // update_item -> path "=" expr
    fn parse_update_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("update")?;
        let table = self.parse_path()?;
        let alias = self.parse_as_alias()?;
        self.consume(TokenTypeVariant::Set)?;
        let mut update_items = vec![];
        loop {
            let column = self.parse_path()?.expr;
            self.consume(TokenTypeVariant::Equal)?;
            let expr = self.parse_expr()?;
            update_items.push(UpdateItem { column, expr });

            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        let from = if self.match_token_type(TokenTypeVariant::From) {
            Some(From {
                expr: Box::new(self.parse_from_expr()?),
            })
        } else {
            None
        };
        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(Where {
                expr: Box::new(self.parse_expr()?),
            })
        } else {
            None
        };

        Ok(Statement::Update(UpdateStatement {
            table,
            alias,
            update_items,
            from,
            r#where,
        }))
    }

    // truncate_statement -> "TRUNCATE" ["TABLE"] path
    fn parse_truncate_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("truncate")?;
        self.match_non_reserved_keyword("table");
        let table = self.parse_path()?;
        Ok(Statement::Truncate(TruncateStatement { table }))
    }

    // drop_statement -> "DROP" ("TABLE" | ["MATERIALIZED"] "VIEW") ["IF" "EXISTS"] path ["CASCADE" | "RESTRICT"]
    fn parse_drop_statement(&mut self) -> anyhow::Result<Statement> {
        self.consume_non_reserved_keyword("drop")?;
        self.match_non_reserved_keyword("materialized");
        let tok = self.consume_one_of_non_reserved_keywords(&["table", "view"])?;
        let kind = if tok.lexeme.eq_ignore_ascii_case("table") {
            DropKind::Table
        } else {
            DropKind::View
        };

        let if_exists = self.match_non_reserved_keyword("if");
        if if_exists {
            self.consume(TokenTypeVariant::Exists)?;
        }

        let name = self.parse_path()?;
        if !self.match_non_reserved_keyword("cascade") {
            self.match_non_reserved_keyword("restrict");
        }

        Ok(Statement::Drop(DropStatement {
            kind,
            name,
            if_exists,
        }))
    }

    // query_expr ->
    // ["WITH" with_expr]
    // select_query_expr (set_operator select_query_expr)*
    // ["ORDER" "BY" order_by_expr]
    // [limit]
    pub(crate) fn parse_query_expr(&mut self) -> anyhow::Result<QueryExpr> {
        let with = if self.match_token_type(TokenTypeVariant::With) {
            Some(self.parse_with_expr()?)
        } else {
            None
        };
        let mut output: QueryExpr = self.parse_select_query_expr()?;

        while let Some(set_operator) = self.parse_set_operator() {
            let right_query_expr = self.parse_select_query_expr()?;
            output = QueryExpr::SetSelect(SetSelectQueryExpr {
                with: None,
                left_query: Box::new(output),
                set_operator,
                right_query: Box::new(right_query_expr),
                order_by: None,
                limit: None,
            })
        }

        let order_by = if self.match_token_type(TokenTypeVariant::Order) {
            self.consume(TokenTypeVariant::By)?;
            Some(OrderBy {
                exprs: self.parse_order_by_expr()?,
            })
        } else {
            None
        };

        let limit = self.parse_limit()?;

        match output {
            QueryExpr::Grouping(ref mut grouping_query_expr) => {
                grouping_query_expr.with = with;
                grouping_query_expr.order_by = order_by;
                grouping_query_expr.limit = limit;
            }
            QueryExpr::Select(ref mut select_query_expr) => {
                select_query_expr.with = with;
                select_query_expr.order_by = order_by;
                select_query_expr.limit = limit;
            }
            QueryExpr::SetSelect(ref mut set_select_query_expr) => {
                set_select_query_expr.with = with;
                set_select_query_expr.order_by = order_by;
                set_select_query_expr.limit = limit;
            }
        }

        Ok(output)
    }

    // set_operator -> "UNION" ["ALL" | "DISTINCT"] | ("INTERSECT" | "EXCEPT" | "MINUS") ["ALL" | "DISTINCT"]
    fn parse_set_operator(&mut self) -> Option<SetQueryOperator> {
        let set_operator = if self.match_token_type(TokenTypeVariant::Union) {
            if self.match_token_type(TokenTypeVariant::All) {
                return Some(SetQueryOperator::Union);
            }
            self.match_token_type(TokenTypeVariant::Distinct);
            return Some(SetQueryOperator::UnionDistinct);
        } else if self.match_token_type(TokenTypeVariant::Intersect) {
            SetQueryOperator::Intersect
        } else if self.match_token_type(TokenTypeVariant::Except)
            || (self.dialect.minus_set_operator() && self.match_non_reserved_keyword("minus"))
        {
            SetQueryOperator::Except
        } else {
            return None;
        };
        self.match_token_types(&[TokenTypeVariant::All, TokenTypeVariant::Distinct]);
        Some(set_operator)
    }

    // limit ->
    // "LIMIT" ("ALL" | expr | expr "," expr) ["OFFSET" expr]
    // | "OFFSET" expr ["ROW" | "ROWS"] ["FETCH" ("FIRST" | "NEXT") expr ("ROW" | "ROWS") "ONLY"]
    fn parse_limit(&mut self) -> anyhow::Result<Option<Limit>> {
        let mut count = None;
        let mut offset = None;

        if self.match_token_type(TokenTypeVariant::Limit)
            && !self.match_token_type(TokenTypeVariant::All)
        {
            let first = self.parse_expr()?;
            if self.match_token_type(TokenTypeVariant::Comma) {
                // LIMIT offset, count
                offset = Some(Box::new(first));
                count = Some(Box::new(self.parse_expr()?));
            } else {
                count = Some(Box::new(first));
            }
        }

        if offset.is_none() && self.match_non_reserved_keyword("offset") {
            offset = Some(Box::new(self.parse_expr()?));
            if !self.match_non_reserved_keyword("rows") {
                self.match_non_reserved_keyword("row");
            }
        }

        if count.is_none() && self.match_non_reserved_keyword("fetch") {
            self.consume_one_of_non_reserved_keywords(&["first", "next"])?;
            count = Some(Box::new(self.parse_expr()?));
            self.consume_one_of_non_reserved_keywords(&["rows", "row"])?;
            self.consume_non_reserved_keyword("only")?;
        }

        if count.is_none() && offset.is_none() {
            return Ok(None);
        }
        Ok(Some(Limit { count, offset }))
    }

    // select_query_expr -> select | "(" query_expr ")"
    fn parse_select_query_expr(&mut self) -> anyhow::Result<QueryExpr> {
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            let query_expr = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            Ok(QueryExpr::Grouping(GroupingQueryExpr {
                with: None,
                order_by: None,
                query: Box::new(query_expr),
                limit: None,
            }))
        } else {
            let select = self.parse_select()?;
            Ok(QueryExpr::Select(SelectQueryExpr {
                with: None,
                order_by: None,
                select,
                limit: None,
            }))
        }
    }

    // with_expr -> ["RECURSIVE"] cte ("," cte)*
    // where:
    // cte -> ("Identifier" | "QuotedIdentifier") [identifier_list] "AS" [["NOT"] "MATERIALIZED"] "(" query_expr ")"
    fn parse_with_expr(&mut self) -> anyhow::Result<With> {
        let recursive = self.match_token_type(TokenTypeVariant::Recursive);
        let mut ctes = vec![];
        loop {
            let name = ParseToken::Single(self.consume_identifier()?.clone());
            let columns = if self.check_token_type(TokenTypeVariant::LeftParen) {
                Some(self.parse_identifier_list()?)
            } else {
                None
            };
            self.consume(TokenTypeVariant::As)?;
            self.match_token_type(TokenTypeVariant::Not);
            self.match_non_reserved_keyword("materialized");
            self.consume(TokenTypeVariant::LeftParen)?;
            let query = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            ctes.push(Cte {
                name,
                columns,
                query,
            });

            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(With { recursive, ctes })
    }

    // order_by_expr -> expr [("ASC" | "DESC")] [("NULLS" "FIRST" | "NULLS" "LAST")] ("," expr [("ASC" | "DESC")] [("NULLS" "FIRST" | "NULLS" "LAST")])*
    fn parse_order_by_expr(&mut self) -> anyhow::Result<Vec<OrderByExpr>> {
        let mut order_by_exprs = vec![];

        loop {
            let expr = self.parse_expr()?;

            let sort_direction = if self.match_token_type(TokenTypeVariant::Asc) {
                Some(OrderBySortDirection::Asc)
            } else if self.match_token_type(TokenTypeVariant::Desc) {
                Some(OrderBySortDirection::Desc)
            } else {
                None
            };

            let nulls = if self.match_non_reserved_keyword("nulls") {
                let tok = self.consume_one_of_non_reserved_keywords(&["first", "last"])?;
                if tok.lexeme.eq_ignore_ascii_case("first") {
                    Some(OrderByNulls::First)
                } else {
                    Some(OrderByNulls::Last)
                }
            } else {
                None
            };

            order_by_exprs.push(OrderByExpr {
                expr,
                sort_direction,
                nulls,
            });

            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        Ok(order_by_exprs)
    }

    // select ->
    // "SELECT"
    // ["ALL" | "DISTINCT" ["ON" "(" expr ("," expr)* ")"]]
    // ["TOP" primary_expr]
    // select_expr ("," select_expr)* [","]
    // ["FROM" from_expr]
    // ["WHERE" expr]
    // ["GROUP" "BY" group_by_expr]
    // ["HAVING" expr]
    // ["QUALIFY" expr]
    // ["WINDOW" window]
    fn parse_select(&mut self) -> anyhow::Result<Select> {
        self.consume(TokenTypeVariant::Select)?;

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        let distinct_on = if distinct && self.match_token_type(TokenTypeVariant::On) {
            self.consume(TokenTypeVariant::LeftParen)?;
            let mut exprs = vec![];
            loop {
                exprs.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            Some(exprs)
        } else {
            None
        };
        if !distinct {
            self.match_token_type(TokenTypeVariant::All);
        }

        let top = if self.dialect.select_top() && self.match_non_reserved_keyword("top") {
            Some(Box::new(self.parse_primary_expr()?))
        } else {
            None
        };

        let mut select_exprs = vec![];
        loop {
            select_exprs.push(self.parse_select_expr()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
            // trailing comma
            if self.check_token_type(TokenTypeVariant::From) {
                break;
            }
        }

        if self.check_token_type(TokenTypeVariant::Select) {
            return Err(anyhow!(self.error(self.peek(), "Expected `;`.")));
        }

        let from = if self.match_token_type(TokenTypeVariant::From) {
            Some(From {
                expr: Box::new(self.parse_from_expr()?),
            })
        } else {
            None
        };

        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(Where {
                expr: Box::new(self.parse_expr()?),
            })
        } else {
            None
        };

        let group_by = if self.match_token_type(TokenTypeVariant::Group) {
            self.consume(TokenTypeVariant::By)?;
            Some(GroupBy {
                expr: self.parse_group_by_expr()?,
            })
        } else {
            None
        };

        let having = if self.match_token_type(TokenTypeVariant::Having) {
            Some(Having {
                expr: Box::new(self.parse_expr()?),
            })
        } else {
            None
        };

        let qualify = if self.match_token_type(TokenTypeVariant::Qualify) {
            Some(Qualify {
                expr: Box::new(self.parse_expr()?),
            })
        } else {
            None
        };

        let window = if self.check_token_type(TokenTypeVariant::Window) {
            Some(self.parse_window()?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            distinct_on,
            top,
            exprs: select_exprs,
            from,
            r#where,
            group_by,
            having,
            qualify,
            window,
        })
    }

    fn span_from(&self, start_token: usize) -> Span {
        Span {
            start: self.source_tokens[start_token].start,
            end: self.peek_prev().end,
        }
    }

    // select_expr -> "*" [star_except] | expr "." "*" [star_except] | expr [as_alias]
    fn parse_select_expr(&mut self) -> anyhow::Result<SelectExpr> {
        let start_token = self.curr;
        if self.match_token_type(TokenTypeVariant::Star) {
            let span = self.span_from(start_token);
            let except = self.parse_star_except()?;
            return Ok(SelectExpr::All(SelectAllExpr { except, span }));
        }

        let expr = match self.parse_expr() {
            Err(err) => {
                log::debug!("{}", err);
                return Err(anyhow!(self.error(self.peek(), "Expected expression.")));
            }
            Ok(expr) => expr,
        };
        let span = self.span_from(start_token);

        if let Expr::QualifiedStar(qualifier) = expr {
            let except = self.parse_star_except()?;
            return Ok(SelectExpr::ColAll(SelectColAllExpr {
                qualifier,
                except,
                span,
            }));
        }

        let alias = self.parse_as_alias()?;
        Ok(SelectExpr::Col(SelectColExpr { expr, alias, span }))
    }

    // star_except -> ("EXCEPT" | "EXCLUDE") identifier_list
    fn parse_star_except(&mut self) -> anyhow::Result<Option<Vec<ParseToken>>> {
        let is_except = (self.check_token_type(TokenTypeVariant::Except)
            || self.check_non_reserved_keyword("exclude"))
            && self.peek_next_i(1).kind == TokenType::LeftParen;
        if !is_except {
            return Ok(None);
        }
        self.advance();
        Ok(Some(self.parse_identifier_list()?))
    }

    // from_expr -> from_item_expr (cross_join_op from_item_expr | cond_join_op from_item_expr cond)*
    // where:
    // cross_join_op -> "CROSS" "JOIN" | ","
    // cond_join_op -> (["INNER"] "JOIN" | "FULL" ["OUTER"] "JOIN" | "LEFT" ["OUTER"] "JOIN" | "RIGHT" ["OUTER"] "JOIN")
    fn parse_from_expr(&mut self) -> anyhow::Result<FromExpr> {
        let mut output = self.parse_from_item_expr()?;

        loop {
            let kind = match self.peek().kind {
                TokenType::Inner | TokenType::Join => {
                    self.match_token_type(TokenTypeVariant::Inner);
                    JoinKind::Inner
                }
                TokenType::Left => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Left
                }
                TokenType::Right => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Right
                }
                TokenType::Full => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Full
                }
                TokenType::Cross | TokenType::Comma => {
                    if self.match_token_type(TokenTypeVariant::Cross) {
                        self.consume(TokenTypeVariant::Join)?;
                    } else {
                        self.advance();
                    }
                    let right = self.parse_from_item_expr()?;
                    output = FromExpr::CrossJoin(CrossJoinExpr {
                        left: Box::new(output),
                        right: Box::new(right),
                    });
                    continue;
                }
                _ => break,
            };
            self.consume(TokenTypeVariant::Join)?;
            let right = self.parse_from_item_expr()?;
            let cond = self.parse_cond()?;
            output = FromExpr::Join(JoinExpr {
                kind,
                left: Box::new(output),
                right: Box::new(right),
                cond,
            });
        }
        Ok(output)
    }

    // cond -> ("ON" expr | "USING" identifier_list)
    fn parse_cond(&mut self) -> anyhow::Result<JoinCondition> {
        if self.match_token_type(TokenTypeVariant::On) {
            Ok(JoinCondition::On(self.parse_expr()?))
        } else if self.match_token_type(TokenTypeVariant::Using) {
            Ok(JoinCondition::Using(self.parse_identifier_list()?))
        } else {
            Err(anyhow!(
                self.error(self.peek(), "Expected `ON` or `USING`.")
            ))
        }
    }

    // from_item_expr ->
    // ["LATERAL"] "(" query_expr ")" [as_alias [identifier_list]]
    // | "(" from_expr ")"
    // | ["LATERAL"] function_expr [as_alias [identifier_list]]
    // | path [as_alias]
    fn parse_from_item_expr(&mut self) -> anyhow::Result<FromExpr> {
        let lateral = self.match_non_reserved_keyword("lateral");

        if self.check_token_type(TokenTypeVariant::LeftParen) {
            let curr = self.curr;
            // lookahead to check whether we can parse a query expr
            while self.peek().kind == TokenType::LeftParen {
                self.curr += 1;
            }
            let is_query = matches!(self.peek().kind, TokenType::Select | TokenType::With);
            self.curr = curr + 1;

            if is_query {
                let query_expr = self.parse_query_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                let alias = self.parse_as_alias()?;
                let columns = self.parse_column_aliases(alias.is_some())?;
                return Ok(FromExpr::GroupingQuery(FromGroupingQueryExpr {
                    query: Box::new(query_expr),
                    alias,
                    columns,
                    lateral,
                }));
            }

            let from_expr = self.parse_from_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            return Ok(FromExpr::GroupingFrom(GroupingFromExpr {
                query: Box::new(from_expr),
            }));
        }

        if self.check_identifier() && self.peek_next_i(1).kind == TokenType::LeftParen {
            let function = self.parse_function_expr()?;
            let alias = self.parse_as_alias()?;
            let columns = self.parse_column_aliases(alias.is_some())?;
            return Ok(FromExpr::TableFunction(TableFunctionExpr {
                function: Box::new(function),
                alias,
                columns,
            }));
        }

        let path = self.parse_path()?;
        let alias = self.parse_as_alias()?;
        Ok(FromExpr::Path(FromPathExpr { path, alias }))
    }

    fn parse_column_aliases(&mut self, has_alias: bool) -> anyhow::Result<Option<Vec<ParseToken>>> {
        if has_alias && self.check_token_type(TokenTypeVariant::LeftParen) {
            Ok(Some(self.parse_identifier_list()?))
        } else {
            Ok(None)
        }
    }

    // as_alias -> "AS" ("Identifier" | "QuotedIdentifier" | "String") | ("Identifier" | "QuotedIdentifier")
    fn parse_as_alias(&mut self) -> anyhow::Result<Option<ParseToken>> {
        if self.match_token_type(TokenTypeVariant::As) {
            let tok = self.consume_one_of(&[
                TokenTypeVariant::Identifier,
                TokenTypeVariant::QuotedIdentifier,
                TokenTypeVariant::String,
            ])?;
            return Ok(Some(ParseToken::Single(tok.clone())));
        }
        let is_alias = match &self.peek().kind {
            TokenType::QuotedIdentifier(_) => true,
            TokenType::Identifier(ident) => !NON_ALIAS_KEYWORDS
                .iter()
                .any(|kw| ident.eq_ignore_ascii_case(kw)),
            _ => false,
        };
        if is_alias {
            return Ok(Some(ParseToken::Single(self.advance().clone())));
        }
        Ok(None)
    }

    // path -> path_part ("." path_part)*
    // where:
    // path_part -> ("QuotedIdentifier" | "Identifier") ("-" ("Identifier" | "Number"))*    (dashes only in BigQuery project names)
    fn parse_path(&mut self) -> anyhow::Result<PathExpr> {
        let mut path_identifiers = vec![];
        loop {
            path_identifiers.push(self.consume_identifier()?.clone());
            while self.dialect == Dialect::Bigquery
                && self.check_token_type(TokenTypeVariant::Minus)
            {
                path_identifiers.push(self.advance().clone());
                path_identifiers.push(
                    self.consume_one_of(&[
                        TokenTypeVariant::Identifier,
                        TokenTypeVariant::Number,
                    ])?
                    .clone(),
                );
            }
            if !self.match_token_type(TokenTypeVariant::Dot) {
                break;
            }
            path_identifiers.push(self.peek_prev().clone());
        }
        Ok(PathExpr {
            expr: ParseToken::Multiple(path_identifiers),
        })
    }

    // group_by_expr -> "ALL" | group_by_item ("," group_by_item)*
    // where:
    // group_by_item -> "GROUPING" "SETS" "(" expr ("," expr)* ")" | expr
    fn parse_group_by_expr(&mut self) -> anyhow::Result<GroupByExpr> {
        if self.match_token_type(TokenTypeVariant::All) {
            return Ok(GroupByExpr::All);
        }
        let mut items = vec![];
        loop {
            if self.check_non_reserved_keyword("grouping")
                && self.check_next_non_reserved_keyword(1, "sets")
            {
                self.advance();
                self.advance();
                items.push(self.parse_primary_expr()?);
            } else {
                items.push(self.parse_expr()?);
            }
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(GroupByExpr::Items(items))
    }

    // frame_bound -> "UNBOUNDED" ("PRECEDING" | "FOLLOWING") | "CURRENT" "ROW" | expr ("PRECEDING" | "FOLLOWING")
    fn parse_frame_bound(&mut self) -> anyhow::Result<FrameBound> {
        if self.match_non_reserved_keyword("unbounded") {
            let tok = self.consume_one_of_non_reserved_keywords(&["preceding", "following"])?;
            return Ok(if tok.lexeme.eq_ignore_ascii_case("preceding") {
                FrameBound::UnboundedPreceding
            } else {
                FrameBound::UnboundedFollowing
            });
        }
        if self.match_non_reserved_keyword("current") {
            self.consume_non_reserved_keyword("row")?;
            return Ok(FrameBound::CurrentRow);
        }
        let expr = Box::new(self.parse_expr()?);
        let tok = self.consume_one_of_non_reserved_keywords(&["preceding", "following"])?;
        Ok(if tok.lexeme.eq_ignore_ascii_case("preceding") {
            FrameBound::Preceding(expr)
        } else {
            FrameBound::Following(expr)
        })
    }

    // window_frame -> ("ROWS" | "RANGE" | "GROUPS") (frame_bound | "BETWEEN" frame_bound "AND" frame_bound)
    fn parse_window_frame(&mut self) -> anyhow::Result<WindowFrame> {
        let tok = self.consume_one_of_non_reserved_keywords(&["rows", "range", "groups"])?;
        let kind = match tok.lexeme.to_lowercase().as_str() {
            "rows" => WindowFrameKind::Rows,
            "range" => WindowFrameKind::Range,
            _ => WindowFrameKind::Groups,
        };

        if self.match_token_type(TokenTypeVariant::Between) {
            let start = self.parse_frame_bound()?;
            if let FrameBound::UnboundedFollowing = start {
                return Err(anyhow!(self.error(self.peek_prev(), "Expected `PRECEDING`.")));
            }
            self.consume(TokenTypeVariant::And)?;
            let end = self.parse_frame_bound()?;
            Ok(WindowFrame {
                kind,
                start,
                end: Some(end),
            })
        } else {
            let start = self.parse_frame_bound()?;
            Ok(WindowFrame {
                kind,
                start,
                end: None,
            })
        }
    }

    // named_window_expr -> ("Identifier" | "QuotedIdentifier") | "(" ["Identifier" | "QuotedIdentifier"] [partition_by] [order_by] [frame] ")"
    // where:
    // partition_by -> "PARTITION" "BY" expr ("," expr)*
    // order_by -> "ORDER" "BY" order_by_expr
    // frame -> window_frame
    fn parse_named_window_expr(&mut self) -> anyhow::Result<NamedWindowExpr> {
        if !self.match_token_type(TokenTypeVariant::LeftParen) {
            let name = ParseToken::Single(self.consume_identifier()?.clone());
            return Ok(NamedWindowExpr::Reference(name));
        }
        let is_frame_start = ["rows", "range", "groups"]
            .iter()
            .any(|kw| self.check_non_reserved_keyword(kw));
        let window_name = if self.check_identifier() && !is_frame_start {
            Some(ParseToken::Single(self.consume_identifier()?.clone()))
        } else {
            None
        };

        let partition_by = if self.match_token_type(TokenTypeVariant::Partition) {
            self.consume(TokenTypeVariant::By)?;
            let mut partition_by_exprs = vec![];
            loop {
                partition_by_exprs.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            Some(partition_by_exprs)
        } else {
            None
        };

        let order_by = if self.match_token_type(TokenTypeVariant::Order) {
            self.consume(TokenTypeVariant::By)?;
            Some(self.parse_order_by_expr()?)
        } else {
            None
        };

        let frame = if ["rows", "range", "groups"]
            .iter()
            .any(|kw| self.check_non_reserved_keyword(kw))
        {
            Some(self.parse_window_frame()?)
        } else {
            None
        };
        self.consume(TokenTypeVariant::RightParen)?;

        Ok(NamedWindowExpr::WindowSpec(WindowSpec {
            window_name,
            partition_by,
            order_by,
            frame,
        }))
    }

    // window -> "WINDOW" ("Identifier" | "QuotedIdentifier") "AS" named_window_expr ("," ("Identifier" | "QuotedIdentifier") "AS" named_window_expr)*
    fn parse_window(&mut self) -> anyhow::Result<Window> {
        self.consume(TokenTypeVariant::Window)?;
        let mut named_windows = vec![];
        loop {
            let name = ParseToken::Single(self.consume_identifier()?.clone());
            self.consume(TokenTypeVariant::As)?;
            let window = self.parse_named_window_expr()?;
            named_windows.push(NamedWindow { name, window });
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(Window { named_windows })
    }

    // standalone_expr -> expr [";"] "Eof"
    pub fn parse_standalone_expr(&mut self) -> anyhow::Result<Expr> {
        let expr = self.parse_expr()?;
        self.match_token_type(TokenTypeVariant::Semicolon);
        self.consume(TokenTypeVariant::Eof)?;
        Ok(expr)
    }

    // expr -> or_expr
    fn parse_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_or_expr()
    }

    /// Util function to parse a standard binary rule expression of kind
    ///
    /// `parse_rule -> parse_rule | next_parsing_rule ("T1" | "T2" | ... next_parsing_rule)*`
    fn parse_standard_binary_expr(
        &mut self,
        token_types_to_match: &[TokenTypeVariant],
        next_parsing_rule_fn: impl Fn(&mut Self) -> anyhow::Result<Expr>,
    ) -> anyhow::Result<Expr> {
        let mut output = next_parsing_rule_fn(self)?;

        while self.match_token_types(token_types_to_match) {
            let operator = self.peek_prev().clone();
            let right = next_parsing_rule_fn(self)?;
            output = binary(output, ParseToken::Single(operator), right);
        }

        Ok(output)
    }

    // or_expr -> and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(&[TokenTypeVariant::Or], Self::parse_and_expr)
    }

    // and_expr -> not_expr ("AND" not_expr)*
    fn parse_and_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(&[TokenTypeVariant::And], Self::parse_not_expr)
    }

    // not_expr -> "NOT" not_expr | comparison_expr
    fn parse_not_expr(&mut self) -> anyhow::Result<Expr> {
        if self.match_token_type(TokenTypeVariant::Not) {
            let operator = self.peek_prev().clone();
            return Ok(Expr::Unary(UnaryExpr {
                operator: ParseToken::Single(operator),
                right: Box::new(self.parse_not_expr()?),
            }));
        }
        self.parse_comparison_expr()
    }

    fn check_ilike(&self, i: usize) -> bool {
        self.dialect.ilike() && self.check_next_non_reserved_keyword(i, "ilike")
    }

    // comparison_expr ->
    // bitwise_or_expr
    // ( ("=" | ">" | "<" | ">=" | "<=" | "!=" | "<>") bitwise_or_expr
    // | "IS" ["NOT"] ("NULL" | "TRUE" | "FALSE" | "UNKNOWN" | "DISTINCT" "FROM" bitwise_or_expr)
    // | ["NOT"] ("LIKE" | "ILIKE") bitwise_or_expr
    // | ["NOT"] "IN" in_rhs
    // | ["NOT"] "BETWEEN" bitwise_or_expr "AND" bitwise_or_expr
    // )*
    fn parse_comparison_expr(&mut self) -> anyhow::Result<Expr> {
        let mut output = self.parse_bitwise_or_expr()?;

        loop {
            let curr_token = self.peek().clone();
            match &curr_token.kind {
                TokenType::Equal
                | TokenType::Greater
                | TokenType::Less
                | TokenType::GreaterEqual
                | TokenType::LessEqual
                | TokenType::BangEqual
                | TokenType::NotEqual
                | TokenType::Like => {
                    self.advance();
                    let right = self.parse_bitwise_or_expr()?;
                    output = binary(output, ParseToken::Single(curr_token), right);
                }
                TokenType::Identifier(_) if self.check_ilike(0) => {
                    self.advance();
                    let right = self.parse_bitwise_or_expr()?;
                    output = binary(output, ParseToken::Single(curr_token), right);
                }
                TokenType::In => {
                    self.advance();
                    let right = self.parse_in_rhs()?;
                    output = binary(output, ParseToken::Single(curr_token), right);
                }
                TokenType::Between => {
                    self.advance();
                    output = self.parse_between_rest(output, false)?;
                }
                TokenType::Is => {
                    let mut parse_tokens = vec![curr_token];
                    self.advance();
                    if self.match_token_type(TokenTypeVariant::Not) {
                        parse_tokens.push(self.peek_prev().clone());
                    }
                    let right = if self.match_token_type(TokenTypeVariant::Distinct) {
                        parse_tokens.push(self.peek_prev().clone());
                        parse_tokens.push(self.consume(TokenTypeVariant::From)?.clone());
                        self.parse_bitwise_or_expr()?
                    } else if self.match_non_reserved_keyword("unknown") {
                        Expr::Null
                    } else {
                        let literal = self.consume_one_of(&[
                            TokenTypeVariant::Null,
                            TokenTypeVariant::True,
                            TokenTypeVariant::False,
                        ])?;
                        match literal.kind {
                            TokenType::True => Expr::Bool(true),
                            TokenType::False => Expr::Bool(false),
                            _ => Expr::Null,
                        }
                    };
                    output = binary(output, ParseToken::Multiple(parse_tokens), right);
                }
                TokenType::Not => {
                    let next_kind = self.peek_next_i(1).kind.clone();
                    let is_negated_operator = matches!(
                        next_kind,
                        TokenType::In | TokenType::Between | TokenType::Like
                    ) || self.check_ilike(1);
                    if !is_negated_operator {
                        break;
                    }
                    self.advance();
                    let operator_token = self.advance().clone();
                    match next_kind {
                        TokenType::Between => {
                            output = self.parse_between_rest(output, true)?;
                        }
                        TokenType::In => {
                            let right = self.parse_in_rhs()?;
                            output = binary(
                                output,
                                ParseToken::Multiple(vec![curr_token, operator_token]),
                                right,
                            );
                        }
                        _ => {
                            let right = self.parse_bitwise_or_expr()?;
                            output = binary(
                                output,
                                ParseToken::Multiple(vec![curr_token, operator_token]),
                                right,
                            );
                        }
                    }
                }
                _ => {
                    break;
                }
            }
        }
        Ok(output)
    }

    // in_rhs -> "(" query_expr ")" | "(" expr ("," expr)* ")" | bitwise_or_expr
    fn parse_in_rhs(&mut self) -> anyhow::Result<Expr> {
        if !self.match_token_type(TokenTypeVariant::LeftParen) {
            return self.parse_bitwise_or_expr();
        }
        if self.check_token_type(TokenTypeVariant::Select)
            || self.check_token_type(TokenTypeVariant::With)
        {
            let query = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            return Ok(Expr::Query(Box::new(query)));
        }
        let mut exprs = vec![];
        loop {
            exprs.push(self.parse_expr()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Expr::Tuple(exprs))
    }

    fn parse_between_rest(&mut self, expr: Expr, negated: bool) -> anyhow::Result<Expr> {
        let low = self.parse_bitwise_or_expr()?;
        self.consume(TokenTypeVariant::And)?;
        let high = self.parse_bitwise_or_expr()?;
        Ok(Expr::Between(BetweenExpr {
            expr: Box::new(expr),
            negated,
            low: Box::new(low),
            high: Box::new(high),
        }))
    }

    // bitwise_or_expr -> bitwise_and_expr (("|" | "^") bitwise_and_expr)*
    fn parse_bitwise_or_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[TokenTypeVariant::BitwiseOr, TokenTypeVariant::BitwiseXor],
            Self::parse_bitwise_and_expr,
        )
    }

    // bitwise_and_expr -> bitwise_shift_expr ("&" bitwise_shift_expr)*
    fn parse_bitwise_and_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[TokenTypeVariant::BitwiseAnd],
            Self::parse_bitwise_shift_expr,
        )
    }

    // bitwise_shift_expr -> add_expr (("<<" | ">>") add_expr)*
    fn parse_bitwise_shift_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[
                TokenTypeVariant::BitwiseRightShift,
                TokenTypeVariant::BitwiseLeftShift,
            ],
            Self::parse_add_expr,
        )
    }

    // add_expr -> mul_concat_expr (("+" | "-") mul_concat_expr)*
    fn parse_add_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[TokenTypeVariant::Plus, TokenTypeVariant::Minus],
            Self::parse_mul_concat_expr,
        )
    }

    // mul_concat_expr -> unary_expr (("*" | "/" | "%" | "||") unary_expr)*
    fn parse_mul_concat_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_standard_binary_expr(
            &[
                TokenTypeVariant::Star,
                TokenTypeVariant::Slash,
                TokenTypeVariant::Percent,
                TokenTypeVariant::ConcatOperator,
            ],
            Self::parse_unary_expr,
        )
    }

    // unary_expr -> ("+" | "-" | "~") unary_expr | cast_operator_expr
    fn parse_unary_expr(&mut self) -> anyhow::Result<Expr> {
        if self.match_token_types(&[
            TokenTypeVariant::Plus,
            TokenTypeVariant::Minus,
            TokenTypeVariant::BitwiseNot,
        ]) {
            let operator = self.peek_prev().clone();
            return Ok(Expr::Unary(UnaryExpr {
                operator: ParseToken::Single(operator),
                right: Box::new(self.parse_unary_expr()?),
            }));
        }
        self.parse_cast_operator_expr()
    }

    // cast_operator_expr -> field_access_expr ("::" data_type)*
    fn parse_cast_operator_expr(&mut self) -> anyhow::Result<Expr> {
        let mut output = self.parse_field_access_expr()?;
        while self.match_token_type(TokenTypeVariant::DoubleColon) {
            let r#type = self.parse_data_type()?;
            output = Expr::Cast(CastExpr {
                kind: CastKind::DoubleColon,
                expr: Box::new(output),
                r#type,
            });
        }
        Ok(output)
    }

    // field_access_expr -> array_subscript_operator ("." (field_name | array_subscript_operator))* ["." "*"]
    // where:
    // field_name -> "Identifier" | "QuotedIdentifier" | keyword
    fn parse_field_access_expr(&mut self) -> anyhow::Result<Expr> {
        let mut output = self.parse_array_subscript_operator()?;

        while self.match_token_type(TokenTypeVariant::Dot) {
            let operator = self.peek_prev().clone();
            if self.match_token_type(TokenTypeVariant::Star) {
                return match output {
                    Expr::Column(column) => Ok(Expr::QualifiedStar(column)),
                    _ => Err(anyhow!(
                        self.error(self.peek_prev(), "Expected column qualifier before `.*`.")
                    )),
                };
            }

            let next = self.peek();
            let is_field_name = matches!(
                next.kind,
                TokenType::Identifier(_) | TokenType::QuotedIdentifier(_)
            ) || is_keyword(next);
            let is_call = self.peek_next_i(1).kind == TokenType::LeftParen;

            match output {
                Expr::Column(ref mut column) if is_field_name && !is_call => {
                    let field = self.advance().clone();
                    column.path.push(ParseToken::Single(field).identifier());
                    output = self.parse_subscripts(output)?;
                }
                _ => {
                    let right = self.parse_array_subscript_operator()?;
                    output = binary(output, ParseToken::Single(operator), right);
                }
            }
        }
        Ok(output)
    }

    // array_subscript_operator -> primary_expr ("[" expr [":" expr] "]")*
    fn parse_array_subscript_operator(&mut self) -> anyhow::Result<Expr> {
        let output = self.parse_primary_expr()?;
        self.parse_subscripts(output)
    }

    fn parse_subscripts(&mut self, mut output: Expr) -> anyhow::Result<Expr> {
        while self.match_token_type(TokenTypeVariant::LeftSquare) {
            let left_square = self.peek_prev().clone();
            let mut index = self.parse_expr()?;
            if self.match_token_type(TokenTypeVariant::Colon) {
                let operator = self.peek_prev().clone();
                let upper = self.parse_expr()?;
                index = binary(index, ParseToken::Single(operator), upper);
            }
            let right_square = self.consume(TokenTypeVariant::RightSquare)?.clone();
            output = binary(
                output,
                ParseToken::Multiple(vec![left_square, right_square]),
                index,
            );
        }
        Ok(output)
    }

    // array_expr -> ["ARRAY"] "[" [expr ("," expr)*] "]"
    fn parse_array_expr(&mut self) -> anyhow::Result<Expr> {
        self.match_non_reserved_keyword("array");
        self.consume(TokenTypeVariant::LeftSquare)?;
        let mut exprs = vec![];
        if !self.check_token_type(TokenTypeVariant::RightSquare) {
            loop {
                exprs.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenTypeVariant::RightSquare)?;
        Ok(Expr::Array(ArrayExpr { exprs }))
    }

    // interval_expr -> "INTERVAL" (string_or_number_or_grouping) [interval_unit ["TO" interval_unit]]
    fn parse_interval_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume(TokenTypeVariant::Interval)?;
        let value = self.parse_unary_expr()?;
        let unit = if INTERVAL_UNITS
            .iter()
            .any(|unit| self.check_non_reserved_keyword(unit))
        {
            let mut unit = self.advance().lexeme.to_lowercase();
            if self.match_non_reserved_keyword("to") {
                let to = self.consume_one_of_non_reserved_keywords(INTERVAL_UNITS)?;
                unit = format!("{} to {}", unit, to.lexeme.to_lowercase());
            }
            Some(unit)
        } else {
            None
        };
        Ok(Expr::Interval(IntervalExpr {
            value: Box::new(value),
            unit,
        }))
    }

    // data_type -> type_name [type_arguments] ("[" "]")*
    // where:
    // type_name -> "Identifier" ["PRECISION" | "VARYING" | ("WITH" | "WITHOUT") ["LOCAL"] "TIME" "ZONE"]
    pub(crate) fn parse_data_type(&mut self) -> anyhow::Result<DataType> {
        let first = self.consume_identifier()?.clone();
        let mut name = ParseToken::Single(first).identifier().to_lowercase();

        if self.check_non_reserved_keyword("precision") || self.check_non_reserved_keyword("varying")
        {
            name.push(' ');
            name.push_str(&self.advance().lexeme.to_lowercase());
        } else if (self.check_token_type(TokenTypeVariant::With)
            || self.check_non_reserved_keyword("without"))
            && (self.check_next_non_reserved_keyword(1, "time")
                || self.check_next_non_reserved_keyword(1, "local"))
        {
            name.push(' ');
            name.push_str(&self.advance().lexeme.to_lowercase());
            self.match_non_reserved_keyword("local");
            self.consume_non_reserved_keyword("time")?;
            self.consume_non_reserved_keyword("zone")?;
            name.push_str(" time zone");
        }

        if self.check_token_type(TokenTypeVariant::LeftParen)
            || self.check_token_type(TokenTypeVariant::Less)
        {
            name.push_str(&self.parse_type_arguments()?);
        }

        while self.check_token_type(TokenTypeVariant::LeftSquare)
            && self.peek_next_i(1).kind == TokenType::RightSquare
        {
            self.advance();
            self.advance();
            name.push_str("[]");
        }

        Ok(DataType { name })
    }

    // type_arguments -> ("(" | "<") balanced_tokens (")" | ">")
    fn parse_type_arguments(&mut self) -> anyhow::Result<String> {
        let mut text = String::new();
        let mut depth: i32 = 0;
        let mut prev_is_word = false;
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenType::Eof => {
                    return Err(anyhow!(self.error(&token, "Found unterminated type arguments.")));
                }
                TokenType::LeftParen | TokenType::Less => depth += 1,
                TokenType::RightParen | TokenType::Greater => depth -= 1,
                TokenType::BitwiseRightShift => depth -= 2,
                _ => {}
            }
            let is_word = matches!(
                token.kind,
                TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) | TokenType::Number(_)
            ) || is_keyword(&token);
            if is_word && prev_is_word {
                text.push(' ');
            }
            text.push_str(&token.lexeme.to_lowercase());
            prev_is_word = is_word;
            self.advance();
            if depth <= 0 {
                break;
            }
        }
        Ok(text)
    }

    // cast -> ("CAST" | "TRY_CAST" | "SAFE_CAST") "(" expr "AS" data_type ")"
    fn parse_cast_expr(&mut self) -> anyhow::Result<Expr> {
        let kind = if self.match_token_type(TokenTypeVariant::Cast) {
            CastKind::Cast
        } else {
            self.consume_one_of_non_reserved_keywords(&["try_cast", "safe_cast"])?;
            CastKind::TryCast
        };
        self.consume(TokenTypeVariant::LeftParen)?;
        let expr = self.parse_expr()?;
        self.consume(TokenTypeVariant::As)?;
        let r#type = self.parse_data_type()?;
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Expr::Cast(CastExpr {
            kind,
            expr: Box::new(expr),
            r#type,
        }))
    }

    // extract -> "EXTRACT" "(" (field | "String") "FROM" expr ")"
    fn parse_extract_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume_non_reserved_keyword("extract")?;
        self.consume(TokenTypeVariant::LeftParen)?;
        let field_token = self.advance().clone();
        let field = match &field_token.kind {
            TokenType::String(s) => s.to_lowercase(),
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_) => {
                ParseToken::Single(field_token).identifier().to_lowercase()
            }
            _ if is_keyword(&field_token) => field_token.lexeme.to_lowercase(),
            _ => {
                return Err(anyhow!(self.error(&field_token, "Expected date part.")));
            }
        };
        self.consume(TokenTypeVariant::From)?;
        let expr = self.parse_expr()?;
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Expr::Extract(ExtractExpr {
            field,
            expr: Box::new(expr),
        }))
    }

    fn parse_function_expr(&mut self) -> anyhow::Result<Expr> {
        let function_name = match &self.peek().kind {
            TokenType::Identifier(ident) => ident.to_lowercase(),
            _ => String::new(),
        };
        match function_name.as_str() {
            "extract" => self.parse_extract_expr(),
            "try_cast" | "safe_cast" => self.parse_cast_expr(),
            _ => self.parse_generic_function(),
        }
    }

    // generic_function ->
    // function_name "(" ["DISTINCT" | "ALL"] [arg (("," | "FROM" | "FOR") arg)*] [ "ORDER" "BY" order_by_expr] [("IGNORE" | "RESPECT") "NULLS"] ")"
    // ["WITHIN" "GROUP" "(" "ORDER" "BY" order_by_expr ")"]
    // ["FILTER" "(" "WHERE" expr ")"]
    // [("IGNORE" | "RESPECT") "NULLS"]
    // ["OVER" named_window_expr]
    // where:
    // function_name -> "Identifier" | "QuotedIdentifier" | "LEFT" | "RIGHT"
    // arg -> "*" | query_expr | expr
    fn parse_generic_function(&mut self) -> anyhow::Result<Expr> {
        let function_name = self
            .consume_one_of(&[
                TokenTypeVariant::Identifier,
                TokenTypeVariant::QuotedIdentifier,
                TokenTypeVariant::Left,
                TokenTypeVariant::Right,
            ])?
            .clone();
        self.consume(TokenTypeVariant::LeftParen)?;

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        if !distinct {
            self.match_token_type(TokenTypeVariant::All);
        }

        let is_trim = function_name.lexeme.eq_ignore_ascii_case("trim");
        if is_trim {
            let _ = self.match_non_reserved_keyword("both")
                || self.match_non_reserved_keyword("leading")
                || self.match_non_reserved_keyword("trailing");
        }

        let mut arguments = vec![];
        let mut order_by = None;
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
            }
            if self.check_token_type(TokenTypeVariant::RightParen) {
                break;
            }
            // TRIM(FROM x)
            if is_trim && arguments.is_empty() && self.match_token_type(TokenTypeVariant::From) {
                continue;
            }

            let arg = if self.check_token_type(TokenTypeVariant::Star)
                && matches!(
                    self.peek_next_i(1).kind,
                    TokenType::RightParen | TokenType::Comma
                ) {
                self.advance();
                Expr::Star
            } else if self.check_token_type(TokenTypeVariant::Select)
                || self.check_token_type(TokenTypeVariant::With)
            {
                Expr::Query(Box::new(self.parse_query_expr()?))
            } else {
                self.parse_expr()?
            };
            arguments.push(arg);

            if self.match_token_type(TokenTypeVariant::Order) {
                self.consume(TokenTypeVariant::By)?;
                order_by = Some(self.parse_order_by_expr()?);
            }
            if self.match_non_reserved_keyword("ignore") || self.match_non_reserved_keyword("respect")
            {
                self.consume_non_reserved_keyword("nulls")?;
            }

            if !(self.match_token_type(TokenTypeVariant::Comma)
                || self.match_token_type(TokenTypeVariant::From)
                || self.match_non_reserved_keyword("for")
                || self.match_non_reserved_keyword("separator"))
            {
                break;
            }
        }
        self.consume(TokenTypeVariant::RightParen)?;

        let within_group = if self.check_non_reserved_keyword("within")
            && self.peek_next_i(1).kind == TokenType::Group
        {
            self.advance();
            self.advance();
            self.consume(TokenTypeVariant::LeftParen)?;
            self.consume(TokenTypeVariant::Order)?;
            self.consume(TokenTypeVariant::By)?;
            let exprs = self.parse_order_by_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            Some(exprs)
        } else {
            None
        };

        let filter = if self.check_non_reserved_keyword("filter")
            && self.peek_next_i(1).kind == TokenType::LeftParen
        {
            self.advance();
            self.advance();
            self.consume(TokenTypeVariant::Where)?;
            let expr = self.parse_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            Some(Box::new(expr))
        } else {
            None
        };

        if (self.check_non_reserved_keyword("ignore") || self.check_non_reserved_keyword("respect"))
            && self.check_next_non_reserved_keyword(1, "nulls")
        {
            self.advance();
            self.advance();
        }

        let over = if self.match_token_type(TokenTypeVariant::Over) {
            Some(self.parse_named_window_expr()?)
        } else {
            None
        };

        Ok(Expr::Function(Box::new(FunctionExpr {
            name: ParseToken::Single(function_name),
            distinct,
            arguments,
            order_by,
            filter,
            within_group,
            over,
        })))
    }

    // niladic_function -> ("CURRENT_DATE" | "CURRENT_TIMESTAMP" | ...) without parentheses
    fn parse_niladic_function(&mut self) -> Expr {
        let function_name = self.advance().clone();
        Expr::Function(Box::new(FunctionExpr {
            name: ParseToken::Single(function_name),
            distinct: false,
            arguments: vec![],
            order_by: None,
            filter: None,
            within_group: None,
            over: None,
        }))
    }

    // case_expr -> "CASE" [expr] ("WHEN" expr "THEN" expr)+ ["ELSE" expr] "END"
    fn parse_case_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume(TokenTypeVariant::Case)?;

        let case = if self.check_token_type(TokenTypeVariant::When) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut when_thens = vec![];
        loop {
            self.consume(TokenTypeVariant::When)?;
            let when_expr = self.parse_expr()?;
            self.consume(TokenTypeVariant::Then)?;
            let then_expr = self.parse_expr()?;
            when_thens.push((when_expr, then_expr));

            if !self.check_token_type(TokenTypeVariant::When) {
                break;
            }
        }

        let r#else = if self.match_token_type(TokenTypeVariant::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.consume(TokenTypeVariant::End)?;

        Ok(Expr::Case(CaseExpr {
            case,
            when_thens,
            r#else,
        }))
    }

    // grouping_expr -> "(" query_expr ")" | "(" ")" | "(" expr ")" | "(" expr ("," expr)+ ")"
    fn parse_grouping_expr(&mut self) -> anyhow::Result<Expr> {
        self.consume(TokenTypeVariant::LeftParen)?;
        if self.check_token_type(TokenTypeVariant::With)
            || self.check_token_type(TokenTypeVariant::Select)
        {
            let query_expr = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            return Ok(Expr::Query(Box::new(query_expr)));
        }
        if self.match_token_type(TokenTypeVariant::RightParen) {
            return Ok(Expr::Tuple(vec![]));
        }

        let expr = self.parse_expr()?;
        if self.match_token_type(TokenTypeVariant::Comma) {
            let mut exprs = vec![expr];
            loop {
                exprs.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            return Ok(Expr::Tuple(exprs));
        }
        self.consume(TokenTypeVariant::RightParen)?;
        Ok(Expr::Grouping(GroupingExpr {
            expr: Box::new(expr),
        }))
    }

    // primary_expr ->
    // "True" | "False" | "Null" | "Number" | "String" | "Parameter" | "*"
    // | ("DATE" | "TIME" | "TIMESTAMP" | ...) "String"
    // | "Identifier" | "QuotedIdentifier"
    // | interval_expr | array_expr | case_expr | cast | extract
    // | "EXISTS" "(" query_expr ")"
    // | function_expr | niladic_function
    // | grouping_expr
    fn parse_primary_expr(&mut self) -> anyhow::Result<Expr> {
        let peek_token = self.peek().clone();
        let next_is_paren = self.peek_next_i(1).kind == TokenType::LeftParen;
        let primary_expr = match peek_token.kind {
            TokenType::True => {
                self.advance();
                Expr::Bool(true)
            }
            TokenType::False => {
                self.advance();
                Expr::Bool(false)
            }
            TokenType::Null => {
                self.advance();
                Expr::Null
            }
            TokenType::Number(num) => {
                self.advance();
                Expr::Number(num)
            }
            TokenType::String(str) => {
                self.advance();
                Expr::String(str)
            }
            TokenType::Parameter(param) => {
                self.advance();
                Expr::Parameter(param)
            }
            TokenType::Star => {
                self.advance();
                Expr::Star
            }
            TokenType::LeftSquare => self.parse_array_expr()?,
            TokenType::Case => self.parse_case_expr()?,
            TokenType::Cast => self.parse_cast_expr()?,
            TokenType::Interval => self.parse_interval_expr()?,
            TokenType::Exists => {
                self.advance();
                self.consume(TokenTypeVariant::LeftParen)?;
                let query = self.parse_query_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                Expr::Exists(Box::new(query))
            }
            // Functions whose name is a reserved keyword
            TokenType::Left | TokenType::Right if next_is_paren => self.parse_generic_function()?,
            TokenType::Identifier(ident) => {
                let lower_ident = ident.to_lowercase();
                let next_kind = self.peek_next_i(1).kind.clone();
                if lower_ident == "array" && next_kind == TokenType::LeftSquare {
                    self.parse_array_expr()?
                } else if next_is_paren {
                    self.parse_function_expr()?
                } else if NILADIC_FUNCTIONS.contains(&lower_ident.as_str()) {
                    self.parse_niladic_function()
                } else if let (true, TokenType::String(value)) = (
                    TYPED_STRING_PREFIXES.contains(&lower_ident.as_str()),
                    &next_kind,
                ) {
                    self.advance();
                    self.advance();
                    Expr::TypedString(TypedStringExpr {
                        r#type: lower_ident,
                        value: value.clone(),
                    })
                } else {
                    self.advance();
                    Expr::Column(ColumnExpr { path: vec![ident] })
                }
            }
            TokenType::QuotedIdentifier(qident) => {
                if next_is_paren {
                    self.parse_generic_function()?
                } else {
                    self.advance();
                    Expr::Column(ColumnExpr { path: vec![qident] })
                }
            }
            TokenType::LeftParen => self.parse_grouping_expr()?,
            _ => {
                return Err(anyhow!(self.error(&peek_token, "Expected Expression.")));
            }
        };

        Ok(primary_expr)
    }
}

pub fn parse_sql(sql: &str, dialect: Dialect) -> anyhow::Result<Ast> {
    log::debug!(
        "Parsing ({}) {}",
        dialect,
        sql.chars().take(50).collect::<String>()
    );

    let mut scanner = Scanner::new(sql, dialect);

    scanner.scan()?;

    log::debug!("Tokens:");
    scanner
        .tokens()
        .iter()
        .for_each(|tok| log::debug!("{:?}", tok));

    let mut parser = Parser::new(scanner.tokens(), dialect);
    let ast = parser.parse()?;
    log::debug!("AST: {:?}", ast);
    Ok(ast)
}

/// Parses a single scalar expression such as `SUM(amount) * 2`.
pub fn parse_expression(text: &str, dialect: Dialect) -> anyhow::Result<Expr> {
    let mut scanner = Scanner::new(text, dialect);
    scanner.scan()?;
    let mut parser = Parser::new(scanner.tokens(), dialect);
    parser.parse_standalone_expr()
}

#[cfg(test)]
mod tests {
    use super::{parse_expression, parse_sql};
    use crate::ast::{Expr, FromExpr, QueryExpr, SelectExpr, Statement};
    use crate::dialect::Dialect;

    fn first_select(sql: &str, dialect: Dialect) -> crate::ast::Select {
        let ast = parse_sql(sql, dialect).unwrap();
        match ast.statements.into_iter().next().unwrap() {
            Statement::Query(query) => match query.query {
                QueryExpr::Select(select) => select.select,
                other => panic!("unexpected query {:?}", other),
            },
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_select_spans_exclude_alias() {
        let sql = "SELECT id, UPPER(name) AS name_upper FROM users";
        let select = first_select(sql, Dialect::Redshift);
        let spans: Vec<String> = select
            .exprs
            .iter()
            .map(|e| {
                let span = e.span();
                sql.chars().skip(span.start).take(span.end - span.start).collect()
            })
            .collect();
        assert_eq!(spans, vec!["id", "UPPER(name)"]);
    }

    #[test]
    fn test_qualified_column_path() {
        let select = first_select("SELECT s.orders.amount, o.* FROM s.orders o", Dialect::Redshift);
        match &select.exprs[0] {
            SelectExpr::Col(col) => match &col.expr {
                Expr::Column(column) => {
                    assert_eq!(column.path, vec!["s", "orders", "amount"]);
                    assert_eq!(column.qualifier().unwrap(), "s.orders");
                }
                other => panic!("unexpected expr {:?}", other),
            },
            other => panic!("unexpected select expr {:?}", other),
        }
        assert!(matches!(&select.exprs[1], SelectExpr::ColAll(_)));
        match select.from.unwrap().expr.as_ref() {
            FromExpr::Path(path) => {
                assert_eq!(path.path.name(), "s.orders");
                assert_eq!(path.alias.as_ref().unwrap().identifier(), "o");
            }
            other => panic!("unexpected from {:?}", other),
        }
    }

    #[test]
    fn test_double_colon_cast_only_where_supported() {
        assert!(parse_expression("amount::decimal(10,2)", Dialect::Postgres).is_ok());
        assert!(parse_expression("amount::decimal(10,2)", Dialect::Mysql).is_err());
    }

    #[test]
    fn test_nested_generic_type_closes_with_shift_token() {
        let expr = parse_expression("CAST(x AS array<array<int>>)", Dialect::Spark).unwrap();
        match expr {
            Expr::Cast(cast) => assert_eq!(cast.r#type.name, "array<array<int>>"),
            other => panic!("unexpected expr {:?}", other),
        }
    }

    #[test]
    fn test_minus_is_dialect_gated() {
        assert!(parse_sql("SELECT a FROM t MINUS SELECT a FROM u", Dialect::Redshift).is_ok());
        assert!(parse_sql("SELECT a FROM t MINUS SELECT a FROM u", Dialect::Postgres).is_err());
    }
}
