//! Column-level lineage extraction.
//!
//! A statement is resolved scope by scope: every `FROM` item becomes a relation (a base
//! table, a CTE or a derived table with known output columns) and every column reference in
//! a projection is bound to the relation that provides it, following CTEs and subqueries down
//! to base-table columns. Each projected expression is classified once (see [`classifier`])
//! and the classification is attached to all the source columns it references.
pub mod catalog;
pub mod classifier;

use std::collections::BTreeSet;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use catalog::{Catalog, Column, SchemaObject, SchemaObjectKind};
pub use classifier::{
    Classification, TransformationSubtype, TransformationType, classify_expr,
    classify_sql_expression,
};

use crate::ast::{
    ColumnExpr, Expr, FrameBound, FromExpr, FunctionExpr, GroupByExpr, JoinCondition,
    NamedWindowExpr, OrderBy, ParseToken, QueryExpr, Select, SelectExpr, Span, Statement, With,
};
use crate::dialect::Dialect;
use crate::parser::parse_sql;

pub const UNKNOWN: &str = "unknown";
pub const WILDCARD: &str = "*";
pub const WILDCARD_DESCRIPTION: &str = "SELECT * - schema required for full resolution";
pub const NO_SELECT_ERROR: &str = "No SELECT clause found";

/// Hex-encoded SHA-256 of `sql` with whitespace runs collapsed to a single space.
pub fn sql_hash(sql: &str) -> String {
    let normalized = sql.split_whitespace().collect::<Vec<&str>>().join(" ");
    Sha256::digest(normalized.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub namespace: String,
    pub table: String,
    pub column: String,
    pub transformation_type: TransformationType,
    pub transformation_subtype: TransformationSubtype,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLineage {
    pub column: String,
    pub source_columns: Vec<SourceColumn>,
    pub transformation_description: Option<String>,
}

/// A column that only influences which rows reach the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedColumn {
    pub namespace: String,
    pub table: String,
    pub column: String,
    pub subtypes: Vec<TransformationSubtype>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlLineageResult {
    pub sql_hash: String,
    pub dialect: Dialect,
    pub source_tables: Vec<String>,
    pub target_table: Option<String>,
    pub column_lineages: Vec<ColumnLineage>,
    #[serde(default)]
    pub referenced_columns: Vec<ReferencedColumn>,
    #[serde(default)]
    pub parse_errors: Vec<String>,
}

impl SqlLineageResult {
    fn empty(sql: &str, dialect: Dialect) -> Self {
        Self {
            sql_hash: sql_hash(sql),
            dialect,
            source_tables: vec![],
            target_table: None,
            column_lineages: vec![],
            referenced_columns: vec![],
            parse_errors: vec![],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.parse_errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDependencies {
    pub sql_hash: String,
    pub target_column: String,
    pub source_columns: Vec<SourceColumn>,
    pub transformation_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct ResolvedSource {
    table: String,
    column: String,
    classification: Classification,
}

/// Column reference bound to a table. `carried` is the classification of the
/// CTE or subquery column it was reached through, if any.
#[derive(Debug, Clone)]
struct Origin {
    table: String,
    column: String,
    carried: Option<Classification>,
}

impl Origin {
    fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_owned(),
            column: column.to_owned(),
            carried: None,
        }
    }
}

#[derive(Debug, Clone)]
struct OutputColumn {
    name: String,
    text: String,
    sources: Vec<ResolvedSource>,
    /// Tables behind an unexpanded `*`.
    wildcard_tables: Option<Vec<String>>,
}

impl OutputColumn {
    fn wildcard(text: String, tables: Vec<String>) -> Self {
        Self {
            name: WILDCARD.to_owned(),
            text,
            sources: vec![ResolvedSource {
                table: WILDCARD.to_owned(),
                column: WILDCARD.to_owned(),
                classification: Classification::new(
                    TransformationSubtype::Identity,
                    WILDCARD_DESCRIPTION.to_owned(),
                ),
            }],
            wildcard_tables: Some(tables),
        }
    }
}

#[derive(Debug, Clone)]
enum RelationKind {
    Table(String),
    Derived(Vec<OutputColumn>),
}

#[derive(Debug, Clone)]
struct Relation {
    alias: Option<String>,
    kind: RelationKind,
}

impl Relation {
    fn matches(&self, qualifier: &str) -> bool {
        match (&self.alias, &self.kind) {
            (Some(alias), _) => alias.eq_ignore_ascii_case(qualifier),
            (None, RelationKind::Table(name)) => {
                name.eq_ignore_ascii_case(qualifier)
                    || name
                        .rsplit('.')
                        .next()
                        .is_some_and(|base| base.eq_ignore_ascii_case(qualifier))
            }
            (None, RelationKind::Derived(_)) => false,
        }
    }

    fn display_name(&self) -> String {
        match (&self.alias, &self.kind) {
            (Some(alias), _) => alias.clone(),
            (None, RelationKind::Table(name)) => name.clone(),
            (None, RelationKind::Derived(_)) => "(subquery)".to_owned(),
        }
    }
}

struct Scope<'s> {
    relations: &'s [Relation],
    parent: Option<&'s Scope<'s>>,
}

enum Binding {
    Found(Vec<Origin>),
    Ambiguous(Vec<String>),
    Missing,
}

fn effective_classification(outer: &Classification, carried: Option<Classification>) -> Classification {
    match carried {
        Some(inner) if outer.is_identity() => inner,
        _ => outer.clone(),
    }
}

fn output_name(expr: &Expr, alias: Option<&ParseToken>, index: usize) -> String {
    if let Some(alias) = alias {
        return alias.identifier();
    }
    match expr {
        Expr::Column(column) => column.name().to_owned(),
        Expr::Cast(cast) => match cast.expr.as_ref() {
            Expr::Column(column) => column.name().to_owned(),
            _ => format!("column_{}", index),
        },
        _ => format!("column_{}", index),
    }
}

/// Renames outputs positionally, e.g. after `INSERT INTO t (a, b)`.
fn rename_outputs(outputs: &mut [OutputColumn], names: &[String]) {
    if outputs.len() != names.len() || outputs.iter().any(|o| o.wildcard_tables.is_some()) {
        return;
    }
    for (output, name) in outputs.iter_mut().zip(names) {
        output.name = name.clone();
    }
}

struct Extractor<'a> {
    sql: &'a [char],
    dialect: Dialect,
    catalog: Option<&'a Catalog>,
    ctes: Vec<IndexMap<String, Vec<OutputColumn>>>,
    source_tables: BTreeSet<String>,
    referenced: IndexMap<(String, String), BTreeSet<TransformationSubtype>>,
    resolution_errors: Vec<String>,
}

impl<'a> Extractor<'a> {
    fn new(sql: &'a [char], dialect: Dialect, catalog: Option<&'a Catalog>) -> Self {
        Self {
            sql,
            dialect,
            catalog,
            ctes: vec![],
            source_tables: BTreeSet::new(),
            referenced: IndexMap::new(),
            resolution_errors: vec![],
        }
    }

    fn text(&self, span: Span) -> String {
        self.sql
            .get(span.start..span.end)
            .map(|chars| chars.iter().collect::<String>())
            .unwrap_or_default()
    }

    fn resolution_error(&mut self, message: String) {
        if self.catalog.is_some() {
            log::warn!("{}", message);
            self.resolution_errors.push(message);
        }
    }

    fn get_cte(&self, name: &str) -> Option<&Vec<OutputColumn>> {
        self.ctes
            .iter()
            .rev()
            .find_map(|ctes| ctes.get(&name.to_lowercase()))
    }

    fn wildcard_tables(relation: &Relation) -> Vec<String> {
        match &relation.kind {
            RelationKind::Table(name) => vec![name.clone()],
            RelationKind::Derived(columns) => {
                let mut tables: Vec<String> = vec![];
                for column in columns {
                    let column_tables = column.wildcard_tables.iter().flatten().chain(
                        column
                            .sources
                            .iter()
                            .filter(|s| s.table != WILDCARD && s.table != UNKNOWN)
                            .map(|s| &s.table),
                    );
                    for table in column_tables {
                        if !tables.contains(table) {
                            tables.push(table.clone());
                        }
                    }
                }
                tables
            }
        }
    }

    /// `Some(true)` when the relation is known to provide `column`, `None` when its columns are unknown.
    fn relation_has_column(&self, relation: &Relation, column: &str) -> Option<bool> {
        match &relation.kind {
            RelationKind::Table(name) => self.catalog.and_then(|c| c.has_column(name, column)),
            RelationKind::Derived(columns) => {
                if columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
                    Some(true)
                } else if columns.iter().any(|c| c.wildcard_tables.is_some()) {
                    None
                } else {
                    Some(false)
                }
            }
        }
    }

    fn resolve_in_relation(&mut self, relation: &Relation, column: &str) -> Vec<Origin> {
        match &relation.kind {
            RelationKind::Table(name) => {
                if self
                    .catalog
                    .and_then(|c| c.has_column(name, column))
                    .is_some_and(|found| !found)
                {
                    self.resolution_error(format!(
                        "Column `{}` not found in the schema of table `{}`.",
                        column, name
                    ));
                }
                vec![Origin::new(name, column)]
            }
            RelationKind::Derived(columns) => {
                if let Some(output) = columns.iter().find(|c| c.name.eq_ignore_ascii_case(column))
                {
                    return output
                        .sources
                        .iter()
                        .map(|source| Origin {
                            table: source.table.clone(),
                            column: source.column.clone(),
                            carried: Some(source.classification.clone()),
                        })
                        .collect();
                }
                let tables = Self::wildcard_tables(relation);
                let has_wildcard = columns.iter().any(|c| c.wildcard_tables.is_some());
                if has_wildcard && tables.len() == 1 {
                    return vec![Origin::new(&tables[0], column)];
                }
                self.resolution_error(format!(
                    "Column `{}` not found in `{}`.",
                    column,
                    relation.display_name()
                ));
                vec![Origin::new(UNKNOWN, column)]
            }
        }
    }

    fn bind_unqualified(&mut self, scope: &Scope, column: &str) -> Binding {
        let mut definite = vec![];
        let mut possible = vec![];
        for relation in scope.relations {
            match self.relation_has_column(relation, column) {
                Some(true) => definite.push(relation),
                None => possible.push(relation),
                Some(false) => {}
            }
        }
        let candidates = if definite.is_empty() {
            possible
        } else {
            definite
        };
        match candidates.len() {
            0 => Binding::Missing,
            1 => Binding::Found(self.resolve_in_relation(candidates[0], column)),
            _ => Binding::Ambiguous(candidates.iter().map(|r| r.display_name()).collect()),
        }
    }

    fn resolve_column(&mut self, column: &ColumnExpr, scope: &Scope) -> Vec<Origin> {
        let name = column.name();
        if let Some(qualifier) = column.qualifier() {
            let mut current = Some(scope);
            while let Some(s) = current {
                if let Some(relation) = s.relations.iter().find(|r| r.matches(&qualifier)) {
                    return self.resolve_in_relation(relation, name);
                }
                current = s.parent;
            }
            // Unknown qualifier: keep it as written
            return vec![Origin::new(&qualifier, name)];
        }

        let mut current = Some(scope);
        while let Some(s) = current {
            match self.bind_unqualified(s, name) {
                Binding::Found(origins) => return origins,
                Binding::Ambiguous(relations) => {
                    self.resolution_error(format!(
                        "Column `{}` is ambiguous. It is contained in more than one table: {:?}.",
                        name, relations
                    ));
                    return vec![Origin::new(UNKNOWN, name)];
                }
                Binding::Missing => current = s.parent,
            }
        }
        if !scope.relations.is_empty() {
            self.resolution_error(format!("Column `{}` not found in context.", name));
        }
        vec![Origin::new(UNKNOWN, name)]
    }

    fn function_origins(&mut self, function: &FunctionExpr, scope: &Scope, out: &mut Vec<Origin>) {
        for arg in &function.arguments {
            self.expr_origins(arg, scope, out);
        }
        if let Some(filter) = &function.filter {
            self.expr_origins(filter, scope, out);
        }
        for order_by in function
            .order_by
            .iter()
            .chain(function.within_group.iter())
            .flatten()
        {
            self.expr_origins(&order_by.expr, scope, out);
        }
        if let Some(NamedWindowExpr::WindowSpec(spec)) = &function.over {
            for expr in spec.partition_by.iter().flatten() {
                self.expr_origins(expr, scope, out);
            }
            for order_by in spec.order_by.iter().flatten() {
                self.expr_origins(&order_by.expr, scope, out);
            }
            if let Some(frame) = &spec.frame {
                for bound in std::iter::once(&frame.start).chain(frame.end.iter()) {
                    if let FrameBound::Preceding(expr) | FrameBound::Following(expr) = bound {
                        self.expr_origins(expr, scope, out);
                    }
                }
            }
        }
    }

    /// Collects the columns `expr` reads, in order of appearance.
    fn expr_origins(&mut self, expr: &Expr, scope: &Scope, out: &mut Vec<Origin>) {
        match expr {
            Expr::Column(column) => out.extend(self.resolve_column(column, scope)),
            Expr::Binary(binary) => {
                self.expr_origins(&binary.left, scope, out);
                self.expr_origins(&binary.right, scope, out);
            }
            Expr::Unary(unary) => self.expr_origins(&unary.right, scope, out),
            Expr::Grouping(grouping) => self.expr_origins(&grouping.expr, scope, out),
            Expr::Tuple(exprs) => exprs.iter().for_each(|e| self.expr_origins(e, scope, out)),
            Expr::Array(array) => array
                .exprs
                .iter()
                .for_each(|e| self.expr_origins(e, scope, out)),
            Expr::Interval(interval) => self.expr_origins(&interval.value, scope, out),
            Expr::Between(between) => {
                self.expr_origins(&between.expr, scope, out);
                self.expr_origins(&between.low, scope, out);
                self.expr_origins(&between.high, scope, out);
            }
            Expr::Case(case) => {
                if let Some(operand) = &case.case {
                    self.expr_origins(operand, scope, out);
                }
                for (when, then) in &case.when_thens {
                    self.expr_origins(when, scope, out);
                    self.expr_origins(then, scope, out);
                }
                if let Some(r#else) = &case.r#else {
                    self.expr_origins(r#else, scope, out);
                }
            }
            Expr::Cast(cast) => self.expr_origins(&cast.expr, scope, out),
            Expr::Extract(extract) => self.expr_origins(&extract.expr, scope, out),
            Expr::Function(function) => self.function_origins(function, scope, out),
            Expr::Exists(query) | Expr::Query(query) => {
                let outputs = self.query_expr_lin(query, Some(scope));
                for output in outputs {
                    out.extend(output.sources.into_iter().map(|source| Origin {
                        table: source.table,
                        column: source.column,
                        carried: Some(source.classification),
                    }));
                }
            }
            Expr::QualifiedStar(_)
            | Expr::String(_)
            | Expr::Number(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Star
            | Expr::Parameter(_)
            | Expr::TypedString(_) => {}
        }
    }

    fn add_referenced(&mut self, origins: Vec<Origin>, subtype: TransformationSubtype) {
        for origin in origins {
            if origin.column == WILDCARD {
                continue;
            }
            self.referenced
                .entry((origin.table, origin.column))
                .or_default()
                .insert(subtype);
        }
    }

    fn reference_expr(&mut self, expr: &Expr, scope: &Scope, subtype: TransformationSubtype) {
        let mut origins = vec![];
        self.expr_origins(expr, scope, &mut origins);
        self.add_referenced(origins, subtype);
    }

    /// Like [`Self::reference_expr`], but output aliases and positions (`ORDER BY 1`) refer
    /// to the projected columns.
    fn reference_output_expr(
        &mut self,
        expr: &Expr,
        scope: &Scope,
        outputs: &[OutputColumn],
        subtype: TransformationSubtype,
    ) {
        let output = match expr {
            Expr::Number(position) => position
                .parse::<usize>()
                .ok()
                .and_then(|p| p.checked_sub(1))
                .and_then(|i| outputs.get(i)),
            Expr::Column(column) if column.path.len() == 1 => {
                let name = column.name();
                let is_input_column = scope
                    .relations
                    .iter()
                    .any(|r| self.relation_has_column(r, name) == Some(true));
                if is_input_column {
                    None
                } else {
                    outputs.iter().find(|o| o.name.eq_ignore_ascii_case(name))
                }
            }
            _ => None,
        };
        match output {
            Some(output) => {
                let origins = output
                    .sources
                    .iter()
                    .map(|s| Origin::new(&s.table, &s.column))
                    .collect();
                self.add_referenced(origins, subtype);
            }
            None if matches!(expr, Expr::Number(_)) => {}
            None => self.reference_expr(expr, scope, subtype),
        }
    }

    fn with_lin(&mut self, with: &With, parent: Option<&Scope>) {
        self.ctes.push(IndexMap::new());
        for cte in &with.ctes {
            let name = cte.name.identifier().to_lowercase();
            if with.recursive {
                // The anchor member defines the columns seen by the recursive reference
                if let QueryExpr::SetSelect(set_select) = &cte.query {
                    let anchor = self.query_expr_lin(&set_select.left_query, parent);
                    if let Some(ctes) = self.ctes.last_mut() {
                        ctes.insert(name.clone(), anchor);
                    }
                }
            }
            let mut outputs = self.query_expr_lin(&cte.query, parent);
            if let Some(columns) = &cte.columns {
                let names: Vec<String> = columns.iter().map(ParseToken::identifier).collect();
                rename_outputs(&mut outputs, &names);
            }
            log::debug!(
                "CTE `{}`: {:?}",
                name,
                outputs.iter().map(|o| &o.name).collect::<Vec<_>>()
            );
            if let Some(ctes) = self.ctes.last_mut() {
                ctes.insert(name, outputs);
            }
        }
    }

    fn query_expr_lin(&mut self, query: &QueryExpr, parent: Option<&Scope>) -> Vec<OutputColumn> {
        let with = query.with();
        if let Some(with) = with {
            self.with_lin(with, parent);
        }

        let outputs = match query {
            QueryExpr::Grouping(grouping) => {
                let outputs = self.query_expr_lin(&grouping.query, parent);
                self.order_by_lin(grouping.order_by.as_ref(), &outputs, parent);
                outputs
            }
            QueryExpr::Select(select) => {
                self.select_lin(&select.select, select.order_by.as_ref(), parent)
            }
            QueryExpr::SetSelect(set_select) => {
                let mut outputs = self.query_expr_lin(&set_select.left_query, parent);
                let right = self.query_expr_lin(&set_select.right_query, parent);
                for (left, right) in outputs.iter_mut().zip(right) {
                    left.sources.extend(right.sources);
                    if let Some(right_tables) = right.wildcard_tables {
                        left.wildcard_tables
                            .get_or_insert_with(Vec::new)
                            .extend(right_tables);
                    }
                }
                self.order_by_lin(set_select.order_by.as_ref(), &outputs, parent);
                outputs
            }
        };

        if with.is_some() {
            self.ctes.pop();
        }
        outputs
    }

    /// `ORDER BY` of a parenthesized or set query only sees its output columns.
    fn order_by_lin(&mut self, order_by: Option<&OrderBy>, outputs: &[OutputColumn], parent: Option<&Scope>) {
        let Some(order_by) = order_by else {
            return;
        };
        let relations = [Relation {
            alias: None,
            kind: RelationKind::Derived(outputs.to_vec()),
        }];
        let scope = Scope {
            relations: &relations,
            parent,
        };
        for expr in &order_by.exprs {
            self.reference_output_expr(&expr.expr, &scope, outputs, TransformationSubtype::Sort);
        }
    }

    fn from_expr_lin(
        &mut self,
        from_expr: &FromExpr,
        parent: Option<&Scope>,
        relations: &mut Vec<Relation>,
        joins: &mut Vec<(JoinCondition, usize, usize)>,
    ) {
        match from_expr {
            FromExpr::Path(path_expr) => {
                let name = path_expr.path.name();
                let alias = path_expr.alias.as_ref().map(ParseToken::identifier);
                let is_single_part = !name.contains('.');
                let cte = if is_single_part {
                    self.get_cte(&name).cloned()
                } else {
                    None
                };
                let relation = match cte {
                    Some(outputs) => Relation {
                        alias: Some(alias.unwrap_or(name)),
                        kind: RelationKind::Derived(outputs),
                    },
                    None => {
                        self.source_tables.insert(name.clone());
                        Relation {
                            alias,
                            kind: RelationKind::Table(name),
                        }
                    }
                };
                relations.push(relation);
            }
            FromExpr::GroupingQuery(grouping_query) => {
                let mut outputs = if grouping_query.lateral {
                    let scope = Scope {
                        relations: relations.as_slice(),
                        parent,
                    };
                    self.query_expr_lin(&grouping_query.query, Some(&scope))
                } else {
                    self.query_expr_lin(&grouping_query.query, parent)
                };
                if let Some(columns) = &grouping_query.columns {
                    let names: Vec<String> = columns.iter().map(ParseToken::identifier).collect();
                    rename_outputs(&mut outputs, &names);
                }
                relations.push(Relation {
                    alias: grouping_query.alias.as_ref().map(ParseToken::identifier),
                    kind: RelationKind::Derived(outputs),
                });
            }
            FromExpr::TableFunction(table_function) => {
                let mut origins = vec![];
                {
                    let scope = Scope {
                        relations: relations.as_slice(),
                        parent,
                    };
                    self.expr_origins(&table_function.function, &scope, &mut origins);
                }
                let alias = table_function.alias.as_ref().map(ParseToken::identifier);
                let names: Vec<String> = match (&table_function.columns, &alias) {
                    (Some(columns), _) => columns.iter().map(ParseToken::identifier).collect(),
                    (None, Some(alias)) => vec![alias.clone()],
                    (None, None) => vec![],
                };
                let outputs = names
                    .into_iter()
                    .map(|name| OutputColumn {
                        text: name.clone(),
                        name,
                        sources: origins
                            .iter()
                            .map(|origin| ResolvedSource {
                                table: origin.table.clone(),
                                column: origin.column.clone(),
                                classification: origin
                                    .carried
                                    .clone()
                                    .unwrap_or_else(Classification::identity),
                            })
                            .collect(),
                        wildcard_tables: None,
                    })
                    .collect();
                relations.push(Relation {
                    alias,
                    kind: RelationKind::Derived(outputs),
                });
            }
            FromExpr::GroupingFrom(grouping_from) => {
                self.from_expr_lin(&grouping_from.query, parent, relations, joins)
            }
            FromExpr::CrossJoin(cross_join) => {
                self.from_expr_lin(&cross_join.left, parent, relations, joins);
                self.from_expr_lin(&cross_join.right, parent, relations, joins);
            }
            FromExpr::Join(join) => {
                self.from_expr_lin(&join.left, parent, relations, joins);
                let split = relations.len();
                self.from_expr_lin(&join.right, parent, relations, joins);
                joins.push((join.cond.clone(), split, relations.len()));
            }
        }
    }

    fn join_lin(
        &mut self,
        joins: &[(JoinCondition, usize, usize)],
        relations: &[Relation],
        scope: &Scope,
    ) {
        for (cond, split, end) in joins {
            match cond {
                JoinCondition::On(expr) => {
                    self.reference_expr(expr, scope, TransformationSubtype::Join)
                }
                JoinCondition::Using(columns) => {
                    for column in columns {
                        let column = ColumnExpr {
                            path: vec![column.identifier()],
                        };
                        for side in [&relations[..*split], &relations[*split..*end]] {
                            let side_scope = Scope {
                                relations: side,
                                parent: None,
                            };
                            let origins = self.resolve_column(&column, &side_scope);
                            self.add_referenced(origins, TransformationSubtype::Join);
                        }
                    }
                }
            }
        }
    }

    fn star_lin(
        &mut self,
        relations: &[&Relation],
        except: Option<&Vec<ParseToken>>,
        text: String,
    ) -> Vec<OutputColumn> {
        let excluded: Vec<String> = except
            .map(|cols| cols.iter().map(ParseToken::identifier).collect())
            .unwrap_or_default();
        let mut outputs = vec![];
        let mut unknown_tables = vec![];
        for relation in relations {
            match &relation.kind {
                RelationKind::Table(name) => match self.catalog.and_then(|c| c.columns(name)) {
                    Some(columns) => outputs.extend(columns.iter().map(|col| OutputColumn {
                        name: col.name.clone(),
                        text: col.name.clone(),
                        sources: vec![ResolvedSource {
                            table: name.clone(),
                            column: col.name.clone(),
                            classification: Classification::identity(),
                        }],
                        wildcard_tables: None,
                    })),
                    None => unknown_tables.push(name.clone()),
                },
                RelationKind::Derived(columns) => {
                    if columns.iter().any(|c| c.wildcard_tables.is_some()) {
                        unknown_tables.extend(Self::wildcard_tables(relation));
                    } else {
                        outputs.extend(columns.iter().cloned());
                    }
                }
            }
        }

        if !unknown_tables.is_empty() {
            self.resolution_error(format!(
                "Cannot expand `{}` without the schema of {:?}.",
                text, unknown_tables
            ));
            let tables = relations
                .iter()
                .flat_map(|r| Self::wildcard_tables(r))
                .collect();
            return vec![OutputColumn::wildcard(text, tables)];
        }
        outputs.retain(|o| !excluded.iter().any(|e| e.eq_ignore_ascii_case(&o.name)));
        outputs
    }

    fn select_lin(
        &mut self,
        select: &Select,
        order_by: Option<&OrderBy>,
        parent: Option<&Scope>,
    ) -> Vec<OutputColumn> {
        let mut relations = vec![];
        let mut joins = vec![];
        if let Some(from) = &select.from {
            self.from_expr_lin(&from.expr, parent, &mut relations, &mut joins);
        }
        let scope = Scope {
            relations: &relations,
            parent,
        };

        let mut outputs = vec![];
        for (i, select_expr) in select.exprs.iter().enumerate() {
            let text = self.text(select_expr.span());
            match select_expr {
                SelectExpr::All(all) => {
                    let all_relations: Vec<&Relation> = relations.iter().collect();
                    outputs.extend(self.star_lin(&all_relations, all.except.as_ref(), text));
                }
                SelectExpr::ColAll(col_all) => {
                    let qualifier = col_all.qualifier.path.join(".");
                    match relations.iter().find(|r| r.matches(&qualifier)) {
                        Some(relation) => {
                            outputs.extend(self.star_lin(&[relation], col_all.except.as_ref(), text))
                        }
                        None => {
                            self.resolution_error(format!(
                                "Table `{}` not found in context.",
                                qualifier
                            ));
                            outputs.push(OutputColumn::wildcard(text, vec![qualifier]));
                        }
                    }
                }
                SelectExpr::Col(col) => {
                    let classification = classify_expr(&col.expr, &text, self.dialect);
                    let mut origins = vec![];
                    self.expr_origins(&col.expr, &scope, &mut origins);
                    let name = output_name(&col.expr, col.alias.as_ref(), i);
                    log::debug!(
                        "{} <- {} ({})",
                        name,
                        text,
                        classification.transformation_subtype
                    );
                    outputs.push(OutputColumn {
                        name,
                        text,
                        sources: origins
                            .into_iter()
                            .map(|origin| ResolvedSource {
                                table: origin.table,
                                column: origin.column,
                                classification: effective_classification(
                                    &classification,
                                    origin.carried,
                                ),
                            })
                            .collect(),
                        wildcard_tables: None,
                    });
                }
            }
        }

        self.join_lin(&joins, &relations, &scope);
        if let Some(r#where) = &select.r#where {
            self.reference_expr(&r#where.expr, &scope, TransformationSubtype::Filter);
        }
        if let Some(group_by) = &select.group_by {
            if let GroupByExpr::Items(items) = &group_by.expr {
                for item in items {
                    self.reference_output_expr(
                        item,
                        &scope,
                        &outputs,
                        TransformationSubtype::GroupBy,
                    );
                }
            }
        }
        if let Some(having) = &select.having {
            self.reference_expr(&having.expr, &scope, TransformationSubtype::Filter);
        }
        if let Some(qualify) = &select.qualify {
            self.reference_expr(&qualify.expr, &scope, TransformationSubtype::Filter);
        }
        if let Some(order_by) = order_by {
            for expr in &order_by.exprs {
                self.reference_output_expr(
                    &expr.expr,
                    &scope,
                    &outputs,
                    TransformationSubtype::Sort,
                );
            }
        }

        outputs
    }

    /// Tables a DML statement reads or modifies, plus its `WHERE` filter columns.
    fn dml_lin(
        &mut self,
        table: &crate::ast::PathExpr,
        alias: Option<&ParseToken>,
        from: Option<&crate::ast::From>,
        r#where: Option<&crate::ast::Where>,
    ) {
        let name = table.name();
        self.source_tables.insert(name.clone());
        let mut relations = vec![Relation {
            alias: alias.map(ParseToken::identifier),
            kind: RelationKind::Table(name),
        }];
        let mut joins = vec![];
        if let Some(from) = from {
            self.from_expr_lin(&from.expr, None, &mut relations, &mut joins);
        }
        let scope = Scope {
            relations: &relations,
            parent: None,
        };
        self.join_lin(&joins, &relations, &scope);
        if let Some(r#where) = r#where {
            self.reference_expr(&r#where.expr, &scope, TransformationSubtype::Filter);
        }
    }

    /// Returns the write target and the projected columns of the statement's primary query.
    fn statement_lin(
        &mut self,
        statement: &Statement,
    ) -> (Option<String>, Result<Vec<OutputColumn>, String>) {
        match statement {
            Statement::Query(query_statement) => {
                (None, Ok(self.query_expr_lin(&query_statement.query, None)))
            }
            Statement::Insert(insert) => {
                let target = insert.table.name();
                self.source_tables.insert(target.clone());
                let target = Some(target);
                let Some(query) = &insert.query else {
                    return (target, Err(NO_SELECT_ERROR.to_owned()));
                };
                let mut outputs = self.query_expr_lin(query, None);
                if let Some(columns) = &insert.columns {
                    let names: Vec<String> = columns.iter().map(ParseToken::identifier).collect();
                    rename_outputs(&mut outputs, &names);
                }
                (target, Ok(outputs))
            }
            Statement::CreateTable(create_table) => match &create_table.query {
                Some(query) => {
                    self.source_tables.insert(create_table.name.name());
                    let mut outputs = self.query_expr_lin(query, None);
                    if let Some(schema) = &create_table.schema {
                        let names: Vec<String> =
                            schema.iter().map(|col| col.name.identifier()).collect();
                        rename_outputs(&mut outputs, &names);
                    }
                    (Some(create_table.name.name()), Ok(outputs))
                }
                None => {
                    self.source_tables.insert(create_table.name.name());
                    (None, Err(NO_SELECT_ERROR.to_owned()))
                }
            },
            Statement::CreateView(create_view) => {
                self.source_tables.insert(create_view.name.name());
                let mut outputs = self.query_expr_lin(&create_view.query, None);
                if let Some(columns) = &create_view.columns {
                    let names: Vec<String> = columns.iter().map(ParseToken::identifier).collect();
                    rename_outputs(&mut outputs, &names);
                }
                (Some(create_view.name.name()), Ok(outputs))
            }
            Statement::Update(update) => {
                self.dml_lin(
                    &update.table,
                    update.alias.as_ref(),
                    update.from.as_ref(),
                    update.r#where.as_ref(),
                );
                (None, Err(NO_SELECT_ERROR.to_owned()))
            }
            Statement::Delete(delete) => {
                self.dml_lin(
                    &delete.table,
                    delete.alias.as_ref(),
                    delete.using.as_ref(),
                    delete.r#where.as_ref(),
                );
                (None, Err(NO_SELECT_ERROR.to_owned()))
            }
            Statement::Truncate(truncate) => {
                self.source_tables.insert(truncate.table.name());
                (None, Err(NO_SELECT_ERROR.to_owned()))
            }
            Statement::Drop(drop) => {
                self.source_tables.insert(drop.name.name());
                (None, Err(NO_SELECT_ERROR.to_owned()))
            }
        }
    }
}

struct Analysis {
    result: SqlLineageResult,
    outputs: Result<Vec<OutputColumn>, String>,
}

/// Extracts column lineage from SQL statements of one dialect.
#[derive(Debug, Clone)]
pub struct LineageParser<'a> {
    dialect: Dialect,
    namespace: String,
    catalog: Option<&'a Catalog>,
}

impl<'a> LineageParser<'a> {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            namespace: UNKNOWN.to_owned(),
            catalog: None,
        }
    }

    /// Namespace reported for every source column.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_owned();
        self
    }

    /// Enables schema-aware resolution.
    pub fn with_catalog(mut self, catalog: &'a Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn source_column(&self, source: &ResolvedSource) -> SourceColumn {
        SourceColumn {
            namespace: self.namespace.clone(),
            table: source.table.clone(),
            column: source.column.clone(),
            transformation_type: source.classification.transformation_type,
            transformation_subtype: source.classification.transformation_subtype,
            description: source.classification.description.clone(),
        }
    }

    fn column_lineage(&self, output: &OutputColumn) -> ColumnLineage {
        ColumnLineage {
            column: output.name.clone(),
            source_columns: output
                .sources
                .iter()
                .map(|s| self.source_column(s))
                .collect(),
            transformation_description: Some(format!("Expression: {}", output.text)),
        }
    }

    fn referenced_columns(
        &self,
        referenced: IndexMap<(String, String), BTreeSet<TransformationSubtype>>,
    ) -> Vec<ReferencedColumn> {
        referenced
            .into_iter()
            .map(|((table, column), subtypes)| ReferencedColumn {
                namespace: self.namespace.clone(),
                table,
                column,
                subtypes: subtypes.into_iter().collect(),
            })
            .collect()
    }

    fn analyze(&self, sql: &str) -> Analysis {
        let mut result = SqlLineageResult::empty(sql, self.dialect);

        let ast = match parse_sql(sql, self.dialect) {
            Ok(ast) => ast,
            Err(err) => {
                let msg = format!("Parse error: {}", err);
                result.parse_errors.push(msg.clone());
                return Analysis {
                    result,
                    outputs: Err(msg),
                };
            }
        };
        let Some(statement) = ast.statements.first() else {
            result.parse_errors.push(NO_SELECT_ERROR.to_owned());
            return Analysis {
                result,
                outputs: Err(NO_SELECT_ERROR.to_owned()),
            };
        };
        if ast.statements.len() > 1 {
            result.parse_errors.push(format!(
                "Found {} statements: only the first one was analyzed.",
                ast.statements.len()
            ));
        }

        let source: Vec<char> = sql.chars().collect();
        let mut extractor = Extractor::new(&source, self.dialect, None);
        let (target_table, outputs) = extractor.statement_lin(statement);
        result.source_tables = extractor.source_tables.iter().cloned().collect();
        result.target_table = target_table;
        result.referenced_columns = self.referenced_columns(extractor.referenced);

        let mut outputs = match outputs {
            Ok(outputs) => outputs,
            Err(msg) => {
                result.parse_errors.push(msg.clone());
                return Analysis {
                    result,
                    outputs: Err(msg),
                };
            }
        };

        if let Some(catalog) = self.catalog {
            let mut schema_extractor = Extractor::new(&source, self.dialect, Some(catalog));
            let (_, schema_outputs) = schema_extractor.statement_lin(statement);
            match schema_outputs {
                Ok(schema_outputs) if schema_extractor.resolution_errors.is_empty() => {
                    outputs = schema_outputs;
                    result.referenced_columns =
                        self.referenced_columns(schema_extractor.referenced);
                }
                _ => {
                    for err in schema_extractor.resolution_errors {
                        result
                            .parse_errors
                            .push(format!("Schema-aware resolution failed: {}", err));
                    }
                }
            }
        }

        result.column_lineages = outputs
            .iter()
            .filter(|output| !output.sources.is_empty())
            .map(|output| self.column_lineage(output))
            .collect();
        Analysis {
            result,
            outputs: Ok(outputs),
        }
    }

    /// Lineage of every projected column of the first statement in `sql`.
    /// Failures are reported in `parse_errors`, never as an `Err`.
    pub fn parse(&self, sql: &str) -> SqlLineageResult {
        let result = self.analyze(sql).result;
        log::debug!(
            "Lineage of {}: {} columns, {} errors",
            &result.sql_hash[..12],
            result.column_lineages.len(),
            result.parse_errors.len()
        );
        result
    }

    /// Sources of the projected column named `target_column` (case-insensitive).
    pub fn column_dependencies(&self, sql: &str, target_column: &str) -> ColumnDependencies {
        let analysis = self.analyze(sql);
        let mut dependencies = ColumnDependencies {
            sql_hash: analysis.result.sql_hash,
            target_column: target_column.to_owned(),
            source_columns: vec![],
            transformation_description: None,
            error: None,
        };
        match analysis.outputs {
            Err(msg) => dependencies.error = Some(msg),
            Ok(outputs) => {
                match outputs
                    .iter()
                    .find(|o| o.name.eq_ignore_ascii_case(target_column))
                {
                    Some(output) => {
                        let lineage = self.column_lineage(output);
                        dependencies.source_columns = lineage.source_columns;
                        dependencies.transformation_description =
                            lineage.transformation_description;
                    }
                    None => {
                        dependencies.error = Some(format!(
                            "Column '{}' not found in SELECT clause",
                            target_column
                        ))
                    }
                }
            }
        }
        dependencies
    }

    /// Parses many statements, in parallel when `parallel` is set. Results keep the input order.
    pub fn parse_many(&self, sqls: &[&str], parallel: bool) -> Vec<SqlLineageResult> {
        if parallel {
            sqls.par_iter().map(|sql| self.parse(sql)).collect()
        } else {
            sqls.iter().map(|sql| self.parse(sql)).collect()
        }
    }
}

pub fn parse_sql_lineage(
    sql: &str,
    dialect: Dialect,
    catalog: Option<&Catalog>,
) -> SqlLineageResult {
    let parser = LineageParser::new(dialect);
    match catalog {
        Some(catalog) => parser.with_catalog(catalog).parse(sql),
        None => parser.parse(sql),
    }
}

pub fn extract_column_dependencies(
    sql: &str,
    target_column: &str,
    dialect: Dialect,
    catalog: Option<&Catalog>,
) -> ColumnDependencies {
    let parser = LineageParser::new(dialect);
    match catalog {
        Some(catalog) => parser.with_catalog(catalog).column_dependencies(sql, target_column),
        None => parser.column_dependencies(sql, target_column),
    }
}

#[cfg(test)]
mod tests {
    use super::{TransformationSubtype, parse_sql_lineage, sql_hash};
    use crate::dialect::Dialect;

    #[test]
    fn test_sql_hash_normalizes_whitespace_only() {
        assert_eq!(sql_hash("SELECT 1"), sql_hash("  SELECT \n\t 1 "));
        assert_ne!(sql_hash("SELECT 1"), sql_hash("select 1"));
        assert_eq!(sql_hash("SELECT 1").len(), 64);
    }

    #[test]
    fn test_output_names() {
        let result = parse_sql_lineage(
            "SELECT a, t.b, c AS d, a + 1, CAST(b AS int) FROM t",
            Dialect::Redshift,
            None,
        );
        let names: Vec<&str> = result
            .column_lineages
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "d", "column_3", "b"]);
    }

    #[test]
    fn test_literal_columns_are_omitted() {
        let result = parse_sql_lineage("SELECT 1 AS one, a FROM t", Dialect::Redshift, None);
        assert_eq!(result.column_lineages.len(), 1);
        assert_eq!(result.column_lineages[0].column, "a");
    }

    #[test]
    fn test_cte_classification_is_carried_through_identity() {
        let result = parse_sql_lineage(
            "WITH totals AS (SELECT id, SUM(amount) AS total FROM orders GROUP BY id) \
             SELECT total FROM totals",
            Dialect::Redshift,
            None,
        );
        assert_eq!(result.source_tables, vec!["orders"]);
        let source = &result.column_lineages[0].source_columns[0];
        assert_eq!(source.table, "orders");
        assert_eq!(source.column, "amount");
        assert_eq!(source.transformation_subtype, TransformationSubtype::Aggregation);
        assert_eq!(source.description, "Aggregated: SUM(amount)");
    }

    #[test]
    fn test_outer_classification_wins_over_carried() {
        let result = parse_sql_lineage(
            "SELECT UPPER(n) AS u FROM (SELECT SUM(x) AS n FROM t) s",
            Dialect::Redshift,
            None,
        );
        let source = &result.column_lineages[0].source_columns[0];
        assert_eq!(source.table, "t");
        assert_eq!(source.transformation_subtype, TransformationSubtype::Transformation);
    }
}
