use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// SQL grammar variant. Only affects tokenization, a handful of grammar
/// switches and the function names recognized by the classifier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Dialect {
    #[default]
    Redshift,
    Athena,
    Postgres,
    Presto,
    Mysql,
    Bigquery,
    Snowflake,
    Spark,
    Hive,
}

impl Dialect {
    /// `"ident"` is a quoted identifier rather than a string literal.
    pub fn double_quoted_identifiers(&self) -> bool {
        matches!(
            self,
            Dialect::Redshift
                | Dialect::Postgres
                | Dialect::Presto
                | Dialect::Athena
                | Dialect::Snowflake
        )
    }

    /// `` `ident` `` is a quoted identifier.
    pub fn backtick_identifiers(&self) -> bool {
        matches!(
            self,
            Dialect::Bigquery | Dialect::Mysql | Dialect::Hive | Dialect::Spark | Dialect::Athena
        )
    }

    /// `#` starts a line comment.
    pub fn hash_comments(&self) -> bool {
        matches!(self, Dialect::Mysql | Dialect::Bigquery)
    }

    /// `expr::type` casts.
    pub fn double_colon_cast(&self) -> bool {
        matches!(
            self,
            Dialect::Redshift | Dialect::Postgres | Dialect::Snowflake
        )
    }

    /// `SELECT TOP n ...`
    pub fn select_top(&self) -> bool {
        matches!(self, Dialect::Redshift | Dialect::Snowflake)
    }

    /// Case-insensitive `ILIKE` operator.
    pub fn ilike(&self) -> bool {
        matches!(
            self,
            Dialect::Redshift | Dialect::Postgres | Dialect::Snowflake | Dialect::Spark
        )
    }

    /// `MINUS` as a synonym of `EXCEPT`.
    pub fn minus_set_operator(&self) -> bool {
        matches!(self, Dialect::Redshift | Dialect::Snowflake)
    }

    /// Aggregate functions beyond the ones every dialect shares.
    pub(crate) fn extra_aggregate_functions(&self) -> &'static [&'static str] {
        match self {
            Dialect::Redshift => &["median", "stddev", "variance", "approximate"],
            Dialect::Postgres => &["bool_and", "bool_or", "json_agg", "jsonb_agg", "stddev"],
            Dialect::Presto | Dialect::Athena => &[
                "approx_distinct",
                "approx_percentile",
                "count_if",
                "map_agg",
                "arbitrary",
            ],
            Dialect::Mysql => &["group_concat", "bit_and", "bit_or", "std"],
            Dialect::Bigquery => &["any_value", "countif", "logical_and", "logical_or"],
            Dialect::Snowflake => &["median", "any_value", "count_if", "object_agg"],
            Dialect::Spark | Dialect::Hive => &["collect_list", "collect_set", "first", "last"],
        }
    }

    /// String and coalescing functions beyond the shared ones.
    pub(crate) fn extra_string_functions(&self) -> &'static [&'static str] {
        match self {
            Dialect::Redshift | Dialect::Postgres => &["btrim", "split_part", "initcap", "nvl"],
            Dialect::Presto | Dialect::Athena => &["split_part", "regexp_extract", "format"],
            Dialect::Mysql => &["ifnull", "concat_ws", "substring_index"],
            Dialect::Bigquery => &["ifnull", "format", "regexp_extract", "split"],
            Dialect::Snowflake => &["nvl", "nvl2", "ifnull", "split_part", "initcap"],
            Dialect::Spark | Dialect::Hive => &["nvl", "concat_ws", "regexp_extract", "split"],
        }
    }

    /// Date and time functions beyond the shared ones.
    pub(crate) fn extra_date_functions(&self) -> &'static [&'static str] {
        match self {
            Dialect::Redshift => &["getdate", "sysdate", "convert_timezone", "months_between"],
            Dialect::Postgres => &["age", "date_part", "now", "make_date"],
            Dialect::Presto | Dialect::Athena => &[
                "date_add",
                "date_diff",
                "date_format",
                "date_parse",
                "from_unixtime",
                "from_iso8601_timestamp",
            ],
            Dialect::Mysql => &["date_add", "date_sub", "date_format", "str_to_date", "now"],
            Dialect::Bigquery => &[
                "date_add",
                "date_sub",
                "date_diff",
                "format_date",
                "parse_date",
                "timestamp_trunc",
            ],
            Dialect::Snowflake => &["timestampadd", "timestampdiff", "convert_timezone"],
            Dialect::Spark | Dialect::Hive => &[
                "date_add",
                "date_sub",
                "date_format",
                "from_unixtime",
                "unix_timestamp",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Dialect;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_dialect_names() {
        for dialect in Dialect::iter() {
            assert_eq!(Dialect::from_str(dialect.as_ref()).unwrap(), dialect);
        }
        assert_eq!(Dialect::from_str("BigQuery").unwrap(), Dialect::Bigquery);
        assert_eq!(Dialect::default(), Dialect::Redshift);
        assert!(Dialect::from_str("oracle").is_err());
    }

    #[test]
    fn test_athena_accepts_both_quotes() {
        assert!(Dialect::Athena.double_quoted_identifiers());
        assert!(Dialect::Athena.backtick_identifiers());
        assert!(!Dialect::Bigquery.double_quoted_identifiers());
    }
}
