//! Parameter binding utilities for database queries.
//!
//! This module binds `QueryParam` values to MySQL query objects.

use crate::models::QueryParam;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        // DATETIME columns carry no zone; bind the UTC wall-clock time
        QueryParam::Date(v) => query.bind(v.naive_utc()),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}
