use actix_web::error::ErrorBadRequest;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{MySqlPool, types::Json};

/// SQL bindable value
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Json(Value),
    Null,
}

/// How an updatable column's JSON value is interpreted.
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    Text,
    /// Text restricted to the listed values.
    OneOf(&'static [&'static str]),
    Date,
    /// Whole number no smaller than `min`.
    Count { min: i64 },
    /// RFC 3339 instant.
    Timestamp,
    /// JSON array or object, stored as-is.
    Json,
}

/// An updatable column; `nullable` columns accept JSON `null`.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn convert(column: &Column, value: &Value) -> Result<SqlValue, actix_web::Error> {
    let invalid = || ErrorBadRequest(format!("Invalid value for {}", column.name));

    match (value, column.kind) {
        (Value::Null, _) if column.nullable => Ok(SqlValue::Null),
        (Value::String(s), ColumnKind::Text) => Ok(SqlValue::String(s.trim().to_string())),
        (Value::String(s), ColumnKind::OneOf(allowed)) if allowed.contains(&s.as_str()) => {
            Ok(SqlValue::String(s.clone()))
        }
        (Value::String(s), ColumnKind::Date) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| invalid()),
        (Value::Number(n), ColumnKind::Count { min }) => n
            .as_i64()
            .filter(|v| *v >= min)
            .map(SqlValue::I64)
            .ok_or_else(invalid),
        (Value::String(s), ColumnKind::Timestamp) => DateTime::parse_from_rfc3339(s)
            .map(|at| SqlValue::DateTime(at.with_timezone(&Utc)))
            .map_err(|_| invalid()),
        (Value::Array(_) | Value::Object(_), ColumnKind::Json) => Ok(SqlValue::Json(value.clone())),
        _ => Err(invalid()),
    }
}

/// Builds `UPDATE table SET ... WHERE id_column = ?` from a partial JSON
/// object. Keys outside `columns` are rejected, so no caller-provided text
/// reaches the SQL string.
pub fn build_update_sql(
    table: &str,
    columns: &[Column],
    payload: &Value,
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    let mut assignments = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = columns
            .iter()
            .find(|c| c.name == key)
            .ok_or_else(|| ErrorBadRequest(format!("Field {key} cannot be updated")))?;

        assignments.push(format!("{} = ?", column.name));
        values.push(convert(column, value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Executes the update, returning affected rows.
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(Json(v)),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column {
            name: "name",
            kind: ColumnKind::Text,
            nullable: false,
        },
        Column {
            name: "status",
            kind: ColumnKind::OneOf(&["active", "inactive"]),
            nullable: false,
        },
        Column {
            name: "end_date",
            kind: ColumnKind::Date,
            nullable: true,
        },
        Column {
            name: "calories",
            kind: ColumnKind::Count { min: 0 },
            nullable: true,
        },
        Column {
            name: "performed_at",
            kind: ColumnKind::Timestamp,
            nullable: false,
        },
        Column {
            name: "exercises",
            kind: ColumnKind::Json,
            nullable: false,
        },
    ];

    #[test]
    fn builds_set_clause_from_payload() {
        let update = build_update_sql(
            "members",
            COLUMNS,
            &json!({ "name": " Jane ", "end_date": "2026-12-31" }),
            "id",
            42,
        )
        .unwrap();

        // serde_json keeps object keys sorted.
        assert_eq!(update.sql, "UPDATE members SET end_date = ?, name = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::Date(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
                SqlValue::String("Jane".into()),
                SqlValue::U64(42),
            ]
        );
    }

    #[test]
    fn nullable_columns_accept_null() {
        let update =
            build_update_sql("members", COLUMNS, &json!({ "end_date": null }), "id", 1).unwrap();
        assert_eq!(update.values[0], SqlValue::Null);
    }

    #[test]
    fn numbers_instants_and_documents_convert() {
        let update = build_update_sql(
            "workouts",
            COLUMNS,
            &json!({
                "calories": 0,
                "exercises": [{ "name": "Row" }],
                "performed_at": "2026-10-19T09:30:00+02:00",
            }),
            "id",
            3,
        )
        .unwrap();

        assert_eq!(
            update.values,
            vec![
                SqlValue::I64(0),
                SqlValue::Json(json!([{ "name": "Row" }])),
                SqlValue::DateTime("2026-10-19T07:30:00Z".parse().unwrap()),
                SqlValue::U64(3),
            ]
        );
    }

    #[test]
    fn rejects_unknown_columns_and_bad_values() {
        for payload in [
            json!({}),
            json!([1, 2]),
            json!({ "id = 1; DROP TABLE members; --": "x" }),
            json!({ "status": "banned" }),
            json!({ "name": null }),
            json!({ "end_date": "31/12/2026" }),
            json!({ "calories": -1 }),
            json!({ "calories": 2.5 }),
            json!({ "performed_at": "2026-10-19 07:30" }),
            json!({ "exercises": "squats" }),
        ] {
            assert!(
                build_update_sql("members", COLUMNS, &payload, "id", 1).is_err(),
                "{payload} accepted"
            );
        }
    }
}
