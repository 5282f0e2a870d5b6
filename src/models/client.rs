/// A row of the `clients` table.
///
/// Text columns are nullable in the schema, so they decode as `Option`.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: i32,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}
