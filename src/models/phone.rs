#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Phone {
    pub id: i32,
    pub client_id: Option<i32>,
    pub phone_number: Option<String>,
}
