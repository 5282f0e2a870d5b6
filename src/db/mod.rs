mod error;
mod search;

use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{ConnectOptions, Connection, PgPool, Transaction};
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::models::{Client, Phone};

pub use error::{ErrorKind, StoreError};
pub use search::{contains_pattern, escape_like};

pub type Result<T> = std::result::Result<T, StoreError>;

const CREATE_CLIENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS clients (
        id SERIAL PRIMARY KEY,
        first_name VARCHAR(50),
        last_name VARCHAR(50),
        email VARCHAR(100)
    )
"#;

const CREATE_PHONES: &str = r#"
    CREATE TABLE IF NOT EXISTS phones (
        id SERIAL PRIMARY KEY,
        client_id INTEGER REFERENCES clients(id) ON DELETE CASCADE,
        phone_number VARCHAR(20)
    )
"#;

const INSERT_CLIENT: &str = r#"
    INSERT INTO clients (first_name, last_name, email)
    VALUES ($1, $2, $3)
    RETURNING id
"#;

const INSERT_PHONE: &str = r#"
    INSERT INTO phones (client_id, phone_number)
    VALUES ($1, $2)
    RETURNING id
"#;

const UPDATE_CLIENT: &str = r#"
    UPDATE clients
    SET first_name = $1, last_name = $2, email = $3
    WHERE id = $4
"#;

const DELETE_PHONE: &str = "DELETE FROM phones WHERE id = $1";

const DELETE_CLIENT: &str = "DELETE FROM clients WHERE id = $1";

const FIND_CLIENTS: &str = r#"
    SELECT id, first_name, last_name, email
    FROM clients
    WHERE first_name ILIKE $1 ESCAPE '\'
       OR last_name ILIKE $1 ESCAPE '\'
       OR email ILIKE $1 ESCAPE '\'
"#;

const SELECT_CLIENT: &str = "SELECT id, first_name, last_name, email FROM clients WHERE id = $1";

const SELECT_PHONE: &str = "SELECT id, client_id, phone_number FROM phones WHERE id = $1";

const SELECT_PHONES_BY_CLIENT: &str =
    "SELECT id, client_id, phone_number FROM phones WHERE client_id = $1 ORDER BY id ASC";

/// Data access for clients and their phone numbers.
///
/// Every public operation runs in its own transaction: begin, one statement,
/// commit. Nothing is cached between calls.
pub struct ClientStore {
    pool: PgPool,
}

impl ClientStore {
    /// Connect using the pool settings from `config`.
    ///
    /// The server is contacted exactly once up front; a refused or rejected
    /// connection is returned immediately instead of being retried until the
    /// acquire timeout.
    pub async fn new(config: &Config) -> Result<Self> {
        let options = config::connect_options(config.database_url()).map_err(connect_error)?;

        let conn = options.connect().await.map_err(connect_error)?;
        conn.close().await.map_err(connect_error)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy_with(options);

        info!(max_connections = config.max_connections, "client store connected");
        Ok(Self { pool })
    }

    /// Connect with a single connection string and default pool settings.
    pub async fn connect(conn_str: &str) -> Result<Self> {
        Self::new(&Config::from_database_url(conn_str)).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, statement: &str) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| transaction_error("BEGIN", statement, e))
    }

    async fn commit(tx: Transaction<'static, Postgres>, statement: &str) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| transaction_error("COMMIT", statement, e))
    }

    /// Create the `clients` and `phones` tables if they do not exist yet.
    pub async fn initialize_schema(&self) -> Result<()> {
        let mut tx = self.begin(CREATE_CLIENTS).await?;

        for ddl in [CREATE_CLIENTS, CREATE_PHONES] {
            debug!(statement = ddl.trim(), "executing ddl");
            sqlx::query(ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| report(StoreError::from_sqlx_ddl(ddl, e)))?;
        }

        Self::commit(tx, CREATE_PHONES).await?;

        info!("client schema ready");
        Ok(())
    }

    // Client operations
    pub async fn add_client(&self, first_name: &str, last_name: &str, email: &str) -> Result<i32> {
        let mut tx = self.begin(INSERT_CLIENT).await?;

        debug!(statement = INSERT_CLIENT.trim(), "adding client");
        let id = sqlx::query_scalar::<_, i32>(INSERT_CLIENT)
            .bind(first_name)
            .bind(last_name)
            .bind(email)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(INSERT_CLIENT, e)))?;

        Self::commit(tx, INSERT_CLIENT).await?;

        Ok(id)
    }

    /// Overwrite a client's fields. Returns the number of rows changed, which
    /// is zero when no client has `client_id`.
    pub async fn update_client(
        &self,
        client_id: i32,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<u64> {
        let mut tx = self.begin(UPDATE_CLIENT).await?;

        debug!(statement = UPDATE_CLIENT.trim(), client_id, "updating client");
        let result = sqlx::query(UPDATE_CLIENT)
            .bind(first_name)
            .bind(last_name)
            .bind(email)
            .bind(client_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(UPDATE_CLIENT, e)))?;

        Self::commit(tx, UPDATE_CLIENT).await?;

        Ok(result.rows_affected())
    }

    /// Delete a client. Its phones go with it through the cascading foreign key.
    pub async fn delete_client(&self, client_id: i32) -> Result<u64> {
        let mut tx = self.begin(DELETE_CLIENT).await?;

        debug!(statement = DELETE_CLIENT, client_id, "deleting client");
        let result = sqlx::query(DELETE_CLIENT)
            .bind(client_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(DELETE_CLIENT, e)))?;

        Self::commit(tx, DELETE_CLIENT).await?;

        Ok(result.rows_affected())
    }

    /// Case-insensitive substring search over first name, last name and email.
    ///
    /// `%`, `_` and `\` in `search_term` match literally.
    pub async fn find_client(&self, search_term: &str) -> Result<Vec<Client>> {
        // Text columns cannot hold NUL, so such a term never matches.
        if search_term.contains('\0') {
            return Ok(Vec::new());
        }

        let pattern = contains_pattern(search_term);
        let mut tx = self.begin(FIND_CLIENTS).await?;

        debug!(statement = FIND_CLIENTS.trim(), pattern = %pattern, "searching clients");
        let clients = sqlx::query_as::<_, Client>(FIND_CLIENTS)
            .bind(&pattern)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(FIND_CLIENTS, e)))?;

        Self::commit(tx, FIND_CLIENTS).await?;

        Ok(clients)
    }

    pub async fn get_client(&self, client_id: i32) -> Result<Option<Client>> {
        let mut tx = self.begin(SELECT_CLIENT).await?;

        let client = sqlx::query_as::<_, Client>(SELECT_CLIENT)
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(SELECT_CLIENT, e)))?;

        Self::commit(tx, SELECT_CLIENT).await?;

        Ok(client)
    }

    // Phone operations
    pub async fn add_phone(&self, client_id: i32, phone_number: &str) -> Result<i32> {
        let mut tx = self.begin(INSERT_PHONE).await?;

        debug!(statement = INSERT_PHONE.trim(), client_id, "adding phone");
        let id = sqlx::query_scalar::<_, i32>(INSERT_PHONE)
            .bind(client_id)
            .bind(phone_number)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(INSERT_PHONE, e)))?;

        Self::commit(tx, INSERT_PHONE).await?;

        Ok(id)
    }

    pub async fn delete_phone(&self, phone_id: i32) -> Result<u64> {
        let mut tx = self.begin(DELETE_PHONE).await?;

        debug!(statement = DELETE_PHONE, phone_id, "deleting phone");
        let result = sqlx::query(DELETE_PHONE)
            .bind(phone_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(DELETE_PHONE, e)))?;

        Self::commit(tx, DELETE_PHONE).await?;

        Ok(result.rows_affected())
    }

    pub async fn get_phone(&self, phone_id: i32) -> Result<Option<Phone>> {
        let mut tx = self.begin(SELECT_PHONE).await?;

        let phone = sqlx::query_as::<_, Phone>(SELECT_PHONE)
            .bind(phone_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(SELECT_PHONE, e)))?;

        Self::commit(tx, SELECT_PHONE).await?;

        Ok(phone)
    }

    pub async fn get_phones_by_client(&self, client_id: i32) -> Result<Vec<Phone>> {
        let mut tx = self.begin(SELECT_PHONES_BY_CLIENT).await?;

        let phones = sqlx::query_as::<_, Phone>(SELECT_PHONES_BY_CLIENT)
            .bind(client_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| report(StoreError::from_sqlx(SELECT_PHONES_BY_CLIENT, e)))?;

        Self::commit(tx, SELECT_PHONES_BY_CLIENT).await?;

        Ok(phones)
    }
}

/// Any failure to connect, including authentication, is a connectivity error.
fn connect_error(err: sqlx::Error) -> StoreError {
    report(StoreError::new(ErrorKind::Connectivity, "CONNECT", err.to_string()))
}

/// Failure to open or close an operation's transaction, attributed to that operation's statement.
fn transaction_error(phase: &str, statement: &str, err: sqlx::Error) -> StoreError {
    let err = StoreError::from_sqlx(statement, err);
    report(StoreError::new(err.kind(), statement, format!("{phase} failed: {}", err.message())))
}

fn report(err: StoreError) -> StoreError {
    warn!(kind = %err.kind(), statement = err.statement(), message = err.message(), "statement failed");
    err
}

/// Connect and make sure the schema exists
pub async fn init(config: &Config) -> Result<ClientStore> {
    let store = ClientStore::new(config).await?;

    store.initialize_schema().await?;

    Ok(store)
}
