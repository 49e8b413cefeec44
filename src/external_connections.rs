use sqlx::PgConnection;

/// A handle to an active database connection, which may or may not be part of a transaction
pub trait ConnectionHandle {
    fn borrow_connection(&mut self) -> &mut PgConnection;
}

/// Owns the clients used to reach external systems (the database and other HTTP services).
/// Driven adapters ask for a connection through this trait so the business logic never has
/// to know whether it's running inside a transaction.
pub trait ExternalConnectivity: Sync {
    type DbHandle<'cxn_borrow>: ConnectionHandle + Send
    where
        Self: 'cxn_borrow;

    async fn database_cxn(&mut self) -> Result<Self::DbHandle<'_>, anyhow::Error>;

    fn http_client(&self) -> &reqwest_middleware::ClientWithMiddleware;
}

/// ExternalConnectivity which can open a database transaction
pub trait Transactable: ExternalConnectivity {
    type Handle: TransactionHandle;

    async fn start_transaction(&self) -> Result<Self::Handle, anyhow::Error>;
}

/// ExternalConnectivity with an open transaction that needs to be committed
pub trait TransactionHandle: ExternalConnectivity {
    async fn commit(self) -> Result<(), anyhow::Error>;
}
