use crate::{app_env, db, persistence};
use dotenv::dotenv;
use rand::{Rng, thread_rng};
use sqlx::{Connection, PgConnection, PgPool};
use std::env;
use std::future::Future;

const TEST_DB_PREFIX: &str = "task_tracker_test_";

/// A throwaway database named `task_tracker_test_<random number>`. Databases from runs that
/// panicked before cleanup are left behind and share the prefix.
struct TestDatabase {
    base_url: String,
    db_name: String,
}

impl TestDatabase {
    async fn create(base_url: &str) -> Result<Self, sqlx::Error> {
        let db_name = format!("{TEST_DB_PREFIX}{}", thread_rng().gen_range(10_000..99_999));
        let mut conn = PgConnection::connect(base_url).await?;

        sqlx::query(&format!("CREATE DATABASE {db_name}"))
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        Ok(TestDatabase {
            base_url: base_url.to_owned(),
            db_name,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.db_name)
    }

    async fn drop_db(self) {
        let conn = PgConnection::connect(&self.base_url).await;
        let mut conn = match conn {
            Ok(conn) => conn,
            Err(error) => {
                println!("Could not reconnect to drop test database {}, please remove it manually. Error: {error}", self.db_name);
                return;
            }
        };

        let dropped = sqlx::query(&format!("DROP DATABASE {} WITH (FORCE)", self.db_name))
            .execute(&mut conn)
            .await;
        if let Err(error) = dropped {
            println!("Failed to drop test database {}, please remove it manually. Error: {error}", self.db_name);
        }
    }
}

/// Runs a test against a freshly migrated database, then drops it.
///
/// Expects the TEST_DB_URL environment variable to hold a postgres connection string
/// without a database name.
pub async fn prepare_db_and_test<F, R>(test_fn: F)
where
    F: FnOnce(PgPool, persistence::ExternalConnectivity) -> R,
    R: Future<Output = ()>,
{
    if dotenv().is_err() {
        println!("Test is running without .env file.");
    }

    let base_url = env::var(app_env::test::TEST_DB_URL).unwrap_or_else(|_| {
        panic!(
            "You must provide the {} environment variable as the base postgres connection string",
            app_env::test::TEST_DB_URL
        )
    });
    let test_db = TestDatabase::create(&base_url)
        .await
        .unwrap_or_else(|db_err| panic!("Failed to create test database: {db_err}"));

    let pool = db::connect_sqlx(&test_db.url())
        .await
        .expect("Could not connect to the test database");
    db::migrate(&pool).await.expect("Could not migrate the test database");
    let ext_cxn = persistence::ExternalConnectivity::new(pool.clone())
        .expect("Could not build external connectivity for the test database");

    test_fn(pool.clone(), ext_cxn).await;

    pool.close().await;
    test_db.drop_db().await;
}
