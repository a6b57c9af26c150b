//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use fundpool::api::middleware::sha256_hex;

/// Integration tests share one database; serialize the ones that truncate it.
pub static DB_LOCK: Mutex<()> = Mutex::const_new(());

pub const ADMIN_USER_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const USER_ID: &str = "22222222-2222-2222-2222-222222222222";
pub const OTHER_USER_ID: &str = "33333333-3333-3333-3333-333333333333";

pub const ADMIN_TOKEN: &str = "admin_token_123";
pub const USER_TOKEN: &str = "user_token_123";
pub const OTHER_TOKEN: &str = "other_token_123";
pub const EXPIRED_TOKEN: &str = "expired_token_123";

pub fn admin_user_id() -> Uuid {
    ADMIN_USER_ID.parse().unwrap()
}

pub fn user_id() -> Uuid {
    USER_ID.parse().unwrap()
}

pub fn other_user_id() -> Uuid {
    OTHER_USER_ID.parse().unwrap()
}

/// Setup test database - truncate tables and seed test users + sessions
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    // Clean up DB for fresh state
    sqlx::query(
        "TRUNCATE TABLE audit_logs, notifications, transactions, remittances, budgets, \
         fund_pool_settings, sessions, users CASCADE",
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to clean up DB");

    // Seed users
    let users = [
        (admin_user_id(), "Ada Admin", "admin@example.com", "ADMIN"),
        (user_id(), "Uma User", "user@example.com", "USER"),
        (other_user_id(), "Omar Other", "other@example.com", "USER"),
    ];

    for (id, name, email, role) in users {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role)
        .execute(&mut *tx)
        .await
        .expect("Failed to seed user");
    }

    // Seed sessions; the gate stores and matches SHA-256 digests only
    let sessions = [
        (ADMIN_TOKEN, admin_user_id(), "1 hour"),
        (USER_TOKEN, user_id(), "1 hour"),
        (OTHER_TOKEN, other_user_id(), "1 hour"),
    ];

    for (token, owner, ttl) in sessions {
        sqlx::query(&format!(
            "INSERT INTO sessions (token_hash, user_id, expires_at) \
             VALUES ($1, $2, NOW() + INTERVAL '{}')",
            ttl
        ))
        .bind(sha256_hex(token))
        .bind(owner)
        .execute(&mut *tx)
        .await
        .expect("Failed to seed session");
    }

    // An already-expired session for the 401 path
    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, expires_at) \
         VALUES ($1, $2, NOW() - INTERVAL '1 minute')",
    )
    .bind(sha256_hex(EXPIRED_TOKEN))
    .bind(user_id())
    .execute(&mut *tx)
    .await
    .expect("Failed to seed expired session");

    tx.commit().await.expect("Failed to commit transaction");

    pool
}
