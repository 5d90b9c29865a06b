//! Repository implementations cho SQLite
//!
//! Đọc dùng `&SqlitePool`; các câu lệnh nằm trong transaction nhận
//! `&mut SqliteConnection` (gọi với `&mut *tx`).

use crate::error::{PersistenceError, PersistenceResult};
use crate::sqlite::schema::*;
use chrono::Utc;
use creditgate_core::{CalculationPolicy, Record, RecordFilter, UnlockFact};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// View Credit Repository
// ============================================================================

/// Repository cho view_credits table
pub struct ViewCreditRepo;

impl ViewCreditRepo {
    /// Lấy balance của owner
    pub async fn get(pool: &SqlitePool, owner_id: &str) -> PersistenceResult<Option<ViewCreditRow>> {
        let row = sqlx::query_as::<_, ViewCreditRow>(
            "SELECT * FROM view_credits WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Tạo balance với allocation ban đầu.
    ///
    /// Trả về `false` nếu owner đã có balance (không ghi đè).
    pub async fn create(pool: &SqlitePool, owner_id: &str, allocated: i64) -> PersistenceResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO view_credits (owner_id, allocated, used, version, updated_at) VALUES (?, ?, 0, 0, ?)",
        )
        .bind(owner_id)
        .bind(allocated.max(0))
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Cộng thêm allocation (purchase/grant)
    pub async fn grant(pool: &SqlitePool, owner_id: &str, amount: i64) -> PersistenceResult<ViewCreditRow> {
        if amount <= 0 {
            return Err(PersistenceError::invalid_value("grant amount", amount));
        }
        sqlx::query_as::<_, ViewCreditRow>(
            r#"
            UPDATE view_credits
            SET allocated = allocated + ?, version = version + 1, updated_at = ?
            WHERE owner_id = ?
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::not_found("ViewCredit", owner_id))
    }

    /// Atomic increment-and-check: tăng `used` chỉ khi `used < allocated`.
    ///
    /// `None` nghĩa là không đủ credit (hoặc owner chưa có balance).
    pub async fn increment_used_checked(
        conn: &mut SqliteConnection,
        owner_id: &str,
    ) -> PersistenceResult<Option<ViewCreditRow>> {
        let row = sqlx::query_as::<_, ViewCreditRow>(
            r#"
            UPDATE view_credits
            SET used = used + 1, version = version + 1, updated_at = ?
            WHERE owner_id = ? AND used < allocated
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Compare-and-swap trên row version.
    ///
    /// Chỉ ghi khi version vẫn là `expected_version` và `new_used <= allocated`.
    pub async fn compare_and_set_used(
        conn: &mut SqliteConnection,
        owner_id: &str,
        expected_version: i64,
        new_used: i64,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE view_credits
            SET used = ?, version = version + 1, updated_at = ?
            WHERE owner_id = ? AND version = ? AND ? <= allocated
            "#,
        )
        .bind(new_used)
        .bind(Utc::now())
        .bind(owner_id)
        .bind(expected_version)
        .bind(new_used)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Đếm số owners
    pub async fn count(pool: &SqlitePool) -> PersistenceResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM view_credits")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// Unlock Repository
// ============================================================================

/// Repository cho unlock_facts table
pub struct UnlockRepo;

impl UnlockRepo {
    /// Kiểm tra fact (owner, record) đã tồn tại chưa
    pub async fn exists(pool: &SqlitePool, owner_id: &str, record_id: &str) -> PersistenceResult<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM unlock_facts WHERE owner_id = ? AND record_id = ?",
        )
        .bind(owner_id)
        .bind(record_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Ghi fact. Trùng (owner, record) trả về `UniqueViolation`.
    pub async fn insert(conn: &mut SqliteConnection, fact: &UnlockFact) -> PersistenceResult<()> {
        let result = sqlx::query(
            "INSERT INTO unlock_facts (owner_id, record_id, unlocked_at) VALUES (?, ?, ?)",
        )
        .bind(&fact.owner_id)
        .bind(&fact.record_id)
        .bind(fact.unlocked_at)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                PersistenceError::UniqueViolation(format!("{}:{}", fact.owner_id, fact.record_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Lấy tất cả facts của owner, mới nhất trước
    pub async fn list_by_owner(pool: &SqlitePool, owner_id: &str) -> PersistenceResult<Vec<UnlockFactRow>> {
        let rows = sqlx::query_as::<_, UnlockFactRow>(
            "SELECT * FROM unlock_facts WHERE owner_id = ? ORDER BY unlocked_at DESC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_by_owner(pool: &SqlitePool, owner_id: &str) -> PersistenceResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM unlock_facts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    pub async fn count(pool: &SqlitePool) -> PersistenceResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM unlock_facts")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// Policy Repository
// ============================================================================

/// Repository cho calculation_policies table
pub struct PolicyRepo;

impl PolicyRepo {
    pub async fn get(pool: &SqlitePool, owner_id: &str) -> PersistenceResult<Option<PolicyRow>> {
        let row = sqlx::query_as::<_, PolicyRow>(
            "SELECT * FROM calculation_policies WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Thêm policy mới. `false` nếu owner đã có policy.
    pub async fn insert(pool: &SqlitePool, policy: &CalculationPolicy) -> PersistenceResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO calculation_policies
                (owner_id, tier, period_start, period_end, used, unlimited_override, version)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&policy.owner_id)
        .bind(&policy.tier)
        .bind(policy.period_start)
        .bind(policy.period_end)
        .bind(policy.used as i64)
        .bind(policy.unlimited_override)
        .bind(policy.version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Ghi đè policy nếu version vẫn là `expected_version`; version tăng 1.
    pub async fn compare_and_set(
        pool: &SqlitePool,
        policy: &CalculationPolicy,
        expected_version: i64,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE calculation_policies
            SET tier = ?, period_start = ?, period_end = ?, used = ?,
                unlimited_override = ?, version = version + 1
            WHERE owner_id = ? AND version = ?
            "#,
        )
        .bind(&policy.tier)
        .bind(policy.period_start)
        .bind(policy.period_end)
        .bind(policy.used as i64)
        .bind(policy.unlimited_override)
        .bind(&policy.owner_id)
        .bind(expected_version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Record Repository (catalog)
// ============================================================================

/// Repository cho records table
pub struct RecordRepo;

impl RecordRepo {
    pub async fn insert(pool: &SqlitePool, record: &Record) -> PersistenceResult<()> {
        let fields = serde_json::to_string(&record.fields)?;
        let result = sqlx::query(
            "INSERT INTO records (id, name, fields, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(fields)
        .bind(Utc::now())
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(PersistenceError::already_exists("Record", &record.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(pool: &SqlitePool, id: &str) -> PersistenceResult<RecordRow> {
        sqlx::query_as::<_, RecordRow>("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Record", id))
    }

    /// Tìm kiếm theo name/fields, phân trang. Trả về (rows, total_count).
    pub async fn search(
        pool: &SqlitePool,
        filter: &RecordFilter,
    ) -> PersistenceResult<(Vec<RecordRow>, i64)> {
        let pattern = match filter.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => format!("%{}%", q.to_lowercase()),
            _ => "%".to_string(),
        };

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM records WHERE lower(name) LIKE ? OR lower(fields) LIKE ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(pool)
        .await?;

        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT * FROM records
            WHERE lower(name) LIKE ? OR lower(fields) LIKE ?
            ORDER BY name, id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(filter.per_page as i64)
        .bind(filter.offset())
        .fetch_all(pool)
        .await?;

        Ok((rows, total.0))
    }

    pub async fn count(pool: &SqlitePool) -> PersistenceResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// Database initialization
// ============================================================================

/// Khởi tạo database connection pool
pub async fn create_pool(database_url: &str) -> PersistenceResult<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    Ok(pool)
}

/// Chạy migrations
pub async fn run_migrations(pool: &SqlitePool) -> PersistenceResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Tạo database (file) với schema, WAL và busy timeout
pub async fn init_database(database_url: &str) -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// In-memory database cho tests.
///
/// Một connection duy nhất, không bao giờ bị đóng, để database không biến mất.
pub async fn init_in_memory() -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Phiên bản SQLite của backend, dạng (major, minor, patch)
pub async fn sqlite_version(pool: &SqlitePool) -> PersistenceResult<(u32, u32, u32)> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    parse_version(&row.0).ok_or_else(|| PersistenceError::invalid_value("sqlite_version", &row.0))
}

fn parse_version(raw: &str) -> Option<(u32, u32, u32)> {
    let mut parts = raw.trim().split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}
