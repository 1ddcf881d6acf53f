use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::db::models::{
    IntegrationRow, IntegrationStatus, KeywordRow, LeadFormRow, LeadSubmissionRow, RankResult,
    SessionRow, SiteRow, UserRow,
};
use crate::db::schema::SQLITE_INIT;
use crate::error::ScopeError;
use crate::providers::Provider;

pub type SqlitePool = Pool<Sqlite>;

/// Record store fronting SQLite. Single writer per row by construction:
/// every mutation is one UPDATE/INSERT, and in-process components never
/// share mutable state with it.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), ScopeError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ---- users / sessions ----

    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<UserRow, ScopeError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, is_admin, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(is_admin as i64)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(UserRow {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_admin,
            created_at: now,
        })
    }

    pub async fn count_users(&self) -> Result<i64, ScopeError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, ScopeError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, is_admin, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_user).transpose()
    }

    pub async fn insert_session(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ScopeError> {
        sqlx::query("INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn session_with_user(
        &self,
        token_hash: &str,
    ) -> Result<Option<(SessionRow, UserRow)>, ScopeError> {
        let row = sqlx::query(
            r#"SELECT s.token_hash, s.user_id, s.expires_at,
                      u.id, u.email, u.password_hash, u.is_admin, u.created_at
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.token_hash = ?"#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let session = SessionRow {
            token_hash: row.try_get("token_hash")?,
            user_id: row.try_get("user_id")?,
            expires_at: parse_ts(row.try_get::<String, _>("expires_at")?)?,
        };
        let user = row_to_user(row)?;
        Ok(Some((session, user)))
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), ScopeError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- sites ----

    pub async fn create_site(
        &self,
        owner_user_id: &str,
        name: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<SiteRow, ScopeError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO sites (id, owner_user_id, name, domain, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_user_id)
        .bind(name)
        .bind(domain)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(SiteRow {
            id,
            owner_user_id: owner_user_id.to_string(),
            name: name.to_string(),
            domain: domain.to_string(),
            created_at: now,
        })
    }

    pub async fn list_sites(&self, owner_user_id: &str) -> Result<Vec<SiteRow>, ScopeError> {
        let rows = sqlx::query(
            "SELECT id, owner_user_id, name, domain, created_at FROM sites WHERE owner_user_id = ? ORDER BY created_at",
        )
        .bind(owner_user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_site).collect()
    }

    pub async fn get_site(&self, id: &str) -> Result<Option<SiteRow>, ScopeError> {
        let row =
            sqlx::query("SELECT id, owner_user_id, name, domain, created_at FROM sites WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(row_to_site).transpose()
    }

    pub async fn delete_site(&self, id: &str) -> Result<(), ScopeError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM integrations WHERE site_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM keywords WHERE site_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- integrations ----

    /// Upsert by the `(site_id, provider)` uniqueness constraint.
    pub async fn upsert_integration(
        &self,
        site_id: &str,
        provider: Provider,
        status: IntegrationStatus,
        config: &Value,
        connected_at: Option<DateTime<Utc>>,
    ) -> Result<IntegrationRow, ScopeError> {
        let id = Uuid::new_v4().to_string();
        let config_text = serde_json::to_string(config)?;
        sqlx::query(
            r#"
            INSERT INTO integrations (id, site_id, provider, status, connected_at, config)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(site_id, provider) DO UPDATE SET
                status=excluded.status,
                connected_at=excluded.connected_at,
                config=excluded.config
            "#,
        )
        .bind(&id)
        .bind(site_id)
        .bind(provider.as_str())
        .bind(status.as_str())
        .bind(connected_at.map(|t| t.to_rfc3339()))
        .bind(config_text)
        .execute(&self.pool)
        .await?;

        self.get_integration(site_id, provider)
            .await?
            .ok_or_else(|| ScopeError::Internal("integration upsert lost".to_string()))
    }

    pub async fn get_integration(
        &self,
        site_id: &str,
        provider: Provider,
    ) -> Result<Option<IntegrationRow>, ScopeError> {
        let row = sqlx::query(
            r#"SELECT id, site_id, provider, status, connected_at, config
               FROM integrations WHERE site_id = ? AND provider = ?"#,
        )
        .bind(site_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_integration).transpose()
    }

    pub async fn list_integrations(
        &self,
        site_id: &str,
    ) -> Result<Vec<IntegrationRow>, ScopeError> {
        let rows = sqlx::query(
            r#"SELECT id, site_id, provider, status, connected_at, config
               FROM integrations WHERE site_id = ? ORDER BY provider"#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_integration).collect()
    }

    /// One write covering both the status transition and the config patch,
    /// so a refresh outcome lands atomically on the row.
    pub async fn update_integration(
        &self,
        site_id: &str,
        provider: Provider,
        status: IntegrationStatus,
        config: &Value,
    ) -> Result<(), ScopeError> {
        let config_text = serde_json::to_string(config)?;
        sqlx::query(
            "UPDATE integrations SET status = ?, config = ? WHERE site_id = ? AND provider = ?",
        )
        .bind(status.as_str())
        .bind(config_text)
        .bind(site_id)
        .bind(provider.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- keywords ----

    pub async fn add_keyword(
        &self,
        site_id: &str,
        phrase: &str,
        now: DateTime<Utc>,
    ) -> Result<KeywordRow, ScopeError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO keywords (id, site_id, phrase, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(site_id)
        .bind(phrase)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(KeywordRow {
            id,
            site_id: site_id.to_string(),
            phrase: phrase.to_string(),
            created_at: now,
            last_result: None,
        })
    }

    pub async fn list_keywords(&self, site_id: &str) -> Result<Vec<KeywordRow>, ScopeError> {
        let rows = sqlx::query(
            "SELECT id, site_id, phrase, created_at, last_result FROM keywords WHERE site_id = ? ORDER BY created_at",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_keyword).collect()
    }

    /// Overwrite the keyword's last-known result. No history is kept.
    pub async fn save_keyword_result(
        &self,
        keyword_id: &str,
        result: &RankResult,
    ) -> Result<(), ScopeError> {
        let result_text = serde_json::to_string(result)?;
        sqlx::query("UPDATE keywords SET last_result = ? WHERE id = ?")
            .bind(result_text)
            .bind(keyword_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- lead forms ----

    pub async fn create_form(&self, site_id: &str, name: &str) -> Result<LeadFormRow, ScopeError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO lead_forms (id, site_id, name) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(site_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(LeadFormRow {
            id,
            site_id: site_id.to_string(),
            name: name.to_string(),
        })
    }

    pub async fn get_form(&self, id: &str) -> Result<Option<LeadFormRow>, ScopeError> {
        let row = sqlx::query("SELECT id, site_id, name FROM lead_forms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(LeadFormRow {
            id: row.try_get("id")?,
            site_id: row.try_get("site_id")?,
            name: row.try_get("name")?,
        }))
    }

    pub async fn insert_submission(
        &self,
        form_id: &str,
        data: &Value,
        client_ip: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<String, ScopeError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO lead_submissions (id, form_id, data, client_ip, submitted_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(form_id)
        .bind(serde_json::to_string(data)?)
        .bind(client_ip)
        .bind(submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn list_submissions(
        &self,
        form_id: &str,
    ) -> Result<Vec<LeadSubmissionRow>, ScopeError> {
        let rows = sqlx::query(
            "SELECT id, form_id, data, client_ip, submitted_at FROM lead_submissions WHERE form_id = ? ORDER BY submitted_at",
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let data_raw: String = row.try_get("data")?;
                let data =
                    serde_json::from_str(&data_raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(LeadSubmissionRow {
                    id: row.try_get("id")?,
                    form_id: row.try_get("form_id")?,
                    data,
                    client_ip: row.try_get("client_ip")?,
                    submitted_at: parse_ts(row.try_get::<String, _>("submitted_at")?)?,
                })
            })
            .collect()
    }

    pub async fn count_submissions(&self, form_id: &str) -> Result<i64, ScopeError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lead_submissions WHERE form_id = ?")
            .bind(form_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    // ---- operator settings ----

    pub async fn get_setting<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ScopeError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value")?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ScopeError> {
        let raw = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_ts(raw: String) -> Result<DateTime<Utc>, ScopeError> {
    let parsed = chrono::DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(parsed.with_timezone(&Utc))
}

fn row_to_user(row: SqliteRow) -> Result<UserRow, ScopeError> {
    Ok(UserRow {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        is_admin: row.try_get::<i64, _>("is_admin")? != 0,
        created_at: parse_ts(row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_site(row: SqliteRow) -> Result<SiteRow, ScopeError> {
    Ok(SiteRow {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        name: row.try_get("name")?,
        domain: row.try_get("domain")?,
        created_at: parse_ts(row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_integration(row: SqliteRow) -> Result<IntegrationRow, ScopeError> {
    let config_raw: String = row.try_get("config")?;
    let config: Value =
        serde_json::from_str(&config_raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let connected_at: Option<String> = row.try_get("connected_at")?;
    Ok(IntegrationRow {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        provider: row.try_get("provider")?,
        status: IntegrationStatus::parse(&row.try_get::<String, _>("status")?),
        connected_at: connected_at.map(parse_ts).transpose()?,
        config,
    })
}

fn row_to_keyword(row: SqliteRow) -> Result<KeywordRow, ScopeError> {
    let last_result: Option<String> = row.try_get("last_result")?;
    let last_result = last_result
        .map(|raw| serde_json::from_str(&raw).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .transpose()?;
    Ok(KeywordRow {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        phrase: row.try_get("phrase")?,
        created_at: parse_ts(row.try_get::<String, _>("created_at")?)?,
        last_result,
    })
}
