//! SQL DDL for initializing the record store.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema. Notable constraints:
/// - one integration row per `(site_id, provider)` pair, enforced here and
///   not in application logic
/// - all timestamps stored as RFC3339 text
/// - integration `config` is an opaque JSON object; its shape is
///   provider-specific
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    owner_user_id TEXT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    domain TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS integrations (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id),
    provider TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'disconnected',
    connected_at TEXT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    UNIQUE(site_id, provider)
);

CREATE TABLE IF NOT EXISTS keywords (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id),
    phrase TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_result TEXT NULL,
    UNIQUE(site_id, phrase)
);

CREATE TABLE IF NOT EXISTS lead_forms (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lead_submissions (
    id TEXT PRIMARY KEY,
    form_id TEXT NOT NULL REFERENCES lead_forms(id),
    data TEXT NOT NULL,
    client_ip TEXT NOT NULL,
    submitted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_owner ON sites(owner_user_id);
CREATE INDEX IF NOT EXISTS idx_integrations_site ON integrations(site_id);
CREATE INDEX IF NOT EXISTS idx_keywords_site ON keywords(site_id);
CREATE INDEX IF NOT EXISTS idx_submissions_form ON lead_submissions(form_id);
"#;
