use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::warn;

use crate::error::ScopeError;
use crate::handlers::reports::{ReportKind, ReportParams, ReportQuery, cached_report};
use crate::middleware::auth::{CurrentUser, require_owned_site};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Comma-separated report kinds; defaults to the standard export set.
    pub kinds: Option<String>,
    pub days: Option<i64>,
}

/// GET /api/sites/{id}/export: the payload the headless exporter renders.
///
/// Assembly is bounded by the export budget so a stuck upstream can never
/// hold the capture open past the readiness window; `ready: true` is the
/// flag the exporter waits for.
pub async fn export_report_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;

    let kinds: Vec<ReportKind> = match query.kinds.as_deref() {
        Some(raw) => raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse())
            .collect::<Result<_, _>>()?,
        None => vec![ReportKind::Analytics, ReportKind::SearchConsole],
    };

    let report_query = ReportQuery {
        days: query.days,
        dimension: None,
        limit: None,
        strategy: None,
    };

    let budget = Duration::from_secs(state.config.export_budget_secs);
    let assemble = async {
        let mut reports = Map::new();
        for kind in &kinds {
            let params = ReportParams::resolve(*kind, &report_query);
            // A section that cannot load becomes an error stub rather than
            // sinking the whole export.
            let section = match cached_report(&state, &site, *kind, &params).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(site = %site.id, kind = kind.as_str(), error = %e, "export section failed");
                    json!({"error": e.to_string()})
                }
            };
            reports.insert(kind.as_str().to_string(), section);
        }
        reports
    };

    let reports = tokio::time::timeout(budget, assemble)
        .await
        .map_err(|_| ScopeError::ExportTimeout)?;

    Ok(Json(json!({
        "ready": true,
        "site": {"id": site.id, "name": site.name, "domain": site.domain},
        "generatedAt": state.clock.now(),
        "reports": reports,
    })))
}
