use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use campusnest_db::Database;
use campusnest_db::models::NewReport;
use campusnest_types::api::{Claims, CreateReportRequest, UpdateReportRequest};
use campusnest_types::models::{NotificationKind, ReportStatus};

use crate::error::ApiError;
use crate::notifications::Notice;
use crate::state::AppState;
use crate::users::user_kind;
use crate::{blocking, convert};

const MIN_DESCRIPTION_CHARS: usize = 50;
const MAX_DESCRIPTION_CHARS: usize = 2000;
const MAX_EVIDENCE: usize = 10;

fn require_landlord(db: &Database, user_id: &str) -> Result<(), ApiError> {
    if !user_kind(db, user_id)?.can_list_properties() {
        return Err(ApiError::forbidden("only landlords can use tenant reports"));
    }
    Ok(())
}

fn validate(req: &CreateReportRequest) -> Result<(), ApiError> {
    let len = req.description.trim().chars().count();
    if !(MIN_DESCRIPTION_CHARS..=MAX_DESCRIPTION_CHARS).contains(&len) {
        return Err(ApiError::validation(format!(
            "description must be {} to {} characters",
            MIN_DESCRIPTION_CHARS, MAX_DESCRIPTION_CHARS
        )));
    }
    if req.evidence_urls.len() > MAX_EVIDENCE {
        return Err(ApiError::validation("at most 10 evidence urls"));
    }
    if req.evidence_urls.iter().any(|u| u.trim().is_empty()) {
        return Err(ApiError::validation("evidence urls must not be empty"));
    }
    Ok(())
}

/// A landlord files a report about a student. It stays private until verified
/// and released to other landlords.
pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&req)?;
    if req.student_id == claims.sub {
        return Err(ApiError::validation("cannot report yourself"));
    }

    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| {
        require_landlord(db, &uid)?;

        let sid = req.student_id.to_string();
        if db.get_user_by_id(&sid)?.is_none() {
            return Err(ApiError::not_found("user not found"));
        }
        if let Some(rental_id) = req.rental_id {
            let rental = db
                .get_rental(rental_id)?
                .filter(|r| r.landlord_id == uid)
                .ok_or_else(|| ApiError::not_found("rental not found"))?;
            if rental.student_id != sid {
                return Err(ApiError::validation("rental belongs to another tenant"));
            }
        }

        let incident = req.incident_date.map(|d| d.to_string());
        Ok(db.insert_report(&NewReport {
            landlord_id: &uid,
            student_id: &sid,
            rental_id: req.rental_id,
            problem: req.problem.as_str(),
            description: req.description.trim(),
            evidence_urls: &req.evidence_urls,
            severity: req.severity.as_str(),
            incident_date: incident.as_deref(),
        })?)
    })
    .await?;

    let report = convert::report(row)?;
    info!("{} filed report {} about {}", claims.sub, report.id, report.student_id);

    state.notifier.notify_all(
        vec![report.student_id],
        Notice {
            kind: NotificationKind::NewReport,
            title: "A landlord filed a report".into(),
            body: format!("A report about {} is pending review", report.problem),
            related_id: Some(report.id.to_string()),
            action_url: None,
        },
    );

    Ok((StatusCode::CREATED, Json(report)))
}

/// Reports the caller has filed, whatever their status.
pub async fn my_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state.db, move |db| Ok(db.reports_by_landlord(&uid)?)).await?;

    let reports = rows
        .into_iter()
        .map(convert::report)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(reports))
}

/// Verified, released reports about one student.
pub async fn student_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state.db, move |db| {
        require_landlord(db, &uid)?;
        Ok(db.published_reports_about(&student_id.to_string())?)
    })
    .await?;

    let reports = rows
        .into_iter()
        .map(convert::report_detail)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(reports))
}

pub async fn update_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<i64>,
    Json(req): Json<UpdateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| {
        let current = db
            .get_report(report_id)?
            .ok_or_else(|| ApiError::not_found("report not found"))?;
        if current.landlord_id != uid {
            return Err(ApiError::forbidden("only the author may modify this report"));
        }
        db.update_report(
            report_id,
            req.status.as_ref().map(ReportStatus::as_str),
            req.admin_verified,
            req.visible_to_landlords,
        )?
        .ok_or_else(|| ApiError::not_found("report not found"))
    })
    .await?;

    Ok(Json(convert::report(row)?))
}
