use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use campusnest_db::models::NewRental;
use campusnest_types::api::{Claims, CreateRentalRequest, UpdateRentalRequest};
use campusnest_types::models::{NotificationKind, RentalStatus};

use crate::error::ApiError;
use crate::notifications::Notice;
use crate::state::AppState;
use crate::users::user_kind;
use crate::{blocking, convert};

#[derive(Debug, Default, Deserialize)]
pub struct RentalQuery {
    pub status: Option<RentalStatus>,
}

/// A landlord records a rental of one of their active listings.
pub async fn create_rental(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRentalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.agreed_price.is_finite() || req.agreed_price <= 0.0 {
        return Err(ApiError::validation("agreed_price must be positive"));
    }
    if req.end_date.is_some_and(|end| end < req.start_date) {
        return Err(ApiError::validation("end_date must not precede start_date"));
    }
    if req.student_id == claims.sub {
        return Err(ApiError::validation("cannot rent a property to yourself"));
    }

    let uid = claims.sub.to_string();
    let (row, title) = blocking(&state.db, move |db| {
        if !user_kind(db, &uid)?.can_list_properties() {
            return Err(ApiError::forbidden("only landlords can record rentals"));
        }
        let pid = req.property_id.to_string();
        let property = db
            .get_property(&pid)?
            .filter(|p| p.active && p.landlord_id == uid)
            .ok_or_else(|| ApiError::not_found("property not found"))?;

        let sid = req.student_id.to_string();
        if !user_kind(db, &sid)?.can_rent() {
            return Err(ApiError::validation("the tenant must be a student account"));
        }

        let start = req.start_date.to_string();
        let end = req.end_date.map(|d| d.to_string());
        let row = db.insert_rental(&NewRental {
            property_id: &pid,
            student_id: &sid,
            landlord_id: &uid,
            start_date: &start,
            end_date: end.as_deref(),
            agreed_price: req.agreed_price,
        })?;
        Ok((row, property.title))
    })
    .await?;

    let rental = convert::rental(row)?;
    info!("{} recorded rental {} for {}", claims.sub, rental.id, rental.student_id);

    state.notifier.notify_all(
        vec![rental.student_id],
        Notice {
            kind: NotificationKind::RentalApproved,
            title: "Rental confirmed".into(),
            body: format!("Your rental of \"{}\" starts on {}", title, rental.start_date),
            related_id: Some(rental.id.to_string()),
            action_url: Some(format!("/rentals/{}", rental.id)),
        },
    );

    Ok((StatusCode::CREATED, Json(rental)))
}

/// Rentals where the caller is the landlord or the tenant.
pub async fn my_rentals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RentalQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state.db, move |db| {
        Ok(db.rentals_for_user(&uid, query.status.as_ref().map(RentalStatus::as_str))?)
    })
    .await?;

    let rentals = rows
        .into_iter()
        .map(convert::rental)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(rentals))
}

pub async fn update_rental(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(rental_id): Path<i64>,
    Json(req): Json<UpdateRentalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| {
        let current = db
            .get_rental(rental_id)?
            .ok_or_else(|| ApiError::not_found("rental not found"))?;
        if current.landlord_id != uid {
            return Err(ApiError::forbidden("only the landlord may modify this rental"));
        }

        let status: RentalStatus = current.status.parse().map_err(anyhow::Error::from)?;
        if let Some(next) = req.status {
            if status != RentalStatus::Active && next != status {
                return Err(ApiError::validation(format!("rental is already {}", status)));
            }
        }
        if let Some(end) = req.end_date {
            if end < convert::date(&current.start_date)? {
                return Err(ApiError::validation("end_date must not precede start_date"));
            }
        }

        let end = req.end_date.map(|d| d.to_string());
        db.update_rental(rental_id, end.as_deref(), req.status.as_ref().map(RentalStatus::as_str))?
            .ok_or_else(|| ApiError::not_found("rental not found"))
    })
    .await?;

    Ok(Json(convert::rental(row)?))
}
