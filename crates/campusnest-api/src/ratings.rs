use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use campusnest_db::Database;
use campusnest_db::models::{NewRating, RentalRow, Scores};
use campusnest_types::api::{Claims, RatePropertyRequest, RateTenantRequest};
use campusnest_types::models::{NotificationKind, RentalStatus};

use crate::error::ApiError;
use crate::notifications::Notice;
use crate::state::AppState;
use crate::users::user_kind;
use crate::{blocking, convert};

const MAX_COMMENT_CHARS: usize = 1000;

fn validate(scores: &Scores, comment: Option<&str>) -> Result<(), ApiError> {
    if scores.iter().any(|s| !(1..=5).contains(s)) {
        return Err(ApiError::validation("scores must be between 1 and 5"));
    }
    if comment.is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS) {
        return Err(ApiError::validation("comment must be at most 1000 characters"));
    }
    Ok(())
}

/// A finished rental the caller took part in. Anything else is 404 or 400.
fn rateable_rental(
    db: &Database,
    rental_id: i64,
    is_party: impl Fn(&RentalRow) -> bool,
) -> Result<RentalRow, ApiError> {
    let rental = db
        .get_rental(rental_id)?
        .filter(|r| is_party(r))
        .ok_or_else(|| ApiError::not_found("rental not found"))?;
    if rental.status != RentalStatus::Finished.as_str() {
        return Err(ApiError::validation("only finished rentals can be rated"));
    }
    Ok(rental)
}

/// Tenant history is visible to landlords and to the student themselves.
fn can_view_tenant(db: &Database, viewer: Uuid, student_id: Uuid) -> Result<(), ApiError> {
    if viewer != student_id && !user_kind(db, &viewer.to_string())?.can_list_properties() {
        return Err(ApiError::forbidden("only landlords can view tenant ratings"));
    }
    Ok(())
}

pub async fn rate_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scores = [
        req.overall,
        req.cleanliness,
        req.location,
        req.value_for_money,
        req.communication,
    ];
    validate(&scores, req.comment.as_deref())?;

    let uid = claims.sub.to_string();
    let (row, landlord_id) = blocking(&state.db, move |db| {
        let rental = rateable_rental(db, req.rental_id, |r| r.student_id == uid)?;
        let row = db
            .insert_property_rating(&NewRating {
                rental_id: rental.id,
                author_id: &uid,
                subject_id: &rental.property_id,
                scores,
                comment: req.comment.as_deref(),
            })?
            .ok_or_else(|| ApiError::Conflict("rental already rated".into()))?;
        Ok((row, rental.landlord_id))
    })
    .await?;

    let rating = convert::property_rating(row)?;
    let landlord = convert::uuid(&landlord_id)?;
    state.notifier.notify_all(
        vec![landlord],
        Notice {
            kind: NotificationKind::NewRating,
            title: "New property rating".into(),
            body: format!("{} rated your property {}/5", rating.student_name, rating.overall),
            related_id: Some(rating.id.to_string()),
            action_url: Some(format!("/properties/{}", rating.property_id)),
        },
    );

    Ok((StatusCode::CREATED, Json(rating)))
}

pub async fn property_ratings(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = property_id.to_string();
    let rows = blocking(&state.db, move |db| Ok(db.property_ratings(&pid)?)).await?;

    let ratings = rows
        .into_iter()
        .map(convert::property_rating)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(ratings))
}

pub async fn property_stats(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = property_id.to_string();
    let stats = blocking(&state.db, move |db| Ok(db.property_rating_stats(&pid)?)).await?;
    Ok(Json(convert::property_rating_stats(property_id, stats)))
}

pub async fn rate_tenant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RateTenantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scores = [
        req.overall,
        req.payment_punctuality,
        req.property_care,
        req.coexistence,
        req.communication,
    ];
    validate(&scores, req.comment.as_deref())?;

    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| {
        if !user_kind(db, &uid)?.can_list_properties() {
            return Err(ApiError::forbidden("only landlords can rate tenants"));
        }
        let rental = rateable_rental(db, req.rental_id, |r| r.landlord_id == uid)?;
        db.insert_tenant_rating(&NewRating {
            rental_id: rental.id,
            author_id: &uid,
            subject_id: &rental.student_id,
            scores,
            comment: req.comment.as_deref(),
        })?
        .ok_or_else(|| ApiError::Conflict("rental already rated".into()))
    })
    .await?;

    let rating = convert::tenant_rating(row)?;
    state.notifier.notify_all(
        vec![rating.student_id],
        Notice {
            kind: NotificationKind::NewRating,
            title: "New tenant rating".into(),
            body: format!("{} rated you {}/5 as a tenant", rating.landlord_name, rating.overall),
            related_id: Some(rating.id.to_string()),
            action_url: Some(format!("/ratings/tenant/{}", rating.student_id)),
        },
    );

    Ok((StatusCode::CREATED, Json(rating)))
}

pub async fn tenant_ratings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = blocking(&state.db, move |db| {
        can_view_tenant(db, claims.sub, student_id)?;
        Ok(db.tenant_ratings(&student_id.to_string())?)
    })
    .await?;

    let ratings = rows
        .into_iter()
        .map(convert::tenant_rating)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(ratings))
}

pub async fn tenant_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = blocking(&state.db, move |db| {
        can_view_tenant(db, claims.sub, student_id)?;
        Ok(db.tenant_rating_stats(&student_id.to_string())?)
    })
    .await?;
    Ok(Json(convert::tenant_rating_stats(student_id, stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rentals::tests::{claims, finished_rental};
    use crate::test_support;
    use campusnest_types::api::{PropertyRatingStats, TenantRatingStats};
    use campusnest_types::events::LiveEvent;
    use std::time::Duration;

    fn property_rating(rental_id: i64, overall: u8) -> RatePropertyRequest {
        RatePropertyRequest {
            rental_id,
            overall,
            cleanliness: 4,
            location: 5,
            value_for_money: 3,
            communication: 4,
            comment: Some("Buena ubicación".into()),
        }
    }

    fn tenant_rating(rental_id: i64) -> RateTenantRequest {
        RateTenantRequest {
            rental_id,
            overall: 5,
            payment_punctuality: 5,
            property_care: 4,
            coexistence: 4,
            communication: 5,
            comment: None,
        }
    }

    async fn body<T: serde::de::DeserializeOwned>(resp: impl IntoResponse) -> T {
        let bytes = axum::body::to_bytes(resp.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn student_rates_finished_rental_once() {
        let state = test_support::state();
        let (landlord, student, rental) = finished_rental(&state).await;
        let (_registration, mut events) = state.registry.connect(landlord);

        rate_property(State(state.clone()), Extension(claims(student)), Json(property_rating(rental.id, 4)))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert!(matches!(
            event,
            Some(LiveEvent::Notification { kind: NotificationKind::NewRating, .. })
        ));

        let again = rate_property(State(state.clone()), Extension(claims(student)), Json(property_rating(rental.id, 1))).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));

        let stats: PropertyRatingStats = body(
            property_stats(State(state.clone()), Path(rental.property_id))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.overall, 4.0);
        assert_eq!(stats.value_for_money, 3.0);
    }

    #[tokio::test]
    async fn property_rating_rules() {
        let state = test_support::state();
        let (landlord, student, rental) = finished_rental(&state).await;

        let out_of_range = rate_property(State(state.clone()), Extension(claims(student)), Json(property_rating(rental.id, 0))).await;
        assert!(matches!(out_of_range, Err(ApiError::Validation(_))));

        let long = RatePropertyRequest {
            comment: Some("x".repeat(1001)),
            ..property_rating(rental.id, 5)
        };
        let res = rate_property(State(state.clone()), Extension(claims(student)), Json(long)).await;
        assert!(matches!(res, Err(ApiError::Validation(_))));

        // The landlord is not the tenant of their own rental.
        let res = rate_property(State(state.clone()), Extension(claims(landlord)), Json(property_rating(rental.id, 5))).await;
        assert!(matches!(res, Err(ApiError::NotFound(_))));

        state.db.update_rental(rental.id, None, Some("active")).unwrap();
        let res = rate_property(State(state.clone()), Extension(claims(student)), Json(property_rating(rental.id, 5))).await;
        assert!(matches!(res, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn landlord_rates_tenant_and_students_cannot_browse() {
        let state = test_support::state();
        let (landlord, student, rental) = finished_rental(&state).await;
        let classmate = test_support::user(&state, "Carla", "student");

        let by_student = rate_tenant(State(state.clone()), Extension(claims(student)), Json(tenant_rating(rental.id))).await;
        assert!(matches!(by_student, Err(ApiError::Forbidden(_))));

        rate_tenant(State(state.clone()), Extension(claims(landlord)), Json(tenant_rating(rental.id)))
            .await
            .unwrap();

        let stats: TenantRatingStats = body(
            tenant_stats(State(state.clone()), Extension(claims(landlord)), Path(student))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.property_care, 4.0);

        let own = tenant_ratings(State(state.clone()), Extension(claims(student)), Path(student)).await;
        assert!(own.is_ok());

        let nosy = tenant_ratings(State(state.clone()), Extension(claims(classmate)), Path(student)).await;
        assert!(matches!(nosy, Err(ApiError::Forbidden(_))));
    }
}
