use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use campusnest_db::models::PropertyRow;
use campusnest_db::{PropertySearch, now_timestamp};
use campusnest_types::api::{Claims, CreatePropertyRequest, PropertyResponse, UpdatePropertyRequest};
use campusnest_types::models::{NotificationKind, PropertyKind};

use crate::error::ApiError;
use crate::notifications::Notice;
use crate::state::AppState;
use crate::users::user_kind;
use crate::{blocking, convert};

const DEFAULT_CITY: &str = "Puebla";
const DEFAULT_STATE: &str = "Puebla";
const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PropertyQuery {
    pub kind: Option<PropertyKind>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub wifi: Option<bool>,
    pub furnished: Option<bool>,
    pub pets_allowed: Option<bool>,
    pub available: Option<bool>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PropertyQuery {
    fn into_search(self) -> Result<PropertySearch, ApiError> {
        for bound in [self.price_min, self.price_max].into_iter().flatten() {
            if bound < 0.0 {
                return Err(ApiError::validation("price bounds must not be negative"));
            }
        }
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                return Err(ApiError::validation("price_min must not exceed price_max"));
            }
        }

        let near = match (self.lat, self.lng, self.radius_km) {
            (None, None, None) => None,
            (Some(lat), Some(lng), Some(radius)) => {
                validate_coordinates(Some(lat), Some(lng))?;
                if radius <= 0.0 {
                    return Err(ApiError::validation("radius_km must be positive"));
                }
                Some((lat, lng, radius))
            }
            _ => {
                return Err(ApiError::validation(
                    "lat, lng and radius_km must be given together",
                ));
            }
        };

        Ok(PropertySearch {
            kind: self.kind.map(|k| k.to_string()),
            price_min: self.price_min,
            price_max: self.price_max,
            city: self.city.filter(|c| !c.trim().is_empty()),
            neighborhood: self.neighborhood.filter(|n| !n.trim().is_empty()),
            wifi: self.wifi,
            furnished: self.furnished,
            pets_allowed: self.pets_allowed,
            available: Some(self.available.unwrap_or(true)),
            near,
            limit: self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT),
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn validate_coordinates(lat: Option<f64>, lng: Option<f64>) -> Result<(), ApiError> {
    if lat.is_some_and(|l| !(-90.0..=90.0).contains(&l)) {
        return Err(ApiError::validation("latitude must be within [-90, 90]"));
    }
    if lng.is_some_and(|l| !(-180.0..=180.0).contains(&l)) {
        return Err(ApiError::validation("longitude must be within [-180, 180]"));
    }
    Ok(())
}

fn validate_listing(p: &PropertyRow) -> Result<(), ApiError> {
    if p.title.trim().is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }
    if p.address.trim().is_empty() {
        return Err(ApiError::validation("address must not be empty"));
    }
    if p.monthly_price.is_nan() || p.monthly_price <= 0.0 {
        return Err(ApiError::validation("monthly_price must be positive"));
    }
    if p.deposit.is_some_and(|d| d < 0.0) {
        return Err(ApiError::validation("deposit must not be negative"));
    }
    validate_coordinates(p.latitude, p.longitude)
}

/// Load a listing and check that `user_id` owns it.
fn owned_property(db: &campusnest_db::Database, id: &str, user_id: &str) -> Result<PropertyRow, ApiError> {
    let row = db
        .get_property(id)?
        .ok_or_else(|| ApiError::not_found("property not found"))?;
    if row.landlord_id != user_id {
        return Err(ApiError::forbidden("only the owner may modify this property"));
    }
    Ok(row)
}

pub async fn create_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_timestamp();
    let row = PropertyRow {
        id: Uuid::new_v4().to_string(),
        landlord_id: claims.sub.to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        kind: req.kind.to_string(),
        monthly_price: req.monthly_price,
        deposit: req.deposit,
        address: req.address,
        latitude: req.latitude,
        longitude: req.longitude,
        neighborhood: req.neighborhood,
        postal_code: req.postal_code,
        city: req.city.unwrap_or_else(|| DEFAULT_CITY.into()),
        state: req.state.unwrap_or_else(|| DEFAULT_STATE.into()),
        available: req.available.unwrap_or(true),
        active: true,
        amenities: req.amenities,
        created_at: now.clone(),
        updated_at: now,
    };
    validate_listing(&row)?;

    let row = blocking(&state.db, move |db| {
        if !user_kind(db, &row.landlord_id)?.can_list_properties() {
            return Err(ApiError::forbidden("only landlords can publish properties"));
        }
        db.insert_property(&row)?;
        Ok(row)
    })
    .await?;

    info!("{} published property {}", claims.sub, row.id);
    Ok((StatusCode::CREATED, Json(convert::property(row, None)?)))
}

pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let search = query.into_search()?;
    let hits = blocking(&state.db, move |db| Ok(db.search_properties(&search)?)).await?;

    let properties = hits
        .into_iter()
        .map(|hit| convert::property(hit.property, hit.distance_km))
        .collect::<anyhow::Result<Vec<PropertyResponse>>>()?;

    Ok(Json(properties))
}

pub async fn my_properties(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state.db, move |db| Ok(db.properties_by_landlord(&uid)?)).await?;

    let properties = rows
        .into_iter()
        .map(|row| convert::property(row, None))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(properties))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = id.to_string();
    let row = blocking(&state.db, move |db| Ok(db.get_property(&pid)?))
        .await?
        .ok_or_else(|| ApiError::not_found("property not found"))?;

    Ok(Json(convert::property(row, None)?))
}

/// Partial update by the owner. Users who saved the listing are notified.
pub async fn update_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = id.to_string();
    let uid = claims.sub.to_string();

    let (row, favoriters) = blocking(&state.db, move |db| {
        let mut row = owned_property(db, &pid, &uid)?;
        apply_update(&mut row, req);
        validate_listing(&row)?;

        if !db.update_property(&row)? {
            return Err(ApiError::not_found("property not found"));
        }
        Ok((row, db.favoriters_of(&pid)?))
    })
    .await?;

    let recipients: Vec<Uuid> = favoriters
        .iter()
        .filter(|u| **u != row.landlord_id)
        .filter_map(|u| match u.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Corrupt favorite user id '{}' on property {}", u, row.id);
                None
            }
        })
        .collect();

    if !recipients.is_empty() {
        state.notifier.notify_all(
            recipients,
            Notice {
                kind: NotificationKind::FavoriteUpdated,
                title: "A saved property was updated".into(),
                body: format!("\"{}\" has new details", row.title),
                related_id: Some(row.id.clone()),
                action_url: Some(format!("/properties/{}", row.id)),
            },
        );
    }

    Ok(Json(convert::property(row, None)?))
}

fn apply_update(row: &mut PropertyRow, req: UpdatePropertyRequest) {
    if let Some(title) = req.title {
        row.title = title.trim().to_string();
    }
    if let Some(kind) = req.kind {
        row.kind = kind.to_string();
    }
    if let Some(price) = req.monthly_price {
        row.monthly_price = price;
    }
    if let Some(address) = req.address {
        row.address = address;
    }
    if let Some(city) = req.city {
        row.city = city;
    }
    if let Some(state) = req.state {
        row.state = state;
    }
    if let Some(available) = req.available {
        row.available = available;
    }
    if let Some(amenities) = req.amenities {
        row.amenities = amenities;
    }
    row.description = req.description.or(row.description.take());
    row.deposit = req.deposit.or(row.deposit);
    row.latitude = req.latitude.or(row.latitude);
    row.longitude = req.longitude.or(row.longitude);
    row.neighborhood = req.neighborhood.or(row.neighborhood.take());
    row.postal_code = req.postal_code.or(row.postal_code.take());
    row.updated_at = now_timestamp();
}

/// Soft delete: the listing disappears from every read path.
pub async fn delete_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = id.to_string();
    let uid = claims.sub.to_string();

    blocking(&state.db, move |db| {
        owned_property(db, &pid, &uid)?;
        db.soft_delete_property(&pid)?;
        Ok(())
    })
    .await?;

    info!("{} removed property {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use campusnest_types::api::Amenities;
    use campusnest_gateway::ConnectionHandle;
    use campusnest_types::events::LiveEvent;
    use std::time::{Duration, Instant};

    fn claims(sub: Uuid) -> Claims {
        Claims {
            sub,
            name: "test".into(),
            exp: usize::MAX,
        }
    }

    fn create_req(title: &str, price: f64) -> CreatePropertyRequest {
        CreatePropertyRequest {
            title: title.into(),
            description: None,
            kind: PropertyKind::Room,
            monthly_price: price,
            deposit: None,
            address: "Calle 14 Sur 2104".into(),
            latitude: Some(19.0414),
            longitude: Some(-98.2063),
            neighborhood: Some("Centro".into()),
            postal_code: None,
            city: None,
            state: None,
            available: None,
            amenities: Amenities::default(),
        }
    }

    async fn publish(state: &AppState, owner: Uuid, title: &str, price: f64) -> Uuid {
        create_property(State(state.clone()), Extension(claims(owner)), Json(create_req(title, price)))
            .await
            .unwrap();
        let rows = state.db.properties_by_landlord(&owner.to_string()).unwrap();
        rows.iter()
            .find(|p| p.title == title)
            .map(|p| p.id.parse().unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn students_cannot_publish() {
        let state = test_support::state();
        let student = test_support::user(&state, "Ana", "student");

        let res = create_property(State(state.clone()), Extension(claims(student)), Json(create_req("cuarto", 1500.0))).await;
        assert!(matches!(res, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn invalid_listings_are_rejected() {
        let state = test_support::state();
        let owner = test_support::user(&state, "Luis", "landlord");

        let free = create_property(State(state.clone()), Extension(claims(owner)), Json(create_req("cuarto", 0.0))).await;
        assert!(matches!(free, Err(ApiError::Validation(_))));

        let mut off_map = create_req("cuarto", 1500.0);
        off_map.latitude = Some(91.0);
        let res = create_property(State(state.clone()), Extension(claims(owner)), Json(off_map)).await;
        assert!(matches!(res, Err(ApiError::Validation(_))));
    }

    #[test]
    fn query_validation() {
        let inverted = PropertyQuery {
            price_min: Some(2000.0),
            price_max: Some(1000.0),
            ..Default::default()
        };
        assert!(matches!(inverted.into_search(), Err(ApiError::Validation(_))));

        let negative = PropertyQuery {
            price_min: Some(-1.0),
            ..Default::default()
        };
        assert!(negative.into_search().is_err());

        let partial_anchor = PropertyQuery {
            lat: Some(19.0),
            lng: Some(-98.0),
            ..Default::default()
        };
        assert!(partial_anchor.into_search().is_err());

        let defaults = PropertyQuery::default().into_search().unwrap();
        assert_eq!(defaults.available, Some(true));
        assert_eq!(defaults.limit, DEFAULT_SEARCH_LIMIT);

        let huge = PropertyQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(huge.into_search().unwrap().limit, MAX_SEARCH_LIMIT);
    }

    #[tokio::test]
    async fn only_owner_updates_and_favoriters_hear_about_it() {
        let state = test_support::state();
        let owner = test_support::user(&state, "Luis", "landlord");
        let intruder = test_support::user(&state, "Marta", "both");
        let fan = test_support::user(&state, "Ana", "student");
        let pid = publish(&state, owner, "cuarto", 1500.0).await;

        state.db.add_favorite(&fan.to_string(), &pid.to_string()).unwrap();
        let (_registration, mut events) = state.registry.connect(fan);

        let res = update_property(
            State(state.clone()),
            Extension(claims(intruder)),
            Path(pid),
            Json(UpdatePropertyRequest::default()),
        )
        .await;
        assert!(matches!(res, Err(ApiError::Forbidden(_))));

        update_property(
            State(state.clone()),
            Extension(claims(owner)),
            Path(pid),
            Json(UpdatePropertyRequest {
                monthly_price: Some(1400.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        let stored = state.db.get_property(&pid.to_string()).unwrap().unwrap();
        assert_eq!(stored.monthly_price, 1400.0);
        assert_eq!(stored.title, "cuarto");
        assert_eq!(stored.neighborhood.as_deref(), Some("Centro"));

        match events.recv().await {
            Some(LiveEvent::Notification { kind, related_id, .. }) => {
                assert_eq!(kind, NotificationKind::FavoriteUpdated);
                assert_eq!(related_id, Some(pid.to_string()));
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stalled_favoriter_does_not_delay_update() {
        let state = test_support::state();
        let owner = test_support::user(&state, "Luis", "landlord");
        let stalled = test_support::user(&state, "Beto", "student");
        let fan = test_support::user(&state, "Ana", "student");
        let pid = publish(&state, owner, "cuarto", 1500.0).await;
        for user in [stalled, fan] {
            state.db.add_favorite(&user.to_string(), &pid.to_string()).unwrap();
        }

        // A one-slot queue that is already full and never drained
        let (handle, _unread) = ConnectionHandle::new(1);
        state.registry.register(stalled, handle);
        state
            .registry
            .dispatch(stalled, LiveEvent::Ready { user_id: stalled })
            .await;
        let (_registration, mut events) = state.registry.connect(fan);

        let started = Instant::now();
        update_property(
            State(state.clone()),
            Extension(claims(owner)),
            Path(pid),
            Json(UpdatePropertyRequest {
                available: Some(false),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let pushed = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
        assert!(matches!(pushed, Ok(Some(LiveEvent::Notification { .. }))));
    }

    #[tokio::test]
    async fn deleted_listing_is_gone() {
        let state = test_support::state();
        let owner = test_support::user(&state, "Luis", "landlord");
        let pid = publish(&state, owner, "cuarto", 1500.0).await;

        delete_property(State(state.clone()), Extension(claims(owner)), Path(pid))
            .await
            .unwrap();

        let res = get_property(State(state.clone()), Path(pid)).await;
        assert!(matches!(res, Err(ApiError::NotFound(_))));

        let again = delete_property(State(state.clone()), Extension(claims(owner)), Path(pid)).await;
        assert!(matches!(again, Err(ApiError::NotFound(_))));
    }
}
