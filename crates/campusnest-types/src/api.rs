use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    NotificationKind, ProblemKind, PropertyKind, RentalStatus, ReportStatus, Severity, UserKind,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub kind: UserKind,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserProfile,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub kind: UserKind,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub body: String,
    pub property_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub property_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub counterpart_id: Uuid,
    pub name: String,
    pub photo_url: Option<String>,
    pub last_message: String,
    pub last_timestamp: DateTime<Utc>,
    pub unread_count: u64,
}

// -- Properties --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amenities {
    pub wifi: bool,
    pub water_included: bool,
    pub electricity_included: bool,
    pub gas_included: bool,
    pub furnished: bool,
    pub kitchen: bool,
    pub washer: bool,
    pub parking: bool,
    pub pets_allowed: bool,
    pub private_bathroom: bool,
    #[serde(default = "one")]
    pub beds: u32,
    #[serde(default = "one")]
    pub bathrooms: u32,
    pub square_meters: Option<f64>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePropertyRequest {
    pub title: String,
    pub description: Option<String>,
    pub kind: PropertyKind,
    pub monthly_price: f64,
    pub deposit: Option<f64>,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub available: Option<bool>,
    #[serde(default)]
    pub amenities: Amenities,
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<PropertyKind>,
    pub monthly_price: Option<f64>,
    pub deposit: Option<f64>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub available: Option<bool>,
    pub amenities: Option<Amenities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyResponse {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub kind: PropertyKind,
    pub monthly_price: f64,
    pub deposit: Option<f64>,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub city: String,
    pub state: String,
    pub available: bool,
    pub amenities: Amenities,
    /// Present only when the search was anchored on a coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Favorites --

#[derive(Debug, Serialize)]
pub struct FavoriteStatus {
    pub is_favorite: bool,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub related_id: Option<String>,
    pub action_url: Option<String>,
}

/// Per-category delivery preferences. Absent fields default to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationSettings {
    #[serde(default = "enabled")]
    pub email_rentals: bool,
    #[serde(default = "enabled")]
    pub email_ratings: bool,
    #[serde(default = "enabled")]
    pub push_rentals: bool,
    #[serde(default = "enabled")]
    pub push_ratings: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_rentals: true,
            email_ratings: true,
            push_rentals: true,
            push_ratings: true,
        }
    }
}

fn enabled() -> bool {
    true
}

// -- Rentals --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRentalRequest {
    pub property_id: Uuid,
    pub student_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub agreed_price: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRentalRequest {
    pub end_date: Option<NaiveDate>,
    pub status: Option<RentalStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalResponse {
    pub id: i64,
    pub property_id: Uuid,
    pub student_id: Uuid,
    pub landlord_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub agreed_price: f64,
    pub status: RentalStatus,
    pub created_at: DateTime<Utc>,
}

// -- Ratings --

/// A student's rating of the property from a finished rental. Scores are 1 to 5.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatePropertyRequest {
    pub rental_id: i64,
    pub overall: u8,
    pub cleanliness: u8,
    pub location: u8,
    pub value_for_money: u8,
    pub communication: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRatingResponse {
    pub id: i64,
    pub rental_id: i64,
    pub property_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub overall: u8,
    pub cleanliness: u8,
    pub location: u8,
    pub value_for_money: u8,
    pub communication: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A landlord's rating of the tenant from a finished rental.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateTenantRequest {
    pub rental_id: i64,
    pub overall: u8,
    pub payment_punctuality: u8,
    pub property_care: u8,
    pub coexistence: u8,
    pub communication: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRatingResponse {
    pub id: i64,
    pub rental_id: i64,
    pub student_id: Uuid,
    pub landlord_id: Uuid,
    pub landlord_name: String,
    pub overall: u8,
    pub payment_punctuality: u8,
    pub property_care: u8,
    pub coexistence: u8,
    pub communication: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Averages are rounded to one decimal; all zero when there are no ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRatingStats {
    pub property_id: Uuid,
    pub total: u64,
    pub overall: f64,
    pub cleanliness: f64,
    pub location: f64,
    pub value_for_money: f64,
    pub communication: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRatingStats {
    pub student_id: Uuid,
    pub total: u64,
    pub overall: f64,
    pub payment_punctuality: f64,
    pub property_care: f64,
    pub coexistence: f64,
    pub communication: f64,
}

// -- Tenant reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReportRequest {
    pub student_id: Uuid,
    pub rental_id: Option<i64>,
    pub problem: ProblemKind,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    pub incident_date: Option<NaiveDate>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

/// Moderation update; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateReportRequest {
    pub status: Option<ReportStatus>,
    pub admin_verified: Option<bool>,
    pub visible_to_landlords: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub id: i64,
    pub landlord_id: Uuid,
    pub student_id: Uuid,
    pub rental_id: Option<i64>,
    pub problem: ProblemKind,
    pub description: String,
    pub severity: Severity,
    pub incident_date: Option<NaiveDate>,
    pub evidence_urls: Vec<String>,
    pub status: ReportStatus,
    pub admin_verified: bool,
    pub visible_to_landlords: bool,
    pub created_at: DateTime<Utc>,
}

/// A report as shown to other landlords, with the names of both parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: ReportResponse,
    pub student_name: String,
    pub student_email: String,
    pub landlord_name: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}
