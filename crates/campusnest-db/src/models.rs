//! Database row types. These map directly to SQLite rows and stay distinct
//! from the campusnest-types API models to keep the DB layer independent.

use campusnest_types::api::Amenities;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub kind: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub verified: bool,
    pub active: bool,
    pub created_at: String,
}

pub struct NewUser {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub kind: String,
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub read: bool,
    pub property_id: Option<String>,
    pub created_at: String,
}

/// A message joined with the user on the other side of it.
pub struct ConversationMessageRow {
    pub message: MessageRow,
    pub counterpart_id: String,
    pub counterpart_name: String,
    pub counterpart_photo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PropertyRow {
    pub id: String,
    pub landlord_id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: String,
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
    pub active: bool,
    pub amenities: Amenities,
    pub created_at: String,
    pub updated_at: String,
}

/// A search result; `distance_km` is set when the search had an anchor point.
pub struct PropertyHit {
    pub property: PropertyRow,
    pub distance_km: Option<f64>,
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub related_id: Option<String>,
    pub action_url: Option<String>,
    pub created_at: String,
}

pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub related_id: Option<&'a str>,
    pub action_url: Option<&'a str>,
}

pub struct NotificationSettingsRow {
    pub email_rentals: bool,
    pub email_ratings: bool,
    pub push_rentals: bool,
    pub push_ratings: bool,
}

impl Default for NotificationSettingsRow {
    fn default() -> Self {
        Self {
            email_rentals: true,
            email_ratings: true,
            push_rentals: true,
            push_ratings: true,
        }
    }
}

/// Dates are `YYYY-MM-DD`; `status` is a `RentalStatus` tag.
#[derive(Debug, Clone)]
pub struct RentalRow {
    pub id: i64,
    pub property_id: String,
    pub student_id: String,
    pub landlord_id: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub agreed_price: f64,
    pub status: String,
    pub created_at: String,
}

pub struct NewRental<'a> {
    pub property_id: &'a str,
    pub student_id: &'a str,
    pub landlord_id: &'a str,
    pub start_date: &'a str,
    pub end_date: Option<&'a str>,
    pub agreed_price: f64,
}

/// The five scores of a rating, in column order.
pub type Scores = [u8; 5];

/// A property rating joined with the student who left it.
pub struct PropertyRatingRow {
    pub id: i64,
    pub rental_id: i64,
    pub student_id: String,
    pub property_id: String,
    pub scores: Scores,
    pub comment: Option<String>,
    pub created_at: String,
    pub student_name: String,
}

/// A tenant rating joined with the landlord who left it.
pub struct TenantRatingRow {
    pub id: i64,
    pub rental_id: i64,
    pub landlord_id: String,
    pub student_id: String,
    pub scores: Scores,
    pub comment: Option<String>,
    pub created_at: String,
    pub landlord_name: String,
}

/// Count of visible ratings and the per-score averages, rounded to one decimal.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingStats {
    pub total: u64,
    pub averages: [f64; 5],
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: i64,
    pub landlord_id: String,
    pub student_id: String,
    pub rental_id: Option<i64>,
    pub problem: String,
    pub description: String,
    pub evidence_urls: Vec<String>,
    pub severity: String,
    pub incident_date: Option<String>,
    pub status: String,
    pub admin_verified: bool,
    pub visible_to_landlords: bool,
    pub created_at: String,
}

pub struct NewReport<'a> {
    pub landlord_id: &'a str,
    pub student_id: &'a str,
    pub rental_id: Option<i64>,
    pub problem: &'a str,
    pub description: &'a str,
    pub evidence_urls: &'a [String],
    pub severity: &'a str,
    pub incident_date: Option<&'a str>,
}

/// A report with the display names of both parties.
pub struct ReportDetailRow {
    pub report: ReportRow,
    pub student_name: String,
    pub student_email: String,
    pub landlord_name: String,
}

/// A rating about to be stored. For a property rating the author is the
/// student and the subject the property; for a tenant rating the author is
/// the landlord and the subject the student.
pub struct NewRating<'a> {
    pub rental_id: i64,
    pub author_id: &'a str,
    pub subject_id: &'a str,
    pub scores: Scores,
    pub comment: Option<&'a str>,
}
