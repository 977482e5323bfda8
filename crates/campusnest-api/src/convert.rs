//! Row -> wire conversions. Stored ids, tags and timestamps are parsed back
//! into their typed form; a value that does not parse is a storage fault.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use campusnest_db::models::{
    MessageRow, NotificationRow, NotificationSettingsRow, PropertyRatingRow, PropertyRow, RatingStats, RentalRow,
    ReportDetailRow, ReportRow, TenantRatingRow, UserRow,
};
use campusnest_types::api::{
    MessageResponse, NotificationResponse, NotificationSettings, PropertyRatingResponse, PropertyRatingStats,
    PropertyResponse, RentalResponse, ReportDetail, ReportResponse, TenantRatingResponse,
    TenantRatingStats, UserProfile,
};

pub(crate) fn uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("corrupt id '{}'", raw))
}

pub(crate) fn timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw).with_context(|| format!("corrupt timestamp '{}'", raw))?;
    Ok(ts.with_timezone(&Utc))
}

pub(crate) fn date(raw: &str) -> Result<NaiveDate> {
    raw.parse().with_context(|| format!("corrupt date '{}'", raw))
}

pub(crate) fn user_profile(row: UserRow) -> Result<UserProfile> {
    Ok(UserProfile {
        id: uuid(&row.id)?,
        kind: row.kind.parse()?,
        created_at: timestamp(&row.created_at)?,
        email: row.email,
        full_name: row.full_name,
        phone: row.phone,
        photo_url: row.photo_url,
        verified: row.verified,
    })
}

pub(crate) fn message(row: MessageRow) -> Result<MessageResponse> {
    Ok(MessageResponse {
        id: row.id,
        sender_id: uuid(&row.sender_id)?,
        recipient_id: uuid(&row.recipient_id)?,
        created_at: timestamp(&row.created_at)?,
        property_id: row.property_id.as_deref().map(uuid).transpose()?,
        body: row.body,
        read: row.read,
    })
}

pub(crate) fn property(row: PropertyRow, distance_km: Option<f64>) -> Result<PropertyResponse> {
    Ok(PropertyResponse {
        id: uuid(&row.id)?,
        landlord_id: uuid(&row.landlord_id)?,
        kind: row.kind.parse()?,
        created_at: timestamp(&row.created_at)?,
        updated_at: timestamp(&row.updated_at)?,
        title: row.title,
        description: row.description,
        monthly_price: row.monthly_price,
        deposit: row.deposit,
        address: row.address,
        latitude: row.latitude,
        longitude: row.longitude,
        neighborhood: row.neighborhood,
        postal_code: row.postal_code,
        city: row.city,
        state: row.state,
        available: row.available,
        amenities: row.amenities,
        distance_km,
    })
}

pub(crate) fn notification(row: NotificationRow) -> Result<NotificationResponse> {
    Ok(NotificationResponse {
        id: row.id,
        kind: row.kind.parse()?,
        created_at: timestamp(&row.created_at)?,
        title: row.title,
        body: row.body,
        read: row.read,
        related_id: row.related_id,
        action_url: row.action_url,
    })
}

pub(crate) fn settings(row: NotificationSettingsRow) -> NotificationSettings {
    NotificationSettings {
        email_rentals: row.email_rentals,
        email_ratings: row.email_ratings,
        push_rentals: row.push_rentals,
        push_ratings: row.push_ratings,
    }
}

pub(crate) fn rental(row: RentalRow) -> Result<RentalResponse> {
    Ok(RentalResponse {
        id: row.id,
        property_id: uuid(&row.property_id)?,
        student_id: uuid(&row.student_id)?,
        landlord_id: uuid(&row.landlord_id)?,
        start_date: date(&row.start_date)?,
        end_date: row.end_date.as_deref().map(date).transpose()?,
        agreed_price: row.agreed_price,
        status: row.status.parse()?,
        created_at: timestamp(&row.created_at)?,
    })
}

pub(crate) fn property_rating(row: PropertyRatingRow) -> Result<PropertyRatingResponse> {
    let [overall, cleanliness, location, value_for_money, communication] = row.scores;
    Ok(PropertyRatingResponse {
        id: row.id,
        rental_id: row.rental_id,
        property_id: uuid(&row.property_id)?,
        student_id: uuid(&row.student_id)?,
        created_at: timestamp(&row.created_at)?,
        student_name: row.student_name,
        overall,
        cleanliness,
        location,
        value_for_money,
        communication,
        comment: row.comment,
    })
}

pub(crate) fn tenant_rating(row: TenantRatingRow) -> Result<TenantRatingResponse> {
    let [overall, payment_punctuality, property_care, coexistence, communication] = row.scores;
    Ok(TenantRatingResponse {
        id: row.id,
        rental_id: row.rental_id,
        student_id: uuid(&row.student_id)?,
        landlord_id: uuid(&row.landlord_id)?,
        created_at: timestamp(&row.created_at)?,
        landlord_name: row.landlord_name,
        overall,
        payment_punctuality,
        property_care,
        coexistence,
        communication,
        comment: row.comment,
    })
}

pub(crate) fn property_rating_stats(property_id: Uuid, stats: RatingStats) -> PropertyRatingStats {
    let [overall, cleanliness, location, value_for_money, communication] = stats.averages;
    PropertyRatingStats {
        property_id,
        total: stats.total,
        overall,
        cleanliness,
        location,
        value_for_money,
        communication,
    }
}

pub(crate) fn tenant_rating_stats(student_id: Uuid, stats: RatingStats) -> TenantRatingStats {
    let [overall, payment_punctuality, property_care, coexistence, communication] = stats.averages;
    TenantRatingStats {
        student_id,
        total: stats.total,
        overall,
        payment_punctuality,
        property_care,
        coexistence,
        communication,
    }
}

pub(crate) fn report(row: ReportRow) -> Result<ReportResponse> {
    Ok(ReportResponse {
        id: row.id,
        landlord_id: uuid(&row.landlord_id)?,
        student_id: uuid(&row.student_id)?,
        rental_id: row.rental_id,
        problem: row.problem.parse()?,
        severity: row.severity.parse()?,
        status: row.status.parse()?,
        incident_date: row.incident_date.as_deref().map(date).transpose()?,
        created_at: timestamp(&row.created_at)?,
        description: row.description,
        evidence_urls: row.evidence_urls,
        admin_verified: row.admin_verified,
        visible_to_landlords: row.visible_to_landlords,
    })
}

pub(crate) fn report_detail(row: ReportDetailRow) -> Result<ReportDetail> {
    Ok(ReportDetail {
        report: report(row.report)?,
        student_name: row.student_name,
        student_email: row.student_email,
        landlord_name: row.landlord_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_timestamps_round_trip() {
        let now = Utc::now();
        let stored = campusnest_db::format_timestamp(now);
        let parsed = timestamp(&stored).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn corrupt_values_are_errors() {
        assert!(uuid("not-a-uuid").is_err());
        assert!(timestamp("yesterday").is_err());
        assert!(date("2025-02-30").is_err());
        assert_eq!(date("2025-02-28").unwrap(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }
}
