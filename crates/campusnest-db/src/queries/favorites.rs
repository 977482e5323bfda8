use anyhow::Result;
use rusqlite::OptionalExtension;

use crate::models::PropertyRow;
use crate::queries::properties::property_from_row;
use crate::{Database, now_timestamp};

impl Database {
    /// Returns false if the pair already existed.
    pub fn add_favorite(&self, user_id: &str, property_id: &str) -> Result<bool> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO favorites (user_id, property_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, property_id, created_at],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn remove_favorite(&self, user_id: &str, property_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND property_id = ?2",
                rusqlite::params![user_id, property_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_favorite(&self, user_id: &str, property_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM favorites WHERE user_id = ?1 AND property_id = ?2",
                    rusqlite::params![user_id, property_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Active favorited listings, most recently favorited first.
    pub fn favorite_properties(&self, user_id: &str) -> Result<Vec<PropertyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.landlord_id, p.title, p.description, p.kind, p.monthly_price,
                        p.deposit, p.address, p.latitude, p.longitude, p.neighborhood,
                        p.postal_code, p.city, p.state, p.available, p.active, p.wifi,
                        p.water_included, p.electricity_included, p.gas_included, p.furnished,
                        p.kitchen, p.washer, p.parking, p.pets_allowed, p.private_bathroom,
                        p.beds, p.bathrooms, p.square_meters, p.created_at, p.updated_at
                 FROM favorites f
                 JOIN properties p ON p.id = f.property_id
                 WHERE f.user_id = ?1 AND p.active = 1
                 ORDER BY f.created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], property_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Users who saved a listing; used to fan out update notifications.
    pub fn favoriters_of(&self, property_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM favorites WHERE property_id = ?1")?;
            let rows = stmt
                .query_map([property_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}
