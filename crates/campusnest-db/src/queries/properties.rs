use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

use campusnest_types::api::Amenities;

use crate::Database;
use crate::geo::haversine_km;
use crate::models::{PropertyHit, PropertyRow};

const PROPERTY_COLUMNS: &str = "id, landlord_id, title, description, kind, monthly_price, deposit, \
     address, latitude, longitude, neighborhood, postal_code, city, state, available, active, \
     wifi, water_included, electricity_included, gas_included, furnished, kitchen, washer, \
     parking, pets_allowed, private_bathroom, beds, bathrooms, square_meters, created_at, updated_at";

/// Listing search filters. Every field is optional except paging; only
/// active listings are ever returned.
#[derive(Debug, Clone)]
pub struct PropertySearch {
    pub kind: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub wifi: Option<bool>,
    pub furnished: Option<bool>,
    pub pets_allowed: Option<bool>,
    pub available: Option<bool>,
    /// (latitude, longitude, radius in km)
    pub near: Option<(f64, f64, f64)>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for PropertySearch {
    fn default() -> Self {
        Self {
            kind: None,
            price_min: None,
            price_max: None,
            city: None,
            neighborhood: None,
            wifi: None,
            furnished: None,
            pets_allowed: None,
            available: Some(true),
            near: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl Database {
    pub fn insert_property(&self, p: &PropertyRow) -> Result<()> {
        self.with_conn(|conn| {
            let a = &p.amenities;
            conn.execute(
                &format!(
                    "INSERT INTO properties ({PROPERTY_COLUMNS}) VALUES
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31)"
                ),
                rusqlite::params![
                    p.id, p.landlord_id, p.title, p.description, p.kind, p.monthly_price,
                    p.deposit, p.address, p.latitude, p.longitude, p.neighborhood,
                    p.postal_code, p.city, p.state, p.available, p.active,
                    a.wifi, a.water_included, a.electricity_included, a.gas_included,
                    a.furnished, a.kitchen, a.washer, a.parking, a.pets_allowed,
                    a.private_bathroom, a.beds, a.bathrooms, a.square_meters,
                    p.created_at, p.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrites every mutable column of an existing listing.
    pub fn update_property(&self, p: &PropertyRow) -> Result<bool> {
        self.with_conn(|conn| {
            let a = &p.amenities;
            let changed = conn.execute(
                "UPDATE properties SET
                    title = ?2, description = ?3, kind = ?4, monthly_price = ?5, deposit = ?6,
                    address = ?7, latitude = ?8, longitude = ?9, neighborhood = ?10,
                    postal_code = ?11, city = ?12, state = ?13, available = ?14,
                    wifi = ?15, water_included = ?16, electricity_included = ?17,
                    gas_included = ?18, furnished = ?19, kitchen = ?20, washer = ?21,
                    parking = ?22, pets_allowed = ?23, private_bathroom = ?24, beds = ?25,
                    bathrooms = ?26, square_meters = ?27, updated_at = ?28
                 WHERE id = ?1 AND active = 1",
                rusqlite::params![
                    p.id, p.title, p.description, p.kind, p.monthly_price, p.deposit,
                    p.address, p.latitude, p.longitude, p.neighborhood, p.postal_code,
                    p.city, p.state, p.available,
                    a.wifi, a.water_included, a.electricity_included, a.gas_included,
                    a.furnished, a.kitchen, a.washer, a.parking, a.pets_allowed,
                    a.private_bathroom, a.beds, a.bathrooms, a.square_meters,
                    p.updated_at,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Active listings only.
    pub fn get_property(&self, id: &str) -> Result<Option<PropertyRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = ?1 AND active = 1");
            Ok(conn.query_row(&sql, [id], property_from_row).optional()?)
        })
    }

    pub fn properties_by_landlord(&self, landlord_id: &str) -> Result<Vec<PropertyRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PROPERTY_COLUMNS} FROM properties
                 WHERE landlord_id = ?1 AND active = 1
                 ORDER BY created_at DESC"
            );
            collect(conn, &sql, &[&landlord_id])
        })
    }

    pub fn soft_delete_property(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE properties SET active = 0 WHERE id = ?1 AND active = 1",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Filtered listing search. Without an anchor point results are newest
    /// first and paged in SQL; with one, listings lacking coordinates are
    /// excluded and results are ordered by distance.
    pub fn search_properties(&self, search: &PropertySearch) -> Result<Vec<PropertyHit>> {
        let mut sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE active = 1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(available) = search.available {
            sql.push_str(" AND available = ?");
            params.push(Box::new(available));
        }
        if let Some(kind) = &search.kind {
            sql.push_str(" AND kind = ?");
            params.push(Box::new(kind.clone()));
        }
        if let Some(min) = search.price_min {
            sql.push_str(" AND monthly_price >= ?");
            params.push(Box::new(min));
        }
        if let Some(max) = search.price_max {
            sql.push_str(" AND monthly_price <= ?");
            params.push(Box::new(max));
        }
        if let Some(city) = &search.city {
            sql.push_str(" AND city LIKE ? ESCAPE '\\'");
            params.push(Box::new(contains_pattern(city)));
        }
        if let Some(neighborhood) = &search.neighborhood {
            sql.push_str(" AND neighborhood LIKE ? ESCAPE '\\'");
            params.push(Box::new(contains_pattern(neighborhood)));
        }
        for (column, wanted) in [
            ("wifi", search.wifi),
            ("furnished", search.furnished),
            ("pets_allowed", search.pets_allowed),
        ] {
            if let Some(wanted) = wanted {
                sql.push_str(&format!(" AND {column} = ?"));
                params.push(Box::new(wanted));
            }
        }

        match search.near {
            None => {
                sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
                params.push(Box::new(search.limit));
                params.push(Box::new(search.offset));

                let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let rows = self.with_conn(|conn| collect(conn, &sql, &refs))?;
                Ok(rows
                    .into_iter()
                    .map(|property| PropertyHit {
                        property,
                        distance_km: None,
                    })
                    .collect())
            }
            Some((lat, lng, radius_km)) => {
                sql.push_str(" AND latitude IS NOT NULL AND longitude IS NOT NULL");

                let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
                let rows = self.with_conn(|conn| collect(conn, &sql, &refs))?;

                let mut hits: Vec<PropertyHit> = rows
                    .into_iter()
                    .filter_map(|property| {
                        let (plat, plng) = (property.latitude?, property.longitude?);
                        let distance = haversine_km(lat, lng, plat, plng);
                        (distance <= radius_km).then_some(PropertyHit {
                            property,
                            distance_km: Some(distance),
                        })
                    })
                    .collect();

                hits.sort_by(|a, b| {
                    a.distance_km
                        .partial_cmp(&b.distance_km)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                Ok(hits
                    .into_iter()
                    .skip(search.offset as usize)
                    .take(search.limit as usize)
                    .collect())
            }
        }
    }
}

/// `%term%` with LIKE metacharacters escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub(crate) fn collect(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<PropertyRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, property_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn property_from_row(row: &Row) -> rusqlite::Result<PropertyRow> {
    Ok(PropertyRow {
        id: row.get(0)?,
        landlord_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        kind: row.get(4)?,
        monthly_price: row.get(5)?,
        deposit: row.get(6)?,
        address: row.get(7)?,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        neighborhood: row.get(10)?,
        postal_code: row.get(11)?,
        city: row.get(12)?,
        state: row.get(13)?,
        available: row.get(14)?,
        active: row.get(15)?,
        amenities: Amenities {
            wifi: row.get(16)?,
            water_included: row.get(17)?,
            electricity_included: row.get(18)?,
            gas_included: row.get(19)?,
            furnished: row.get(20)?,
            kitchen: row.get(21)?,
            washer: row.get(22)?,
            parking: row.get(23)?,
            pets_allowed: row.get(24)?,
            private_bathroom: row.get(25)?,
            beds: row.get(26)?,
            bathrooms: row.get(27)?,
            square_meters: row.get(28)?,
        },
        created_at: row.get(29)?,
        updated_at: row.get(30)?,
    })
}
