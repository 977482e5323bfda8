use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            kind        TEXT NOT NULL,
            full_name   TEXT NOT NULL,
            phone       TEXT,
            photo_url   TEXT,
            verified    INTEGER NOT NULL DEFAULT 0,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS properties (
            id                    TEXT PRIMARY KEY,
            landlord_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title                 TEXT NOT NULL,
            description           TEXT,
            kind                  TEXT NOT NULL,
            monthly_price         REAL NOT NULL,
            deposit               REAL,
            address               TEXT NOT NULL,
            latitude              REAL,
            longitude             REAL,
            neighborhood          TEXT,
            postal_code           TEXT,
            city                  TEXT NOT NULL DEFAULT 'Puebla',
            state                 TEXT NOT NULL DEFAULT 'Puebla',
            available             INTEGER NOT NULL DEFAULT 1,
            active                INTEGER NOT NULL DEFAULT 1,
            wifi                  INTEGER NOT NULL DEFAULT 0,
            water_included        INTEGER NOT NULL DEFAULT 0,
            electricity_included  INTEGER NOT NULL DEFAULT 0,
            gas_included          INTEGER NOT NULL DEFAULT 0,
            furnished             INTEGER NOT NULL DEFAULT 0,
            kitchen               INTEGER NOT NULL DEFAULT 0,
            washer                INTEGER NOT NULL DEFAULT 0,
            parking               INTEGER NOT NULL DEFAULT 0,
            pets_allowed          INTEGER NOT NULL DEFAULT 0,
            private_bathroom      INTEGER NOT NULL DEFAULT 0,
            beds                  INTEGER NOT NULL DEFAULT 1,
            bathrooms             INTEGER NOT NULL DEFAULT 1,
            square_meters         REAL,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_properties_search
            ON properties(active, available, monthly_price);

        CREATE INDEX IF NOT EXISTS idx_properties_landlord
            ON properties(landlord_id, created_at);

        CREATE TABLE IF NOT EXISTS favorites (
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            property_id TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, property_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            body            TEXT NOT NULL,
            read            INTEGER NOT NULL DEFAULT 0,
            property_id     TEXT REFERENCES properties(id) ON DELETE SET NULL,
            created_at      TEXT NOT NULL,
            CHECK (sender_id <> recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, recipient_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(recipient_id, read);

        CREATE TABLE IF NOT EXISTS notifications (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            related_id  TEXT,
            action_url  TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, read, created_at);

        CREATE TABLE IF NOT EXISTS notification_settings (
            user_id         TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            email_rentals   INTEGER NOT NULL DEFAULT 1,
            email_ratings   INTEGER NOT NULL DEFAULT 1,
            push_rentals    INTEGER NOT NULL DEFAULT 1,
            push_ratings    INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS rentals (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id     TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
            student_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            landlord_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            start_date      TEXT NOT NULL,
            end_date        TEXT,
            agreed_price    REAL NOT NULL,
            status          TEXT NOT NULL DEFAULT 'active',
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rentals_landlord ON rentals(landlord_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_rentals_student ON rentals(student_id, created_at);

        CREATE TABLE IF NOT EXISTS property_ratings (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            rental_id       INTEGER NOT NULL REFERENCES rentals(id) ON DELETE CASCADE,
            student_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            property_id     TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
            overall         INTEGER NOT NULL CHECK (overall BETWEEN 1 AND 5),
            cleanliness     INTEGER NOT NULL CHECK (cleanliness BETWEEN 1 AND 5),
            location        INTEGER NOT NULL CHECK (location BETWEEN 1 AND 5),
            value_for_money INTEGER NOT NULL CHECK (value_for_money BETWEEN 1 AND 5),
            communication   INTEGER NOT NULL CHECK (communication BETWEEN 1 AND 5),
            comment         TEXT,
            visible         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            UNIQUE (rental_id, student_id)
        );

        CREATE INDEX IF NOT EXISTS idx_property_ratings_property
            ON property_ratings(property_id, visible);

        CREATE TABLE IF NOT EXISTS tenant_ratings (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            rental_id           INTEGER NOT NULL REFERENCES rentals(id) ON DELETE CASCADE,
            landlord_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            student_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            overall             INTEGER NOT NULL CHECK (overall BETWEEN 1 AND 5),
            payment_punctuality INTEGER NOT NULL CHECK (payment_punctuality BETWEEN 1 AND 5),
            property_care       INTEGER NOT NULL CHECK (property_care BETWEEN 1 AND 5),
            coexistence         INTEGER NOT NULL CHECK (coexistence BETWEEN 1 AND 5),
            communication       INTEGER NOT NULL CHECK (communication BETWEEN 1 AND 5),
            comment             TEXT,
            visible             INTEGER NOT NULL DEFAULT 1,
            created_at          TEXT NOT NULL,
            UNIQUE (rental_id, landlord_id)
        );

        CREATE INDEX IF NOT EXISTS idx_tenant_ratings_student
            ON tenant_ratings(student_id, visible);

        CREATE TABLE IF NOT EXISTS tenant_reports (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            landlord_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            student_id              TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            rental_id               INTEGER REFERENCES rentals(id) ON DELETE SET NULL,
            problem                 TEXT NOT NULL,
            description             TEXT NOT NULL,
            evidence_urls           TEXT NOT NULL DEFAULT '[]',
            severity                TEXT NOT NULL DEFAULT 'moderate',
            incident_date           TEXT,
            status                  TEXT NOT NULL DEFAULT 'pending',
            admin_verified          INTEGER NOT NULL DEFAULT 0,
            visible_to_landlords    INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tenant_reports_student
            ON tenant_reports(student_id, admin_verified, visible_to_landlords);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'properties', 'favorites', 'messages', 'notifications',
                              'notification_settings', 'rentals', 'property_ratings',
                              'tenant_ratings', 'tenant_reports')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 10);
    }
}
