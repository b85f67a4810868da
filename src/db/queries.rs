use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::models::{Appointment, AppointmentStatus, NewAppointment, OAuthToken, SlotTime};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const APPOINTMENT_COLUMNS: &str =
    "id, name, phone, email, service, notes, date, time, status, google_event_id, whatsapp_sent, created_at";

// ── Appointments ──

/// Inserts a confirmed appointment. Returns `None` when a confirmed
/// appointment already holds the same date and time.
pub fn create_appointment(
    conn: &Connection,
    new: &NewAppointment,
    created_at: NaiveDateTime,
) -> anyhow::Result<Option<Appointment>> {
    let result = conn.execute(
        "INSERT INTO appointments (name, phone, email, service, notes, date, time, status, google_event_id, whatsapp_sent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'confirmed', NULL, 0, ?8)",
        params![
            new.name,
            new.phone,
            new.email,
            new.service,
            new.notes,
            new.date.format(DATE_FORMAT).to_string(),
            new.time.to_string(),
            created_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    Ok(Some(Appointment {
        id,
        name: new.name.clone(),
        phone: new.phone.clone(),
        email: new.email.clone(),
        service: new.service.clone(),
        notes: new.notes.clone(),
        date: new.date,
        time: new.time,
        status: AppointmentStatus::Confirmed,
        google_event_id: None,
        whatsapp_sent: false,
        created_at,
    }))
}

pub fn get_appointment(conn: &Connection, id: i64) -> anyhow::Result<Option<Appointment>> {
    let row = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;

    row.transpose()
}

pub fn get_confirmed_by_date(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<Appointment>> {
    let date = date.format(DATE_FORMAT).to_string();
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE date = ?1 AND status = 'confirmed' ORDER BY time ASC"
    ))?;

    let rows = stmt.query_map(params![date], |row| Ok(parse_appointment_row(row)))?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_confirmed_in_range(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE date >= ?1 AND date <= ?2 AND status = 'confirmed' ORDER BY date ASC, time ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            start.format(DATE_FORMAT).to_string(),
            end.format(DATE_FORMAT).to_string()
        ],
        |row| Ok(parse_appointment_row(row)),
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn is_slot_taken(conn: &Connection, date: NaiveDate, time: SlotTime) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE date = ?1 AND time = ?2 AND status = 'confirmed'",
        params![date.format(DATE_FORMAT).to_string(), time.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn set_google_event_id(conn: &Connection, id: i64, event_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET google_event_id = ?1 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(count > 0)
}

pub fn set_whatsapp_sent(conn: &Connection, id: i64, sent: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET whatsapp_sent = ?1 WHERE id = ?2",
        params![sent as i32, id],
    )?;
    Ok(count > 0)
}

pub fn update_appointment_status(
    conn: &Connection,
    id: i64,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

pub fn delete_appointment(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM appointments WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let date_str: String = row.get(6)?;
    let time_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let created_at_str: String = row.get(11)?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid stored date {date_str}: {e}"))?;
    let time: SlotTime = time_str.parse()?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Appointment {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        service: row.get(4)?,
        notes: row.get(5)?,
        date,
        time,
        status: AppointmentStatus::parse(&status_str),
        google_event_id: row.get(9)?,
        whatsapp_sent: row.get::<_, i32>(10)? != 0,
        created_at,
    })
}

// ── Configurations ──

pub fn get_config_value(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM configurations WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn save_config_value(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO configurations (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET
           value = excluded.value,
           updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// ── OAuth Tokens ──

pub fn get_oauth_token(conn: &Connection, provider: &str) -> anyhow::Result<Option<OAuthToken>> {
    let row = conn
        .query_row(
            "SELECT provider, access_token, refresh_token, expires_at, scope, created_at, updated_at
             FROM oauth_tokens WHERE provider = ?1",
            params![provider],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((provider, access_token, refresh_token, expires_at, scope, created_at, updated_at)) =
        row
    else {
        return Ok(None);
    };

    let expires_at = NaiveDateTime::parse_from_str(&expires_at, TIMESTAMP_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid token expiry {expires_at}: {e}"))?;
    let created_at = NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at, TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Some(OAuthToken {
        provider,
        access_token,
        refresh_token,
        expires_at,
        scope,
        created_at,
        updated_at,
    }))
}

pub fn upsert_oauth_token(conn: &Connection, token: &OAuthToken) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO oauth_tokens (provider, access_token, refresh_token, expires_at, scope, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(provider) DO UPDATE SET
           access_token = excluded.access_token,
           refresh_token = excluded.refresh_token,
           expires_at = excluded.expires_at,
           scope = excluded.scope,
           updated_at = excluded.updated_at",
        params![
            token.provider,
            token.access_token,
            token.refresh_token,
            token.expires_at.format(TIMESTAMP_FORMAT).to_string(),
            token.scope,
            token.created_at.format(TIMESTAMP_FORMAT).to_string(),
            token.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn delete_oauth_token(conn: &Connection, provider: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM oauth_tokens WHERE provider = ?1",
        params![provider],
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn new_appointment(date: &str, time: &str) -> NewAppointment {
        NewAppointment {
            name: "Ana Silva".to_string(),
            phone: "11999998888".to_string(),
            email: None,
            service: Some("Consulta".to_string()),
            notes: None,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            time: time.parse().unwrap(),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-03-01 12:00:00", TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_create_and_get_appointment() {
        let conn = setup_db();
        let created = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now())
            .unwrap()
            .unwrap();

        let loaded = get_appointment(&conn, created.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Ana Silva");
        assert_eq!(loaded.time.to_string(), "10:00");
        assert_eq!(loaded.status, AppointmentStatus::Confirmed);
        assert!(loaded.google_event_id.is_none());
        assert!(!loaded.whatsapp_sent);
        assert_eq!(loaded.created_at, now());
    }

    #[test]
    fn test_unique_confirmed_slot() {
        let conn = setup_db();
        let first = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now()).unwrap();
        assert!(first.is_some());

        let second = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now()).unwrap();
        assert!(second.is_none());

        let other_day = create_appointment(&conn, &new_appointment("2025-03-11", "10:00"), now()).unwrap();
        assert!(other_day.is_some());
    }

    #[test]
    fn test_cancelled_frees_slot() {
        let conn = setup_db();
        let first = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now())
            .unwrap()
            .unwrap();
        assert!(update_appointment_status(&conn, first.id, AppointmentStatus::Cancelled).unwrap());

        let date = first.date;
        assert!(!is_slot_taken(&conn, date, first.time).unwrap());
        assert!(get_confirmed_by_date(&conn, date).unwrap().is_empty());

        let rebooked = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now()).unwrap();
        assert!(rebooked.is_some());
    }

    #[test]
    fn test_range_query() {
        let conn = setup_db();
        create_appointment(&conn, &new_appointment("2025-03-09", "10:00"), now()).unwrap();
        create_appointment(&conn, &new_appointment("2025-03-10", "11:00"), now()).unwrap();
        create_appointment(&conn, &new_appointment("2025-03-10", "09:00"), now()).unwrap();
        create_appointment(&conn, &new_appointment("2025-03-15", "10:00"), now()).unwrap();

        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let found = get_confirmed_in_range(&conn, start, end).unwrap();
        let times: Vec<String> = found.iter().map(|a| a.time.to_string()).collect();
        assert_eq!(times, vec!["09:00", "11:00"]);
    }

    #[test]
    fn test_side_effect_flags() {
        let conn = setup_db();
        let a = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now())
            .unwrap()
            .unwrap();
        assert!(set_google_event_id(&conn, a.id, "evt-1").unwrap());
        assert!(set_whatsapp_sent(&conn, a.id, true).unwrap());

        let loaded = get_appointment(&conn, a.id).unwrap().unwrap();
        assert_eq!(loaded.google_event_id.as_deref(), Some("evt-1"));
        assert!(loaded.whatsapp_sent);

        assert!(!set_google_event_id(&conn, 9999, "evt-2").unwrap());
    }

    #[test]
    fn test_delete_appointment() {
        let conn = setup_db();
        let a = create_appointment(&conn, &new_appointment("2025-03-10", "10:00"), now())
            .unwrap()
            .unwrap();
        assert!(delete_appointment(&conn, a.id).unwrap());
        assert!(get_appointment(&conn, a.id).unwrap().is_none());
        assert!(!delete_appointment(&conn, a.id).unwrap());
    }

    #[test]
    fn test_config_value_upsert() {
        let conn = setup_db();
        assert!(get_config_value(&conn, "app_config").unwrap().is_none());
        save_config_value(&conn, "app_config", "one").unwrap();
        save_config_value(&conn, "app_config", "two").unwrap();
        assert_eq!(get_config_value(&conn, "app_config").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_oauth_token_single_row_per_provider() {
        let conn = setup_db();
        let mut token = OAuthToken {
            provider: "google_calendar".to_string(),
            access_token: "a1".to_string(),
            refresh_token: "r1".to_string(),
            expires_at: now(),
            scope: None,
            created_at: now(),
            updated_at: now(),
        };
        upsert_oauth_token(&conn, &token).unwrap();
        token.access_token = "a2".to_string();
        upsert_oauth_token(&conn, &token).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM oauth_tokens", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let loaded = get_oauth_token(&conn, "google_calendar").unwrap().unwrap();
        assert_eq!(loaded.access_token, "a2");
        assert_eq!(loaded.expires_at, now());

        assert!(delete_oauth_token(&conn, "google_calendar").unwrap());
        assert!(get_oauth_token(&conn, "google_calendar").unwrap().is_none());
    }
}
