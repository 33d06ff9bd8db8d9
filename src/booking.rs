//! Ticket bookings stored in SQLite.
//!
//! Bookings are validated against the [`CatalogService`] before they are stored.
//! Cancelling keeps the row with status `cancelled`; permanent deletion archives
//! a JSON copy in `deleted_bookings` first. The same database keeps the
//! assistant's chat history per session.

use crate::catalog::CatalogService;
use crate::error::{BusbotError, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        booking_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        bus_provider TEXT NOT NULL,
        from_district TEXT NOT NULL,
        to_district TEXT NOT NULL,
        dropping_point TEXT NOT NULL,
        travel_date TEXT NOT NULL,
        num_passengers INTEGER NOT NULL,
        fare INTEGER NOT NULL,
        total_amount INTEGER NOT NULL,
        booking_date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        cancelled_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_bookings_phone ON bookings(phone);

    CREATE TABLE IF NOT EXISTS deleted_bookings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        booking_id TEXT NOT NULL,
        booking_data TEXT NOT NULL,
        deleted_at TEXT NOT NULL,
        phone TEXT
    );

    CREATE TABLE IF NOT EXISTS chat_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        phone TEXT,
        role TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chat_session ON chat_history(session_id);
"#;

const SELECT_BOOKING: &str = r#"
    SELECT booking_id, name, phone, bus_provider, from_district, to_district, dropping_point,
           travel_date, num_passengers, fare, total_amount, booking_date, status, cancelled_at
    FROM bookings
"#;

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(BookingStatus::Active),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Unknown booking status: {}", s)),
        }
    }
}

/// A booking request as submitted by a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub name: String,
    pub phone: String,
    pub bus_provider: String,
    pub from_district: String,
    pub to_district: String,
    pub dropping_point: String,
    pub travel_date: String,
    #[serde(default = "default_passengers")]
    pub num_passengers: u32,
}

fn default_passengers() -> u32 {
    1
}

/// A stored booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// `BK` followed by a zero-padded sequence number, e.g. `BK00042`.
    pub booking_id: String,
    pub name: String,
    pub phone: String,
    pub bus_provider: String,
    pub from_district: String,
    pub to_district: String,
    pub dropping_point: String,
    pub travel_date: String,
    pub num_passengers: u32,
    /// Fare per passenger in Taka.
    pub fare: u32,
    pub total_amount: u32,
    pub booking_date: DateTime<Utc>,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Active bookings and revenue of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStats {
    pub provider: String,
    pub bookings: u32,
    pub revenue: u64,
}

/// Aggregate booking figures. Revenue counts active bookings only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingStats {
    pub total_bookings: u32,
    pub active_bookings: u32,
    pub cancelled_bookings: u32,
    pub total_revenue: u64,
    pub providers: Vec<ProviderStats>,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            _ => Err(format!("Unknown chat role: {}", s)),
        }
    }
}

/// One stored message of an assistant session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Strip whitespace and the Bangladeshi `+88` country prefix.
pub fn normalize_phone(phone: &str) -> String {
    let phone = phone.trim();
    phone.strip_prefix("+88").unwrap_or(phone).trim().to_string()
}

/// SQLite-backed booking service.
pub struct BookingService {
    conn: Mutex<Connection>,
}

impl BookingService {
    /// Open (or create) the booking database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened booking database at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory booking database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BusbotError::Booking(format!("Failed to acquire lock: {}", e)))
    }

    /// Validate a request against the catalog and store it.
    #[instrument(skip(self, catalog, request), fields(provider = %request.bus_provider))]
    pub fn create(&self, catalog: &CatalogService, request: NewBooking) -> Result<Booking> {
        let name = request.name.trim().to_string();
        let name_len = name.chars().count();
        if !(2..=100).contains(&name_len) {
            return Err(BusbotError::InvalidInput(
                "name must be between 2 and 100 characters".to_string(),
            ));
        }

        let phone = normalize_phone(&request.phone);
        if !(11..=15).contains(&phone.chars().count()) {
            return Err(BusbotError::InvalidInput(
                "phone must be between 11 and 15 characters".to_string(),
            ));
        }

        if !(1..=10).contains(&request.num_passengers) {
            return Err(BusbotError::InvalidInput(
                "number of passengers must be between 1 and 10".to_string(),
            ));
        }

        let travel_date = request.travel_date.trim().to_string();
        if travel_date.is_empty() {
            return Err(BusbotError::InvalidInput("travel date is required".to_string()));
        }

        let provider = catalog.find_provider(&request.bus_provider).ok_or_else(|| {
            BusbotError::InvalidInput(format!(
                "Bus provider '{}' not found",
                request.bus_provider
            ))
        })?;

        if !catalog.serves_route(&provider.name, &request.from_district, &request.to_district) {
            return Err(BusbotError::InvalidInput(format!(
                "{} does not operate between {} and {}",
                provider.name, request.from_district, request.to_district
            )));
        }

        let fare = catalog
            .fare(&request.to_district, &request.dropping_point)
            .filter(|fare| *fare > 0)
            .ok_or_else(|| {
                BusbotError::InvalidInput(format!(
                    "Dropping point '{}' not found in {}",
                    request.dropping_point, request.to_district
                ))
            })?;

        let total_amount = fare.checked_mul(request.num_passengers).ok_or_else(|| {
            BusbotError::InvalidInput(format!(
                "total fare of {} x {} Taka is out of range",
                request.num_passengers, fare
            ))
        })?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let last_seq: i64 = tx
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'bookings'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let booking = Booking {
            booking_id: format!("BK{:05}", last_seq + 1),
            name,
            phone,
            bus_provider: provider.name.clone(),
            from_district: request.from_district.trim().to_string(),
            to_district: request.to_district.trim().to_string(),
            dropping_point: request.dropping_point.trim().to_string(),
            travel_date,
            num_passengers: request.num_passengers,
            fare,
            total_amount,
            booking_date: Utc::now(),
            status: BookingStatus::Active,
            cancelled_at: None,
        };

        tx.execute(
            r#"
            INSERT INTO bookings
            (booking_id, name, phone, bus_provider, from_district, to_district, dropping_point,
             travel_date, num_passengers, fare, total_amount, booking_date, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                booking.booking_id,
                booking.name,
                booking.phone,
                booking.bus_provider,
                booking.from_district,
                booking.to_district,
                booking.dropping_point,
                booking.travel_date,
                booking.num_passengers,
                booking.fare,
                booking.total_amount,
                booking.booking_date.to_rfc3339(),
                booking.status.as_str(),
            ],
        )?;
        tx.commit()?;

        info!("Created booking {}", booking.booking_id);
        Ok(booking)
    }

    /// All bookings, newest first.
    pub fn list(&self) -> Result<Vec<Booking>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id DESC", SELECT_BOOKING))?;
        let rows = stmt.query_map([], row_to_booking)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Bookings made with a phone number, newest first.
    pub fn by_phone(&self, phone: &str) -> Result<Vec<Booking>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} WHERE phone = ?1 ORDER BY id DESC", SELECT_BOOKING))?;
        let rows = stmt.query_map(params![normalize_phone(phone)], row_to_booking)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get(&self, booking_id: &str) -> Result<Option<Booking>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("{} WHERE booking_id = ?1", SELECT_BOOKING),
                params![booking_id.trim()],
                row_to_booking,
            )
            .optional()?)
    }

    /// Cancel an active booking. Returns false if it does not exist or is already cancelled.
    #[instrument(skip(self))]
    pub fn cancel(&self, booking_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE bookings SET status = 'cancelled', cancelled_at = ?1 WHERE booking_id = ?2 AND status = 'active'",
            params![Utc::now().to_rfc3339(), booking_id.trim()],
        )?;
        if updated > 0 {
            info!("Cancelled booking {}", booking_id);
        }
        Ok(updated > 0)
    }

    /// Permanently delete a booking, archiving a copy first.
    #[instrument(skip(self))]
    pub fn delete(&self, booking_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let booking_id = booking_id.trim();

        let Some(booking) = conn
            .query_row(
                &format!("{} WHERE booking_id = ?1", SELECT_BOOKING),
                params![booking_id],
                row_to_booking,
            )
            .optional()?
        else {
            return Ok(false);
        };

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO deleted_bookings (booking_id, booking_data, deleted_at, phone) VALUES (?1, ?2, ?3, ?4)",
            params![
                booking_id,
                serde_json::to_string(&booking)?,
                Utc::now().to_rfc3339(),
                booking.phone,
            ],
        )?;
        tx.execute("DELETE FROM bookings WHERE booking_id = ?1", params![booking_id])?;
        tx.commit()?;

        info!("Deleted booking {}", booking_id);
        Ok(true)
    }

    /// Number of archived (permanently deleted) bookings.
    pub fn archived_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM deleted_bookings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn stats(&self) -> Result<BookingStats> {
        let conn = self.lock()?;

        let (total, active, cancelled, revenue): (u32, u32, u32, i64) = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'active'),
                   COUNT(*) FILTER (WHERE status = 'cancelled'),
                   COALESCE(SUM(total_amount) FILTER (WHERE status = 'active'), 0)
            FROM bookings
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT bus_provider, COUNT(*), SUM(total_amount)
            FROM bookings
            WHERE status = 'active'
            GROUP BY bus_provider
            ORDER BY bus_provider
            "#,
        )?;
        let providers = stmt
            .query_map([], |row| {
                let revenue: i64 = row.get(2)?;
                Ok(ProviderStats {
                    provider: row.get(0)?,
                    bookings: row.get(1)?,
                    revenue: revenue as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(BookingStats {
            total_bookings: total,
            active_bookings: active,
            cancelled_bookings: cancelled,
            total_revenue: revenue as u64,
            providers,
        })
    }

    /// Append a message to a session's chat history.
    pub fn save_chat_message(
        &self,
        session_id: &str,
        role: ChatRole,
        message: &str,
        phone: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_history (session_id, phone, role, message, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, phone, role.as_str(), message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// The last `limit` messages of a session, oldest first.
    pub fn chat_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT role, message, phone, timestamp
            FROM chat_history
            WHERE session_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut messages = stmt
            .query_map(params![session_id, limit], row_to_chat_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Forget a session's chat history. Returns the number of removed messages.
    #[instrument(skip(self))]
    pub fn clear_chat_history(&self, session_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM chat_history WHERE session_id = ?1", params![session_id])?;
        info!("Cleared {} chat messages", removed);
        Ok(removed)
    }
}

fn timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn parsed<T: std::str::FromStr<Err = String>>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn row_to_booking(row: &Row<'_>) -> rusqlite::Result<Booking> {
    let status = parsed(row, 12)?;
    let cancelled_at = match row.get::<_, Option<String>>(13)? {
        Some(_) => Some(timestamp(row, 13)?),
        None => None,
    };

    Ok(Booking {
        booking_id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        bus_provider: row.get(3)?,
        from_district: row.get(4)?,
        to_district: row.get(5)?,
        dropping_point: row.get(6)?,
        travel_date: row.get(7)?,
        num_passengers: row.get(8)?,
        fare: row.get(9)?,
        total_amount: row.get(10)?,
        booking_date: timestamp(row, 11)?,
        status,
        cancelled_at,
    })
}

fn row_to_chat_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        role: parsed(row, 0)?,
        message: row.get(1)?,
        phone: row.get(2)?,
        timestamp: timestamp(row, 3)?,
    })
}
