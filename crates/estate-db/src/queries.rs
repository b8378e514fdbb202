use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use estate_query::{PageSpec, Query};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::filter_sql::{bind, escape_like, order_by, push_predicates, where_clause};
use crate::models::{ImageRow, MessageRow, PropertyRow, UserRow};
use crate::{Database, now_ts};

const USER_COLUMNS: &str =
    "id, email, name, phone, avatar, password, is_admin, is_banned, verified, created, updated";

const PROPERTY_COLUMNS: &str = "p.id, p.title, p.description, p.property_type, p.listing_type, \
     p.status, p.address, p.city, p.state, p.country, p.latitude, p.longitude, p.price, \
     p.bedrooms, p.bathrooms, p.square_feet, p.owner_id, p.agent_id, p.created, p.updated";

/// Favorites whose listing the user may still see: other people's drafts
/// drop out until they are published again.
const VISIBLE_FAVORITES: &str = "FROM favorites f
     JOIN properties p ON p.id = f.property_id
     WHERE f.user_id = ?1 AND (p.status != 'draft' OR p.owner_id = ?1)";

const MESSAGE_COLUMNS: &str = "m.id, m.property_id, m.sender_id, m.name, m.email, m.phone, \
     m.body, m.status, m.reply, m.replied_by, m.replied_at, m.created, m.updated";

/// Which listings a query may see.
#[derive(Debug, Clone, Copy)]
pub enum ListScope<'a> {
    /// Everything except other people's drafts.
    Public { viewer: Option<&'a str> },
    /// Listings owned by one user, drafts included.
    Owner(&'a str),
    /// No restriction (admins).
    All,
}

/// Result of a guarded listing update.
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(PropertyRow),
    NotFound,
    /// The caller's concurrency token no longer matches.
    Conflict { current_updated: String },
}

/// Result of a guarded message update.
#[derive(Debug)]
pub enum TransitionOutcome {
    Updated(MessageRow),
    NotFound,
    /// The guard refused the change. Carries the unchanged row.
    Rejected(MessageRow),
}

impl Database {
    // -- Users --

    /// Insert a new account. Returns false, without writing, when the email
    /// is already registered.
    pub fn create_user(&self, user: &UserRow) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, name, phone, avatar, password, is_admin, is_banned, verified, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    user.id,
                    user.email,
                    user.name,
                    user.phone,
                    user.avatar,
                    user.password,
                    user.is_admin,
                    user.is_banned,
                    user.verified,
                    user.created,
                    user.updated,
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
            conn.query_row(&sql, [email], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    /// Whether `id` names an account that can be assigned as a listing agent.
    pub fn is_active_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE id = ?1 AND is_banned = 0",
                    [id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Newest accounts first. `search` matches email or name.
    pub fn list_users(&self, search: Option<&str>, page: PageSpec) -> Result<(Vec<UserRow>, u64)> {
        self.with_conn(|conn| {
            let mut params: Vec<SqlValue> = Vec::new();
            let mut conditions = Vec::new();
            if let Some(search) = search {
                let n = bind(&mut params, SqlValue::Text(format!("%{}%", escape_like(search))));
                conditions.push(format!("(email LIKE ?{n} ESCAPE '\\' OR name LIKE ?{n} ESCAPE '\\')"));
            }
            let filter = where_clause(&conditions);

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM users {}", filter),
                params_from_iter(params.iter()),
                |r| r.get(0),
            )?;

            let limit = bind(&mut params, SqlValue::Integer(page.limit() as i64));
            let offset = bind(&mut params, SqlValue::Integer(page.offset() as i64));
            let sql = format!(
                "SELECT {} FROM users {} ORDER BY created DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
                USER_COLUMNS, filter, limit, offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    /// Set any of the moderation flags. Returns the updated row, or `None`
    /// if the user does not exist.
    pub fn update_user_flags(
        &self,
        id: &str,
        is_banned: Option<bool>,
        is_admin: Option<bool>,
        verified: Option<bool>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    is_banned = COALESCE(?2, is_banned),
                    is_admin  = COALESCE(?3, is_admin),
                    verified  = COALESCE(?4, verified),
                    updated   = ?5
                 WHERE id = ?1",
                params![id, is_banned, is_admin, verified, now_ts()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, id)
        })
    }

    /// Delete an account and everything it owns. Returns the ids of images
    /// that belonged to its listings so their files can be removed, or
    /// `None` if the user did not exist.
    pub fn delete_user(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let images = {
                let mut stmt = tx.prepare(
                    "SELECT i.id FROM property_images i
                     JOIN properties p ON p.id = i.property_id
                     WHERE p.owner_id = ?1",
                )?;
                stmt.query_map([id], |r| r.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok((deleted > 0).then_some(images))
        })
    }

    /// (total users, banned users)
    pub fn count_users(&self) -> Result<(u64, u64)> {
        self.with_conn(|conn| {
            let (total, banned): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_banned), 0) FROM users",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok((total as u64, banned as u64))
        })
    }

    // -- Properties --

    pub fn insert_property(&self, p: &PropertyRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO properties (id, title, description, property_type, listing_type, status,
                    address, city, state, country, latitude, longitude, price, bedrooms, bathrooms,
                    square_feet, owner_id, agent_id, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                params![
                    p.id,
                    p.title,
                    p.description,
                    p.property_type,
                    p.listing_type,
                    p.status,
                    p.address,
                    p.city,
                    p.state,
                    p.country,
                    p.latitude,
                    p.longitude,
                    p.price,
                    p.bedrooms,
                    p.bathrooms,
                    p.square_feet,
                    p.owner_id,
                    p.agent_id,
                    p.created,
                    p.updated,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_property(&self, id: &str) -> Result<Option<PropertyRow>> {
        self.with_conn(|conn| query_property(conn, id))
    }

    /// Run a translated listing query. Returns the requested page and the
    /// total number of matches.
    pub fn list_properties(&self, query: &Query, scope: ListScope<'_>) -> Result<(Vec<PropertyRow>, u64)> {
        self.with_conn(|conn| {
            let mut params: Vec<SqlValue> = Vec::new();
            let mut conditions = Vec::new();
            match scope {
                ListScope::Public { viewer: Some(viewer) } => {
                    let n = bind(&mut params, SqlValue::Text(viewer.to_string()));
                    conditions.push(format!("(p.status != 'draft' OR p.owner_id = ?{})", n));
                }
                ListScope::Public { viewer: None } => {
                    conditions.push("p.status != 'draft'".to_string());
                }
                ListScope::Owner(owner) => {
                    let n = bind(&mut params, SqlValue::Text(owner.to_string()));
                    conditions.push(format!("p.owner_id = ?{}", n));
                }
                ListScope::All => {}
            }
            push_predicates(&query.predicates, &mut conditions, &mut params);
            let filter = where_clause(&conditions);

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM properties p {}", filter),
                params_from_iter(params.iter()),
                |r| r.get(0),
            )?;

            let limit = bind(&mut params, SqlValue::Integer(query.page.limit() as i64));
            let offset = bind(&mut params, SqlValue::Integer(query.page.offset() as i64));
            let sql = format!(
                "SELECT {} FROM properties p {} {} LIMIT ?{} OFFSET ?{}",
                PROPERTY_COLUMNS,
                filter,
                order_by(&query.sort),
                limit,
                offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(params_from_iter(params.iter()), property_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            load_images(conn, &mut rows)?;
            Ok((rows, total as u64))
        })
    }

    /// Write every column of `row`. When `expected_updated` is given it must
    /// equal the stored `updated` timestamp, otherwise nothing is written.
    pub fn update_property(&self, row: &PropertyRow, expected_updated: Option<&str>) -> Result<UpdateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row("SELECT updated FROM properties WHERE id = ?1", [&row.id], |r| r.get(0))
                .optional()?;

            let Some(current) = current else {
                return Ok(UpdateOutcome::NotFound);
            };
            if let Some(expected) = expected_updated {
                if expected != current {
                    return Ok(UpdateOutcome::Conflict {
                        current_updated: current,
                    });
                }
            }

            let updated = next_ts(&current);
            tx.execute(
                "UPDATE properties SET title = ?2, description = ?3, property_type = ?4,
                    listing_type = ?5, status = ?6, address = ?7, city = ?8, state = ?9,
                    country = ?10, latitude = ?11, longitude = ?12, price = ?13, bedrooms = ?14,
                    bathrooms = ?15, square_feet = ?16, agent_id = ?17, updated = ?18
                 WHERE id = ?1",
                params![
                    row.id,
                    row.title,
                    row.description,
                    row.property_type,
                    row.listing_type,
                    row.status,
                    row.address,
                    row.city,
                    row.state,
                    row.country,
                    row.latitude,
                    row.longitude,
                    row.price,
                    row.bedrooms,
                    row.bathrooms,
                    row.square_feet,
                    row.agent_id,
                    updated,
                ],
            )?;
            tx.commit()?;

            match query_property(conn, &row.id)? {
                Some(row) => Ok(UpdateOutcome::Updated(row)),
                None => Ok(UpdateOutcome::NotFound),
            }
        })
    }

    /// Delete a listing. Returns its image ids, or `None` if it did not exist.
    pub fn delete_property(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let images = query_image_ids(&tx, id)?;
            let deleted = tx.execute("DELETE FROM properties WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok((deleted > 0).then_some(images))
        })
    }

    /// Listing counts per status for one owner.
    pub fn count_properties_by_status(&self, owner_id: &str) -> Result<Vec<(String, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM properties WHERE owner_id = ?1 GROUP BY status",
            )?;
            let rows = stmt
                .query_map([owner_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Images --

    /// Append an image to a listing's gallery.
    pub fn add_property_image(&self, image_id: &str, property_id: &str, size: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO property_images (id, property_id, position, size, created)
                 VALUES (?1, ?2,
                    (SELECT COALESCE(MAX(position) + 1, 0) FROM property_images WHERE property_id = ?2),
                    ?3, ?4)",
                params![image_id, property_id, size, now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn get_image(&self, id: &str) -> Result<Option<ImageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, property_id, size FROM property_images WHERE id = ?1",
                [id],
                |row| {
                    Ok(ImageRow {
                        id: row.get(0)?,
                        property_id: row.get(1)?,
                        size: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Favorites --

    /// Toggle a favorite: removes if it exists, inserts if not.
    /// Returns true when the listing is now favorited.
    pub fn toggle_favorite(&self, id: &str, user_id: &str, property_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM favorites WHERE user_id = ?1 AND property_id = ?2",
                    params![user_id, property_id],
                    |row| row.get(0),
                )
                .optional()?;

            let favorited = if let Some(existing_id) = existing {
                tx.execute("DELETE FROM favorites WHERE id = ?1", [&existing_id])?;
                false
            } else {
                tx.execute(
                    "INSERT INTO favorites (id, user_id, property_id, created) VALUES (?1, ?2, ?3, ?4)",
                    params![id, user_id, property_id, now_ts()],
                )?;
                true
            };
            tx.commit()?;
            Ok(favorited)
        })
    }

    pub fn is_favorited(&self, user_id: &str, property_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM favorites WHERE user_id = ?1 AND property_id = ?2",
                    params![user_id, property_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn favorite_property_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT f.property_id {} ORDER BY f.created DESC, f.rowid DESC",
                VISIBLE_FAVORITES
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map([user_id], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Favorited listings, most recently favorited first.
    pub fn list_favorites(&self, user_id: &str, page: PageSpec) -> Result<(Vec<PropertyRow>, u64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {}", VISIBLE_FAVORITES),
                [user_id],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} {} ORDER BY f.created DESC, f.rowid DESC LIMIT ?2 OFFSET ?3",
                PROPERTY_COLUMNS, VISIBLE_FAVORITES
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(
                    params![user_id, page.limit() as i64, page.offset() as i64],
                    property_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            load_images(conn, &mut rows)?;
            Ok((rows, total as u64))
        })
    }

    // -- Messages --

    pub fn insert_message(&self, m: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO property_messages (id, property_id, sender_id, name, email, phone, body,
                    status, reply, replied_by, replied_at, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    m.id,
                    m.property_id,
                    m.sender_id,
                    m.name,
                    m.email,
                    m.phone,
                    m.body,
                    m.status,
                    m.reply,
                    m.replied_by,
                    m.replied_at,
                    m.created,
                    m.updated,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// All messages between `sender_id` and a listing, oldest first.
    /// Insertion order breaks timestamp ties.
    pub fn get_thread(&self, property_id: &str, sender_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM property_messages m
                 WHERE m.property_id = ?1 AND m.sender_id = ?2
                 ORDER BY m.created ASC, m.rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([property_id, sender_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages on listings owned by `owner_id` (every listing when `None`),
    /// newest first.
    pub fn list_inbox(
        &self,
        owner_id: Option<&str>,
        status: Option<&str>,
        page: PageSpec,
    ) -> Result<(Vec<MessageRow>, u64)> {
        self.with_conn(|conn| {
            let mut params: Vec<SqlValue> = Vec::new();
            let mut conditions = Vec::new();
            if let Some(owner) = owner_id {
                let n = bind(&mut params, SqlValue::Text(owner.to_string()));
                conditions.push(format!("p.owner_id = ?{}", n));
            }
            if let Some(status) = status {
                let n = bind(&mut params, SqlValue::Text(status.to_string()));
                conditions.push(format!("m.status = ?{}", n));
            }
            let filter = where_clause(&conditions);
            let from = "FROM property_messages m JOIN properties p ON p.id = m.property_id";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {} {}", from, filter),
                params_from_iter(params.iter()),
                |r| r.get(0),
            )?;

            let limit = bind(&mut params, SqlValue::Integer(page.limit() as i64));
            let offset = bind(&mut params, SqlValue::Integer(page.offset() as i64));
            let sql = format!(
                "SELECT {} {} {} ORDER BY m.created DESC, m.rowid DESC LIMIT ?{} OFFSET ?{}",
                MESSAGE_COLUMNS, from, filter, limit, offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total as u64))
        })
    }

    /// Apply `change` to a message under the write lock. `change` edits the
    /// row in place and returns false to refuse; refused rows are not written.
    pub fn update_message<F>(&self, id: &str, change: F) -> Result<TransitionOutcome>
    where
        F: FnOnce(&mut MessageRow) -> bool,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(original) = query_message(&tx, id)? else {
                return Ok(TransitionOutcome::NotFound);
            };

            let mut row = original.clone();
            if !change(&mut row) {
                return Ok(TransitionOutcome::Rejected(original));
            }
            row.updated = next_ts(&original.updated);

            tx.execute(
                "UPDATE property_messages
                 SET status = ?2, reply = ?3, replied_by = ?4, replied_at = ?5, updated = ?6
                 WHERE id = ?1",
                params![row.id, row.status, row.reply, row.replied_by, row.replied_at, row.updated],
            )?;
            tx.commit()?;
            Ok(TransitionOutcome::Updated(row))
        })
    }

    pub fn count_unread_messages(&self, owner_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM property_messages m
                 JOIN properties p ON p.id = m.property_id
                 WHERE p.owner_id = ?1 AND m.status = 'new'",
                [owner_id],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }

    pub fn count_favorites(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {}", VISIBLE_FAVORITES),
                [user_id],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }
}

/// A timestamp strictly after `prev`, so every write changes the
/// concurrency token even within one millisecond.
fn next_ts(prev: &str) -> String {
    let now = now_ts();
    if now.as_str() > prev {
        return now;
    }
    match DateTime::parse_from_rfc3339(prev) {
        Ok(t) => (t.with_timezone(&Utc) + Duration::milliseconds(1))
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(_) => now,
    }
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn query_property(conn: &Connection, id: &str) -> Result<Option<PropertyRow>> {
    let sql = format!("SELECT {} FROM properties p WHERE p.id = ?1", PROPERTY_COLUMNS);
    let row = conn.query_row(&sql, [id], property_from_row).optional()?;
    match row {
        Some(mut row) => {
            row.images = query_image_ids(conn, &row.id)?;
            Ok(Some(row))
        }
        None => Ok(None),
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} FROM property_messages m WHERE m.id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, [id], message_from_row).optional()
}

fn query_image_ids(conn: &Connection, property_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM property_images WHERE property_id = ?1 ORDER BY position")?;
    let ids = stmt
        .query_map([property_id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Batch-load image ids for a page of listings.
fn load_images(conn: &Connection, rows: &mut [PropertyRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=rows.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT property_id, id FROM property_images WHERE property_id IN ({}) ORDER BY position",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let pairs = stmt
        .query_map(params_from_iter(ids.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (property_id, image_id) in pairs {
        if let Some(row) = rows.iter_mut().find(|r| r.id == property_id) {
            row.images.push(image_id);
        }
    }
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        avatar: row.get(4)?,
        password: row.get(5)?,
        is_admin: row.get(6)?,
        is_banned: row.get(7)?,
        verified: row.get(8)?,
        created: row.get(9)?,
        updated: row.get(10)?,
    })
}

fn property_from_row(row: &Row<'_>) -> rusqlite::Result<PropertyRow> {
    Ok(PropertyRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        property_type: row.get(3)?,
        listing_type: row.get(4)?,
        status: row.get(5)?,
        address: row.get(6)?,
        city: row.get(7)?,
        state: row.get(8)?,
        country: row.get(9)?,
        latitude: row.get(10)?,
        longitude: row.get(11)?,
        price: row.get(12)?,
        bedrooms: row.get(13)?,
        bathrooms: row.get(14)?,
        square_feet: row.get(15)?,
        owner_id: row.get(16)?,
        agent_id: row.get(17)?,
        images: Vec::new(),
        created: row.get(18)?,
        updated: row.get(19)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        property_id: row.get(1)?,
        sender_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        body: row.get(6)?,
        status: row.get(7)?,
        reply: row.get(8)?,
        replied_by: row.get(9)?,
        replied_at: row.get(10)?,
        created: row.get(11)?,
        updated: row.get(12)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
