/// Database row types. These map directly to SQLite rows and stay distinct
/// from the `estate-types` API models so the DB layer holds plain strings.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub password: String,
    pub is_admin: bool,
    pub is_banned: bool,
    pub verified: bool,
    pub created: String,
    pub updated: String,
}

#[derive(Debug, Clone)]
pub struct PropertyRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub property_type: String,
    pub listing_type: String,
    pub status: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: i64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub square_feet: i64,
    pub owner_id: String,
    pub agent_id: Option<String>,
    /// Image ids in display order. Loaded from `property_images`.
    pub images: Vec<String>,
    pub created: String,
    pub updated: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub property_id: String,
    pub sender_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub body: String,
    pub status: String,
    pub reply: Option<String>,
    pub replied_by: Option<String>,
    pub replied_at: Option<String>,
    pub created: String,
    pub updated: String,
}

#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: String,
    pub property_id: String,
    pub size: i64,
}
