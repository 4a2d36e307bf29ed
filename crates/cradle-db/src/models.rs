/// Database row types. These map directly to SQLite rows.
/// Distinct from the cradle-types API models.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub created_at: String,
}

/// A stored document. `fields` is the JSON object text.
pub struct DocumentRow {
    pub collection: String,
    pub id: String,
    pub fields: String,
    pub created_at: String,
    pub updated_at: String,
}
