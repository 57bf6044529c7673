// SQL query constants for repositories

/// SQL fragments for the scheduled_items table
pub mod scheduled_item_queries {
    /// All columns for scheduled_items
    ///
    /// `attachments` is COALESCEd so rows written without attachments decode
    /// as an empty list.
    pub const SELECT_ALL_COLUMNS: &str = r#"id, recipient, subject, body, fire_date, fire_time,
        category, COALESCE(attachments, '[]'::jsonb) as attachments,
        status, created_at, sent_at"#;

    /// Idempotent schema bootstrap
    pub const CREATE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS scheduled_items (
            id UUID PRIMARY KEY,
            recipient TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            fire_date DATE NOT NULL,
            fire_time TEXT NOT NULL,
            category TEXT NOT NULL,
            attachments JSONB,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMPTZ NOT NULL,
            sent_at TIMESTAMPTZ
        )
    "#;

    pub const CREATE_STATUS_INDEX: &str =
        "CREATE INDEX IF NOT EXISTS idx_scheduled_items_status ON scheduled_items (status)";

    /// Only pending rows may be removed, fired rows are kept for reporting
    pub const DELETE_PENDING: &str =
        "DELETE FROM scheduled_items WHERE id = $1 AND status = 'pending'";
}
