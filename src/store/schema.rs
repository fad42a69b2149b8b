//! Table and column names of the `emails` table.

/// Table name
pub const TABLE: &str = "emails";
/// Sender domain column
pub const FROM_HOST: &str = "from_host";
/// ISO-8601 message date column
pub const DATE: &str = "date";
/// Sender address column
pub const FROM_EMAIL: &str = "from_email";
/// Subject column
pub const SUBJECT: &str = "subject";
/// Nullable link to a receipt, set outside this tool
pub const RECEIPT_ID: &str = "receipt_id";

/// DDL for a fresh store. The pipeline itself never runs this; see
/// [`super::Store::create`].
pub const CREATE_EMAILS: &str = "
CREATE TABLE IF NOT EXISTS emails (
    id          INTEGER PRIMARY KEY,
    from_host   TEXT NOT NULL,
    date        TEXT NOT NULL,
    from_email  TEXT NOT NULL,
    subject     TEXT NOT NULL,
    receipt_id  INTEGER,
    UNIQUE (date, from_email, subject)
);
";
