use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// One imported reference file, identified by its content hash.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::file_downloads)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FileDownload {
    pub id: Uuid,
    pub program_code: String,
    pub name: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::drug_products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DrugProduct {
    pub id: Uuid,
    pub file_download_id: Uuid,
    pub program_code: String,
    pub drug_code: String,
    pub din: String,
    pub brand_name: String,
    pub product_categorization: Option<String>,
    pub class: Option<String>,
    pub descriptor: Option<String>,
    pub last_update: Option<NaiveDate>,
}
