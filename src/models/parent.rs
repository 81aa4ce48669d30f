use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: Uuid,
    pub display_name: String,
    /// LINE user id linked through the LINE login flow; reminders need it.
    pub line_user_id: Option<String>,
}
