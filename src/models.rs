use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

pub const ACCOUNT_TYPE_FREE: &str = "free";
pub const ACCOUNT_TYPE_PAID: &str = "paid";

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub account_type: String,
    pub stripe_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub last_invoice: Option<String>,
    pub payment_status: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub account_type: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = folders)]
#[diesel(belongs_to(User))]
pub struct Folder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = folders)]
pub struct NewFolder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = uploads)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Folder, foreign_key = folder_id))]
pub struct Upload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub transcript: String,
    pub folder_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = uploads)]
pub struct NewUpload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub transcript: String,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = flashcard_sessions)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Upload, foreign_key = upload_id))]
pub struct FlashcardSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub cards: serde_json::Value,
    pub folder_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = flashcard_sessions)]
pub struct NewFlashcardSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub cards: serde_json::Value,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = multiple_choice_quizzes)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Upload, foreign_key = upload_id))]
pub struct MultipleChoiceQuiz {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub questions: serde_json::Value,
    pub folder_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = multiple_choice_quizzes)]
pub struct NewMultipleChoiceQuiz {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub questions: serde_json::Value,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = summaries)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Upload, foreign_key = upload_id))]
pub struct Summary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub body: String,
    pub folder_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = summaries)]
pub struct NewSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub body: String,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = ai_chats)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Upload, foreign_key = upload_id))]
pub struct AiChat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub messages: serde_json::Value,
    pub folder_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ai_chats)]
pub struct NewAiChat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub name: String,
    pub messages: serde_json::Value,
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = notion_authorizations)]
#[diesel(belongs_to(User))]
pub struct NotionAuthorization {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token: String,
    pub workspace_id: String,
    pub workspace_name: Option<String>,
    pub bot_id: Option<String>,
    pub owner: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notion_authorizations)]
pub struct NewNotionAuthorization {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token: String,
    pub workspace_id: String,
    pub workspace_name: Option<String>,
    pub bot_id: Option<String>,
    pub owner: serde_json::Value,
}
