//! Owner-scoped access to the study collections.
//!
//! Every query in this module filters on `(id, user_id)` together, so a
//! row that exists but belongs to someone else is indistinguishable from
//! one that does not exist. Handlers above this layer never add their own
//! ownership checks.

use diesel::prelude::*;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AiChat, FlashcardSession, MultipleChoiceQuiz, Summary, Upload};
use crate::state::DbConnection;

/// Folder filter for list endpoints: everything, only unfiled rows, or a
/// single folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderScope {
    Any,
    Root,
    In(Uuid),
}

pub trait OwnedCollection: Sized {
    const RESOURCE: &'static str;

    fn list(conn: &mut DbConnection, owner: Uuid, scope: FolderScope) -> Result<Vec<Self>, AppError>;
    fn find(conn: &mut DbConnection, owner: Uuid, id: Uuid) -> Result<Self, AppError>;
    fn rename(conn: &mut DbConnection, owner: Uuid, id: Uuid, new_name: &str) -> Result<Self, AppError>;
    fn move_to_folder(
        conn: &mut DbConnection,
        owner: Uuid,
        id: Uuid,
        folder: Option<Uuid>,
    ) -> Result<Self, AppError>;
    fn delete(conn: &mut DbConnection, owner: Uuid, id: Uuid) -> Result<(), AppError>;
}

macro_rules! owned_collection {
    ($row:ty, $table:ident, $name_col:ident, $resource:literal) => {
        impl OwnedCollection for $row {
            const RESOURCE: &'static str = $resource;

            fn list(
                conn: &mut DbConnection,
                owner: Uuid,
                scope: FolderScope,
            ) -> Result<Vec<Self>, AppError> {
                use crate::schema::$table::dsl;
                let query = dsl::$table
                    .filter(dsl::user_id.eq(owner))
                    .order(dsl::created_at.desc())
                    .into_boxed();
                let query = match scope {
                    FolderScope::Any => query,
                    FolderScope::Root => query.filter(dsl::folder_id.is_null()),
                    FolderScope::In(folder) => query.filter(dsl::folder_id.eq(folder)),
                };
                Ok(query.load::<$row>(conn)?)
            }

            fn find(conn: &mut DbConnection, owner: Uuid, id: Uuid) -> Result<Self, AppError> {
                use crate::schema::$table::dsl;
                dsl::$table
                    .filter(dsl::id.eq(id))
                    .filter(dsl::user_id.eq(owner))
                    .first::<$row>(conn)
                    .optional()?
                    .ok_or_else(|| AppError::not_found(concat!($resource, " not found")))
            }

            fn rename(
                conn: &mut DbConnection,
                owner: Uuid,
                id: Uuid,
                new_name: &str,
            ) -> Result<Self, AppError> {
                use crate::schema::$table::dsl;
                diesel::update(dsl::$table.filter(dsl::id.eq(id)).filter(dsl::user_id.eq(owner)))
                    .set(dsl::$name_col.eq(new_name))
                    .get_result::<$row>(conn)
                    .optional()?
                    .ok_or_else(|| AppError::not_found(concat!($resource, " not found")))
            }

            fn move_to_folder(
                conn: &mut DbConnection,
                owner: Uuid,
                id: Uuid,
                folder: Option<Uuid>,
            ) -> Result<Self, AppError> {
                use crate::schema::$table::dsl;
                diesel::update(dsl::$table.filter(dsl::id.eq(id)).filter(dsl::user_id.eq(owner)))
                    .set(dsl::folder_id.eq(folder))
                    .get_result::<$row>(conn)
                    .optional()?
                    .ok_or_else(|| AppError::not_found(concat!($resource, " not found")))
            }

            fn delete(conn: &mut DbConnection, owner: Uuid, id: Uuid) -> Result<(), AppError> {
                use crate::schema::$table::dsl;
                let affected = diesel::delete(
                    dsl::$table.filter(dsl::id.eq(id)).filter(dsl::user_id.eq(owner)),
                )
                .execute(conn)?;
                if affected == 0 {
                    return Err(AppError::not_found(concat!($resource, " not found")));
                }
                Ok(())
            }
        }
    };
}

owned_collection!(FlashcardSession, flashcard_sessions, name, "flashcard session");
owned_collection!(MultipleChoiceQuiz, multiple_choice_quizzes, name, "quiz");
owned_collection!(Summary, summaries, name, "summary");
owned_collection!(AiChat, ai_chats, name, "chat");
owned_collection!(Upload, uploads, title, "upload");

/// Confirms a folder exists and belongs to `owner` before anything is
/// filed into it.
pub fn ensure_folder_owned(conn: &mut DbConnection, owner: Uuid, folder: Uuid) -> Result<(), AppError> {
    use crate::schema::folders::dsl;
    dsl::folders
        .filter(dsl::id.eq(folder))
        .filter(dsl::user_id.eq(owner))
        .select(dsl::id)
        .first::<Uuid>(conn)
        .optional()?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("folder not found"))
}
