//! Read-only lookups over the `pets` table.

use crate::models::pet::Pet;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PetRepository {
    db: Arc<SqlitePool>,
}

impl PetRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Return the subset of `ids` that exist and belong to `owner`.
    ///
    /// This is the ownership filter applied when associating pets with a
    /// post: ids failing the check are simply absent from the result.
    pub async fn find_owned(&self, ids: &[Uuid], owner: Uuid) -> sqlx::Result<Vec<Pet>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, owner_id FROM pets WHERE owner_id = ",
        );
        builder.push_bind(owner);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        builder.build_query_as().fetch_all(&*self.db).await
    }
}
