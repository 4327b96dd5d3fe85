use async_trait::async_trait;
use sqlx::FromRow;

use crate::{
    application::pagination::PageRequest,
    application::repos::{NodePage, NodesRepo, RepoError},
    domain::nodes::{Node, NodeId, NodeLabel},
};

use super::PgNodeStore;
use super::errors::row_count;

/// Transaction-scoped advisory lock key shared by every update that sets a parent.
const REPARENT_LOCK_KEY: i64 = 0x6361_6e6f_7079;

#[derive(FromRow)]
struct NodeRow {
    id: i64,
    label: String,
    parent_id: Option<i64>,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            parent_id: row.parent_id,
        }
    }
}

#[async_trait]
impl NodesRepo for PgNodeStore {
    async fn create_node(
        &self,
        label: &NodeLabel,
        parent_id: Option<NodeId>,
    ) -> Result<NodeId, RepoError> {
        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO nodes (label, parent_id)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(label.as_str())
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok((id,)) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(RepoError::ParentNotFound {
                    parent_id: parent_id.unwrap_or_default(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_node(&self, id: NodeId) -> Result<Node, RepoError> {
        let row: NodeRow = sqlx::query_as(
            r#"
            SELECT id, label, parent_id
            FROM nodes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_page(&self, request: PageRequest) -> Result<NodePage, RepoError> {
        let offset = i64::try_from(request.offset())
            .map_err(|_| RepoError::invalid_input("page offset exceeds supported range"))?;

        // Rows and total come from one snapshot so they always agree.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, label, parent_id
            FROM nodes
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(request.page_size()))
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(NodePage {
            rows: rows.into_iter().map(Node::from).collect(),
            total: row_count(total)?,
        })
    }

    async fn update_node(
        &self,
        id: NodeId,
        label: &NodeLabel,
        parent_id: Option<NodeId>,
    ) -> Result<Node, RepoError> {
        let mut tx = self.pool.begin().await?;

        // Re-parentings are serialized so two moves cannot each pass the
        // ancestor check and together close a cycle.
        if parent_id.is_some() {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(REPARENT_LOCK_KEY)
                .execute(&mut *tx)
                .await?;
        }

        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM nodes WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }

        if let Some(parent_id) = parent_id {
            let parent: Option<(i64,)> = sqlx::query_as("SELECT id FROM nodes WHERE id = $1")
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?;
            if parent.is_none() {
                return Err(RepoError::ParentNotFound { parent_id });
            }

            // The candidate parent's ancestor chain must not contain the node itself.
            let (cycle,): (bool,) = sqlx::query_as(
                r#"
                WITH RECURSIVE ancestors AS (
                    SELECT id, parent_id FROM nodes WHERE id = $1
                    UNION
                    SELECT n.id, n.parent_id
                    FROM nodes n
                    INNER JOIN ancestors a ON n.id = a.parent_id
                )
                SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)
                "#,
            )
            .bind(parent_id)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if cycle {
                return Err(RepoError::invalid_input(format!(
                    "moving node {id} under {parent_id} would create a cycle"
                )));
            }
        }

        let row: NodeRow = sqlx::query_as(
            r#"
            UPDATE nodes
            SET label = $2, parent_id = $3
            WHERE id = $1
            RETURNING id, label, parent_id
            "#,
        )
        .bind(id)
        .bind(label.as_str())
        .bind(parent_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete_node(&self, id: NodeId) -> Result<u64, RepoError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM nodes WHERE id = $1
                UNION
                SELECT n.id
                FROM nodes n
                INNER JOIN subtree s ON n.parent_id = s.id
            )
            DELETE FROM nodes
            WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Err(RepoError::NotFound);
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
