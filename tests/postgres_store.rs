use std::collections::HashSet;
use std::sync::Arc;

use sqlx::PgPool;

use canopy::application::pagination::PageRequest;
use canopy::application::repos::{NodesRepo, RepoError};
use canopy::application::tree::{NodeCommand, TreeService};
use canopy::cache::{DisabledTreeCache, TreeCache};
use canopy::domain::nodes::NodeLabel;
use canopy::infra::db::PgNodeStore;

fn label(value: &str) -> NodeLabel {
    NodeLabel::parse(value).expect("valid label")
}

#[sqlx::test(migrations = "./migrations")]
async fn parent_index_exists(pool: PgPool) {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' AND tablename = 'nodes'",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch node indexes");

    let indexes: HashSet<String> = rows.into_iter().collect();
    assert!(
        indexes.contains("nodes_parent_id_idx"),
        "missing nodes_parent_id_idx"
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn create_and_get_round_trip(pool: PgPool) {
    let repo = PgNodeStore::new(pool);

    let root = repo.create_node(&label("root"), None).await.expect("root");
    let child = repo
        .create_node(&label("child"), Some(root))
        .await
        .expect("child");

    let node = repo.get_node(child).await.expect("get child");
    assert_eq!(node.label, "child");
    assert_eq!(node.parent_id, Some(root));

    let err = repo.get_node(child + 1000).await.expect_err("absent");
    assert!(matches!(err, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
async fn create_with_missing_parent_fails(pool: PgPool) {
    let repo = PgNodeStore::new(pool);

    let err = repo
        .create_node(&label("stray"), Some(9_999))
        .await
        .expect_err("missing parent");
    assert!(matches!(err, RepoError::ParentNotFound { parent_id: 9_999 }));
}

#[sqlx::test(migrations = "./migrations")]
async fn list_page_slices_by_id_and_counts_everything(pool: PgPool) {
    let repo = PgNodeStore::new(pool);
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            repo.create_node(&label(&format!("n{i}")), None)
                .await
                .expect("create"),
        );
    }

    let page = repo
        .list_page(PageRequest::new(2, 2).expect("page"))
        .await
        .expect("list");
    assert_eq!(page.total, 5);
    let got: Vec<i64> = page.rows.iter().map(|node| node.id).collect();
    assert_eq!(got, ids[2..4].to_vec());

    let beyond = repo
        .list_page(PageRequest::new(10, 2).expect("page"))
        .await
        .expect("list");
    assert!(beyond.rows.is_empty());
    assert_eq!(beyond.total, 5);
}

#[sqlx::test(migrations = "./migrations")]
async fn update_checks_node_parent_and_cycles(pool: PgPool) {
    let repo = PgNodeStore::new(pool);
    let a = repo.create_node(&label("a"), None).await.expect("a");
    let b = repo.create_node(&label("b"), Some(a)).await.expect("b");
    let c = repo.create_node(&label("c"), Some(b)).await.expect("c");

    let moved = repo
        .update_node(c, &label("c2"), Some(a))
        .await
        .expect("move c under a");
    assert_eq!(moved.label, "c2");
    assert_eq!(moved.parent_id, Some(a));

    let err = repo
        .update_node(a, &label("a"), Some(b))
        .await
        .expect_err("cycle");
    assert!(matches!(err, RepoError::InvalidInput { .. }));

    let err = repo
        .update_node(a, &label("a"), Some(a))
        .await
        .expect_err("self parent");
    assert!(matches!(err, RepoError::InvalidInput { .. }));

    let err = repo
        .update_node(a, &label("a"), Some(9_999))
        .await
        .expect_err("missing parent");
    assert!(matches!(err, RepoError::ParentNotFound { .. }));

    let err = repo
        .update_node(9_999, &label("x"), None)
        .await
        .expect_err("missing node");
    assert!(matches!(err, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_removes_whole_subtree(pool: PgPool) {
    let repo = PgNodeStore::new(pool);
    let a = repo.create_node(&label("a"), None).await.expect("a");
    let b = repo.create_node(&label("b"), Some(a)).await.expect("b");
    let c = repo.create_node(&label("c"), Some(b)).await.expect("c");
    let other = repo.create_node(&label("other"), None).await.expect("other");

    let removed = repo.delete_node(a).await.expect("delete");
    assert_eq!(removed, 3);

    assert!(matches!(repo.get_node(c).await, Err(RepoError::NotFound)));
    assert!(repo.get_node(other).await.is_ok());

    let err = repo.delete_node(a).await.expect_err("already gone");
    assert!(matches!(err, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
async fn service_end_to_end_over_postgres(pool: PgPool) {
    let repo = Arc::new(PgNodeStore::new(pool));
    repo.health_check().await.expect("ping");
    let tree = TreeService::new(repo, TreeCache::new(Arc::new(DisabledTreeCache)));

    let root = tree
        .create_node(NodeCommand {
            label: "root".into(),
            parent_id: None,
        })
        .await
        .expect("root");
    let child = tree
        .create_node(NodeCommand {
            label: "child".into(),
            parent_id: Some(root.id),
        })
        .await
        .expect("child");

    let page = tree.list_page(PageRequest::default()).await.expect("list");
    assert_eq!(page.pagination.total, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, root.id);
    assert_eq!(page.data[0].children[0].id, child.id);
    assert!(page.data[0].children[0].children.is_empty());
}

async fn has_cycle(pool: &PgPool) -> bool {
    let (cycle,): (bool,) = sqlx::query_as(
        r#"
        WITH RECURSIVE walk AS (
            SELECT id AS start, parent_id, 1 AS depth FROM nodes
            UNION ALL
            SELECT w.start, n.parent_id, w.depth + 1
            FROM walk w
            INNER JOIN nodes n ON n.id = w.parent_id
            WHERE w.depth < 64
        )
        SELECT EXISTS (SELECT 1 FROM walk WHERE parent_id = start)
        "#,
    )
    .fetch_one(pool)
    .await
    .expect("cycle query");
    cycle
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_reparenting_never_commits_a_cycle(pool: PgPool) {
    let repo = PgNodeStore::new(pool.clone());

    for round in 0..20 {
        sqlx::query("DELETE FROM nodes")
            .execute(&pool)
            .await
            .expect("reset");
        let a = repo.create_node(&label("a"), None).await.expect("a");
        let b = repo.create_node(&label("b"), Some(a)).await.expect("b");
        let c = repo.create_node(&label("c"), None).await.expect("c");

        // a -> c and c -> b together would close a -> c -> b -> a.
        let (label_a, label_c) = (label("a"), label("c"));
        let (first, second) = tokio::join!(
            repo.update_node(a, &label_a, Some(c)),
            repo.update_node(c, &label_c, Some(b)),
        );

        assert!(
            first.is_err() || second.is_err(),
            "round {round}: both moves committed"
        );
        for result in [first, second] {
            if let Err(err) = result {
                assert!(matches!(err, RepoError::InvalidInput { .. }), "{err}");
            }
        }
        assert!(!has_cycle(&pool).await, "round {round}: cycle persisted");
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn page_rows_and_total_agree_under_concurrent_inserts(pool: PgPool) {
    let repo = PgNodeStore::new(pool.clone());
    let writer = {
        let repo = repo.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                repo.create_node(&label(&format!("w{i}")), None)
                    .await
                    .expect("insert");
            }
        })
    };

    let request = PageRequest::new(1, 100).expect("page");
    while !writer.is_finished() {
        let page = repo.list_page(request).await.expect("list");
        assert_eq!(page.rows.len() as u64, page.total.min(100));
    }
    writer.await.expect("writer");

    let page = repo.list_page(request).await.expect("list");
    assert_eq!(page.total, 200);
    assert_eq!(page.rows.len(), 100);
}
