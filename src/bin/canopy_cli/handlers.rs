#![deny(clippy::all, clippy::pedantic)]

use canopy::application::pagination::PaginatedTree;
use canopy::infra::http::models::{NodeRequest, NodeResponse};
use reqwest::Method;

use crate::args::TreeCmd;
use crate::client::{CliError, Ctx};
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, cmd: TreeCmd) -> Result<(), CliError> {
    match cmd {
        TreeCmd::List { page, page_size } => {
            let tree = list(ctx, page, page_size).await?;
            print_json(&tree)
        }
        TreeCmd::Create { label, parent_id } => {
            let node = create(ctx, label, parent_id).await?;
            print_json(&node)
        }
        TreeCmd::Update {
            id,
            label,
            parent_id,
        } => {
            let node = update(ctx, id, label, parent_id).await?;
            print_json(&node)
        }
        TreeCmd::Delete { id } => {
            delete(ctx, id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

async fn list(
    ctx: &Ctx,
    page: Option<u64>,
    page_size: Option<u64>,
) -> Result<PaginatedTree, CliError> {
    let query: Vec<(&str, String)> = [("page", page), ("pageSize", page_size)]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value.to_string())))
        .collect();
    ctx.get("tree", &query).await
}

async fn create(
    ctx: &Ctx,
    label: String,
    parent_id: Option<i64>,
) -> Result<NodeResponse, CliError> {
    let body = NodeRequest { label, parent_id };
    ctx.send(Method::POST, "tree", &body).await
}

async fn update(
    ctx: &Ctx,
    id: i64,
    label: String,
    parent_id: Option<i64>,
) -> Result<NodeResponse, CliError> {
    let body = NodeRequest { label, parent_id };
    ctx.send(Method::PUT, &format!("tree/{id}"), &body).await
}

async fn delete(ctx: &Ctx, id: i64) -> Result<(), CliError> {
    ctx.delete(&format!("tree/{id}")).await
}
