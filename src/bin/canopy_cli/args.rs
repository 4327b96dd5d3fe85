//! Command-line surface for `canopy-cli`.

#![deny(clippy::all, clippy::pedantic)]

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "canopy-cli", version, about = "Canopy tree API client", long_about = None)]
pub struct Cli {
    /// API base URL, e.g. <http://127.0.0.1:8080>
    #[arg(long, env = "CANOPY_BASE_URL", default_value = "http://127.0.0.1:8080")]
    pub base_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Node management and paginated tree listing
    Tree(TreeArgs),
}

#[derive(Parser, Debug)]
pub struct TreeArgs {
    #[command(subcommand)]
    pub action: TreeCmd,
}

#[derive(Subcommand, Debug)]
pub enum TreeCmd {
    /// Fetch one page of the forest
    List {
        #[arg(long)]
        page: Option<u64>,
        #[arg(long = "page-size")]
        page_size: Option<u64>,
    },
    /// Create a node
    Create {
        #[arg(long)]
        label: String,
        #[arg(long = "parent-id")]
        parent_id: Option<i64>,
    },
    /// Replace a node's label and parent
    Update {
        id: i64,
        #[arg(long)]
        label: String,
        #[arg(long = "parent-id")]
        parent_id: Option<i64>,
    },
    /// Delete a node and its subtree
    Delete { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_with_paging() {
        let cli = Cli::parse_from([
            "canopy-cli",
            "--base-url",
            "http://localhost:9000",
            "tree",
            "list",
            "--page",
            "2",
            "--page-size",
            "25",
        ]);

        assert_eq!(cli.base_url, "http://localhost:9000");
        let Commands::Tree(tree) = cli.command;
        match tree.action {
            TreeCmd::List { page, page_size } => {
                assert_eq!(page, Some(2));
                assert_eq!(page_size, Some(25));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_update_with_positional_id() {
        let cli = Cli::parse_from([
            "canopy-cli",
            "tree",
            "update",
            "7",
            "--label",
            "renamed",
            "--parent-id",
            "3",
        ]);

        let Commands::Tree(tree) = cli.command;
        match tree.action {
            TreeCmd::Update {
                id,
                label,
                parent_id,
            } => {
                assert_eq!(id, 7);
                assert_eq!(label, "renamed");
                assert_eq!(parent_id, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn create_requires_label() {
        let result = Cli::try_parse_from(["canopy-cli", "tree", "create"]);
        assert!(result.is_err());
    }
}
