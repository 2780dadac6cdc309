//! tagtree command line.
//!
//! Administers a PostgreSQL backed tag tree: schema migration, lookups and
//! the tree-restructuring operations (move, copy, merge, convert, delete).

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagtree_core::{TagsConfig, TagsService};
use tagtree_db::{migrate, DbConfig, PgTagGateway};
use tagtree_model::{CreateStruct, Page, SynonymCreateStruct, Translations};

#[derive(Parser)]
#[command(name = "tagtree", author, version, about, long_about = None)]
struct Cli {
    /// Restrict displayed keywords to these languages (comma separated).
    #[arg(long, global = true, value_delimiter = ',')]
    languages: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the database schema
    Migrate,
    /// Show one tag by id, remote id or URL
    Show {
        id: Option<i64>,
        #[arg(long, conflicts_with = "id")]
        remote_id: Option<String>,
        #[arg(long, conflicts_with_all = ["id", "remote_id"])]
        url: Option<String>,
    },
    /// Print the tree below a tag (0 for the whole tree)
    Tree {
        #[arg(default_value_t = 0)]
        id: i64,
    },
    /// List direct children of a tag
    Children {
        id: i64,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        limit: i64,
    },
    /// List synonyms of a tag
    Synonyms {
        id: i64,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        limit: i64,
    },
    /// Search tags by keyword prefix
    Search {
        prefix: String,
        #[arg(long, default_value = "eng-GB")]
        language: String,
    },
    /// Create a tag
    Create {
        keyword: String,
        #[arg(long, default_value_t = 0)]
        parent: i64,
        #[arg(long, default_value = "eng-GB")]
        language: String,
        #[arg(long)]
        remote_id: Option<String>,
        #[arg(long)]
        always_available: bool,
    },
    /// Add a synonym to a main tag
    AddSynonym {
        main_tag: i64,
        keyword: String,
        #[arg(long, default_value = "eng-GB")]
        language: String,
    },
    /// Move a subtree below another tag (0 for the root)
    Move { id: i64, destination: i64 },
    /// Copy a subtree below another tag (0 for the root)
    Copy { id: i64, destination: i64 },
    /// Merge a tag into a target tag
    Merge { id: i64, target: i64 },
    /// Convert a tag into a synonym of a main tag
    Convert { id: i64, main_tag: i64 },
    /// Delete a tag, its subtree and its synonyms
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagtree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let db_config = DbConfig::from_env();
    let pool = db_config
        .connect()
        .await
        .context("failed to connect to the tag database")?;

    if let Commands::Migrate = cli.command {
        migrate(&pool).await?;
        return Ok(());
    }

    let config = TagsConfig::from_env();
    let languages = config.language_registry()?;
    let gateway = Arc::new(PgTagGateway::new(pool, languages.clone()));
    let tags = config.build_service(gateway, languages);

    let translations = if cli.languages.is_empty() {
        Translations::all()
    } else {
        Translations::only(cli.languages.iter(), true)
    };

    run(tags.as_ref(), cli.command, &translations).await
}

async fn run(tags: &dyn TagsService, command: Commands, translations: &Translations) -> Result<()> {
    match command {
        Commands::Migrate => {}
        Commands::Show { id, remote_id, url } => {
            let info = match (id, remote_id, url) {
                (Some(id), _, _) => tags.load_tag_info(id).await?,
                (_, Some(remote_id), _) => tags.load_tag_info_by_remote_id(&remote_id).await?,
                (_, _, Some(url)) => tags.load_tag_info_by_url(&url).await?,
                _ => bail!("pass a tag id, --remote-id or --url"),
            };
            let tag = tags.load(info.id, translations).await?;
            print_json(&tag)?;
        }
        Commands::Tree { id } => print_tree(tags, id, translations).await?,
        Commands::Children { id, offset, limit } => {
            let children = tags
                .load_children(id, Page::new(offset, limit)?, translations)
                .await?;
            let total = tags.get_children_count(id, translations).await?;
            print_json(&json!({ "total": total, "tags": children }))?;
        }
        Commands::Synonyms { id, offset, limit } => {
            let synonyms = tags
                .load_synonyms(id, Page::new(offset, limit)?, translations)
                .await?;
            let total = tags.get_synonym_count(id, translations).await?;
            print_json(&json!({ "total": total, "tags": synonyms }))?;
        }
        Commands::Search { prefix, language } => {
            let result = tags.search_tags(&prefix, &language, true, Page::ALL).await?;
            print_json(&result)?;
        }
        Commands::Create {
            keyword,
            parent,
            language,
            remote_id,
            always_available,
        } => {
            let mut create_struct = CreateStruct::new(parent, language).with_keyword(keyword, None);
            create_struct.always_available = always_available;
            if let Some(remote_id) = remote_id {
                create_struct = create_struct.with_remote_id(remote_id);
            }
            let tag = tags.create(&create_struct).await?;
            info!(tag_id = tag.id, path = %tag.path_string, "Created tag");
            print_json(&tag)?;
        }
        Commands::AddSynonym {
            main_tag,
            keyword,
            language,
        } => {
            let synonym_struct =
                SynonymCreateStruct::new(main_tag, language).with_keyword(keyword, None);
            let synonym = tags.add_synonym(&synonym_struct).await?;
            print_json(&synonym)?;
        }
        Commands::Move { id, destination } => {
            print_json(&tags.move_subtree(id, destination).await?)?;
        }
        Commands::Copy { id, destination } => {
            print_json(&tags.copy_subtree(id, destination).await?)?;
        }
        Commands::Merge { id, target } => {
            tags.merge(id, target).await?;
            info!(tag_id = id, target_id = target, "Merged tag");
        }
        Commands::Convert { id, main_tag } => {
            print_json(&tags.convert_to_synonym(id, main_tag).await?)?;
        }
        Commands::Delete { id } => {
            tags.delete_tag(id).await?;
            info!(tag_id = id, "Deleted tag");
        }
    }
    Ok(())
}

/// Depth-first listing, indented by depth below `root_id`.
async fn print_tree(tags: &dyn TagsService, root_id: i64, translations: &Translations) -> Result<()> {
    let mut stack: Vec<(i64, usize)> = vec![(root_id, 0)];
    while let Some((id, indent)) = stack.pop() {
        if id != 0 {
            let tag = tags.load(id, translations).await?;
            let synonyms = tags.load_synonyms(id, Page::ALL, translations).await?;
            let mut line = format!("{}{} [{}]", "  ".repeat(indent), tag.keyword, tag.id);
            if !synonyms.is_empty() {
                let names: Vec<&str> = synonyms.iter().map(|s| s.keyword.as_str()).collect();
                line.push_str(&format!(" ({})", names.join(", ")));
            }
            println!("{}", line);
        }

        let children = tags.load_children(id, Page::ALL, translations).await?;
        let next_indent = if id == 0 { indent } else { indent + 1 };
        for child in children.iter().rev() {
            stack.push((child.id, next_indent));
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
