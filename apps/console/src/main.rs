use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CollectionSnapshot, HttpBackend, ListController, NoticeKind, QueryState, StaticCredential,
    SyncError,
};
use shared::{
    domain::{NewResource, Resource, ResourceKind, ServiceLevel},
    protocol::{ApiRoutes, Filter, PageSize},
};
use tracing::info;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(about = "Browse and edit the asset inventory from a terminal")]
struct Cli {
    /// Resource kind: brand, masterdomain, iprange, domain or ip.
    #[arg(long, short)]
    kind: ResourceKind,
    /// Bearer token; overrides MAGELLAN_TOKEN and the settings file.
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show one page of the collection.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        filter: Option<Filter>,
        /// Sort field; repeat the same field to flip the order.
        #[arg(long)]
        sort: Vec<String>,
    },
    Create {
        identity: String,
        /// 1 = Gold, 2 = Silver, anything else Bronze.
        #[arg(long, default_value_t = 3)]
        service_level: u8,
        #[arg(long)]
        in_scope: bool,
        #[arg(long)]
        reviewed: bool,
        /// Block the new domain or IP right after creating it.
        #[arg(long)]
        blocked: bool,
    },
    /// Replace a record with the JSON object in FILE.
    Update { file: PathBuf },
    Delete {
        id: String,
        /// The record is currently blocked and must be unblocked first.
        #[arg(long)]
        blocked: bool,
    },
    Block {
        id: String,
        #[arg(long)]
        unblock: bool,
    },
    Reinject { id: String },
    /// Import the JSON array in FILE.
    Import { file: PathBuf },
    Ventilate,
    /// Write the whole collection to OUTPUT (default `<kind>s.json`).
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();
    let settings = load_settings();
    let controller = build_controller(&cli, &settings)?;

    let outcome = run(&controller, cli.command).await;
    // Every pending notice, oldest first.
    let mut notices = Vec::new();
    for kind in [NoticeKind::Success, NoticeKind::Error] {
        notices.extend(controller.pending_notice(kind).await);
    }
    notices.sort_by_key(|notice| notice.raised_at);
    for notice in notices {
        println!("{}", notice.message);
    }
    if let Err(err) = &outcome {
        if is_auth_failure(err) {
            eprintln!("The token was rejected; pass --token or set MAGELLAN_TOKEN.");
        }
    }
    outcome
}

fn build_controller(cli: &Cli, settings: &Settings) -> Result<Arc<ListController>> {
    let token = cli
        .token
        .clone()
        .or_else(|| settings.token.clone())
        .unwrap_or_default();
    let routes = ApiRoutes::new(settings.api_base_url()?)?;
    info!(kind = %cli.kind, base = %routes.base(), "connecting to inventory api");
    Ok(ListController::new(
        cli.kind,
        Arc::new(HttpBackend::new(routes)),
        Arc::new(StaticCredential::new(token)),
        settings.list_options(),
    ))
}

async fn run(controller: &ListController, command: Command) -> Result<()> {
    let kind = controller.kind();
    match command {
        Command::List {
            page,
            page_size,
            search,
            filter,
            sort,
        } => {
            let preset = preset_query(kind, page_size, filter, search, &sort)?;
            controller.mount_with(preset).await?;
            // Mount lands on page 1 whenever the first count yields several pages.
            controller.set_page_index(page).await?;
            let query = controller.query().await;
            print!(
                "{}",
                render_page(kind, &query, &controller.snapshot().await)
            );
        }
        Command::Create {
            identity,
            service_level,
            in_scope,
            reviewed,
            blocked,
        } => {
            let payload = if kind.is_scannable() {
                NewResource::Scannable {
                    identity,
                    service_level: ServiceLevel::from(service_level),
                    in_scope,
                    reviewed,
                }
            } else {
                NewResource::NonScannable {
                    identity,
                    block_after_create: blocked,
                }
            };
            controller.create(payload).await?;
        }
        Command::Update { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let resource: Resource = serde_json::from_str(&raw)
                .with_context(|| {
                    format!(
                        "{} is not a {} record",
                        file.display(),
                        kind.descriptor().display_name
                    )
                })?;
            controller.update(resource).await?;
        }
        Command::Delete { id, blocked } => {
            let resource = Resource::new(id).with_attribute("blocked", blocked);
            controller.delete(&resource).await?;
        }
        Command::Block { id, unblock } => {
            let resource = Resource::new(id).with_attribute("blocked", unblock);
            controller.toggle_block(&resource).await?;
        }
        Command::Reinject { id } => {
            controller.reinject(&Resource::new(id)).await?;
        }
        Command::Import { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let records: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            controller.import(records).await?;
        }
        Command::Ventilate => {
            controller.ventilate().await?;
        }
        Command::Export { output } => {
            let items = controller.export().await?;
            let path = output.unwrap_or_else(|| default_export_path(kind));
            fs::write(&path, serde_json::to_vec_pretty(&items)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), count = items.len(), "export written");
        }
    }
    Ok(())
}

fn default_export_path(kind: ResourceKind) -> PathBuf {
    PathBuf::from(format!("{}.json", kind.descriptor().plural))
}

/// Query dimensions for `list`, applied before mount so that mounting issues
/// the only recount.
fn preset_query(
    kind: ResourceKind,
    page_size: u32,
    filter: Option<Filter>,
    search: Option<String>,
    sort: &[String],
) -> Result<QueryState> {
    let mut query = QueryState::new(kind);
    query.set_page_size(PageSize::try_from(page_size).map_err(|e| anyhow!(e))?);
    if let Some(filter) = filter {
        query.set_filter(filter)?;
    }
    if let Some(search) = search {
        query.set_search(search);
    }
    for field in sort {
        query.set_sort(field)?;
    }
    Ok(query)
}

fn render_page(kind: ResourceKind, query: &QueryState, snapshot: &CollectionSnapshot) -> String {
    let descriptor = kind.descriptor();
    let mut out = format!(
        "{} {} ({} total), page {}/{}",
        snapshot.items.len(),
        descriptor.plural,
        snapshot.total_count,
        query.page_index(),
        snapshot.page_count
    );
    if query.filter() != Filter::All {
        out.push_str(&format!(", filter: {}", query.filter().label()));
    }
    if !query.search().is_empty() {
        out.push_str(&format!(", search: {}", query.search()));
    }
    out.push('\n');
    if snapshot.items.is_empty() {
        out.push_str(&format!("no {} found\n", descriptor.display_name));
    }
    for item in &snapshot.items {
        out.push_str(&render_row(kind, item));
        out.push('\n');
    }
    out
}

fn render_row(kind: ResourceKind, item: &Resource) -> String {
    let mut row = item.identity(kind).to_string();
    if kind.is_scannable() {
        let level = item.service_level().unwrap_or(ServiceLevel::Bronze);
        row.push_str(&format!("\t{level}"));
        if kind == ResourceKind::MasterDomain {
            let scope = if item.in_scope() { "in scope" } else { "out of scope" };
            let review = if item.reviewed() { "reviewed" } else { "to review" };
            row.push_str(&format!("\t{scope}\t{review}"));
        }
        match item.last_scan_date() {
            Some(date) => row.push_str(&format!("\t{}", date.format("%Y-%m-%d %H:%M"))),
            None => row.push_str("\tnever scanned"),
        }
    } else if item.blocked() {
        row.push_str("\tblocked");
    }
    row
}

fn is_auth_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SyncError>().is_some_and(SyncError::is_auth)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
