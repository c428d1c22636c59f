//! The o2m-runner executable
//!
//! Runs the relational core of the O2M interfaces against a live instance,
//! so that the items an interface would show can be inspected from a shell.

mod logging;

use std::{io::IsTerminal as _, path::PathBuf, process::exit, sync::Arc};

use anyhow::{bail, Context as _, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use o2m_core::{
    change_set::FieldValue,
    interface::{ContentOptions, TableOptions},
    query::{Limit, PreviewQuery, QueryParams},
    relation::{ContentVersion, DeselectAction, ItemId, RelationO2M},
    Item,
};
use o2m_relation::{
    api::{endpoint, Api},
    engine::{RelationInputs, RelationMultiple},
    fetch_all::fetch_all,
    host::HostContext,
};
use o2m_runner::{fetch_server_info, AllowAll, ConsoleNotifications, RestApi, Untranslated};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::FetchAll(sub) => with_runtime(&args.options, fetch_all_command(&args.options, sub)),
        Commands::Display(sub) => with_runtime(&args.options, display_command(&args.options, sub)),
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell.clone(), &mut cmd, "o2m-runner", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Set up logging and run `work` to completion.
fn with_runtime(options: &Options, work: impl std::future::Future<Output = Result<()>>) -> Result<()> {
    let mut logger = logging::set_up(logging::Options {
        verbose: options.verbose,
        color: std::io::stderr().is_terminal(),
    })?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("could not start the async runtime")?;
    let r = runtime.block_on(work);
    logger.tear_down()?;
    r
}

fn connect(options: &Options) -> Result<RestApi> {
    RestApi::new(&options.url, options.token.clone())
}

async fn fetch_all_command(options: &Options, args: &FetchAllArgs) -> Result<()> {
    let api = connect(options)?;
    let server = fetch_server_info(&api).await?;
    let params = QueryParams {
        fields: (!args.fields.is_empty()).then(|| args.fields.clone()),
        filter: args.filter.as_deref().map(parse_json).transpose()?,
        search: args.search.clone(),
        sort: (!args.sort.is_empty()).then(|| args.sort.clone()),
        ..Default::default()
    };
    let items: Vec<Item> = fetch_all(
        &api,
        &server,
        &endpoint(&args.collection),
        &params,
        args.max_items,
    )
    .await?;
    print_json(&items)
}

async fn display_command(options: &Options, args: &DisplayArgs) -> Result<()> {
    let api = Arc::new(connect(options)?);
    let server = fetch_server_info(api.as_ref()).await?;
    let notifications = Arc::new(ConsoleNotifications::default());
    let host = HostContext {
        api: api as Arc<dyn Api>,
        server,
        permissions: Arc::new(AllowAll),
        notifications: notifications.clone(),
        messages: Arc::new(Untranslated),
    };

    let mut relation = RelationO2M::new(
        args.collection.as_str(),
        args.pk_field.as_str(),
        args.reverse_field.as_str(),
    );
    if let Some(sort_field) = &args.sort_field {
        relation = relation.with_sort_field(sort_field.as_str());
    }
    if args.delete_on_deselect {
        relation = relation.with_deselect_action(DeselectAction::Delete);
    }

    let engine = RelationMultiple::new(
        host,
        RelationInputs {
            value: match &args.changes {
                Some(path) => read_json_file::<FieldValue>(path)?,
                None => FieldValue::Absent,
            },
            query: preview_query(args)?,
            relation: relation.into(),
            item_id: args.item_id.clone(),
            version: args.version.as_ref().map(|key| ContentVersion {
                key: key.clone(),
                name: None,
            }),
        },
    );
    engine.flush().await;

    let errors = notifications.errors();
    if !errors.is_empty() {
        bail!("{} request(s) failed, first error: {}", errors.len(), errors[0].error);
    }

    print_json(&json!({
        "items": engine.display_items(),
        "totalItemCount": engine.total_item_count(),
        "existingItemCount": engine.existing_item_count(),
        "value": engine.value_json(),
        "permissions": engine.permissions(),
    }))
}

/// The preview query from the interface options, if given, with the command
/// line taking precedence.
fn preview_query(args: &DisplayArgs) -> Result<PreviewQuery> {
    let limit = Limit::from(args.limit);
    let mut query = if let Some(path) = &args.table_options {
        read_json_file::<TableOptions>(path)?.preview_query(args.page, limit)
    } else if let Some(path) = &args.content_options {
        read_json_file::<ContentOptions>(path)?.preview_query(args.page, limit)
    } else {
        PreviewQuery::new(args.page, limit)
    };
    if !args.fields.is_empty() {
        query.fields = args.fields.clone();
    }
    if !args.sort.is_empty() {
        query.sort = Some(args.sort.clone());
    }
    if let Some(search) = &args.search {
        query.search = Some(search.clone());
    }
    if let Some(filter) = &args.filter {
        query.filter = Some(parse_json(filter)?);
    }
    Ok(query)
}

fn parse_json(s: &str) -> Result<Value> {
    serde_json::from_str(s).with_context(|| format!("invalid JSON: {}", s))
}

fn read_json_file<T: DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("could not parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("o2m-runner error: {:#}", e);
            exit(1);
        }
    }
}

/// Inspect O2M fields of a running instance
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Parser, Debug, Clone)]
struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Base URL of the instance
    #[arg(long, global = true, env = "O2M_URL", default_value = "http://localhost:8055")]
    url: String,

    /// Static access token
    #[arg(long, global = true, env = "O2M_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Parser, Debug)]
struct FetchAllArgs {
    /// The collection to read
    #[arg(long)]
    collection: String,

    /// Fields to return, comma separated
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Filter, in JSON
    #[arg(long)]
    filter: Option<String>,

    #[arg(long)]
    search: Option<String>,

    /// Sort fields, comma separated; prefix with `-` to sort descending
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    sort: Vec<String>,

    /// Stop after this many items
    #[arg(long)]
    max_items: Option<usize>,
}

#[derive(Parser, Debug)]
struct DisplayArgs {
    /// The related collection
    #[arg(long)]
    collection: String,

    /// Primary key field of the related collection
    #[arg(long, default_value = "id")]
    pk_field: String,

    /// Field of the related collection that points back to the record
    #[arg(long)]
    reverse_field: String,

    /// Manual sort field of the related collection
    #[arg(long)]
    sort_field: Option<String>,

    /// Removing an item from the relation deletes it, rather than unlinking it
    #[arg(long)]
    delete_on_deselect: bool,

    /// Primary key of the record; `+` for a record that was not saved yet
    #[arg(long)]
    item_id: ItemId,

    /// Pending changes of the field, a JSON file
    #[arg(long)]
    changes: Option<PathBuf>,

    /// Key of the content version being edited
    #[arg(long)]
    version: Option<String>,

    /// Options of an o2m-table interface, a JSON file
    #[arg(long, conflicts_with = "content_options")]
    table_options: Option<PathBuf>,

    /// Options of an o2m-content interface, a JSON file
    #[arg(long)]
    content_options: Option<PathBuf>,

    #[arg(long, default_value = "1")]
    page: u64,

    /// Page size; -1 for all items
    #[arg(long, default_value = "15", allow_hyphen_values = true)]
    limit: i64,

    /// Fields to show, comma separated
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Sort fields, comma separated; prefix with `-` to sort descending
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    sort: Vec<String>,

    #[arg(long)]
    search: Option<String>,

    /// Filter, in JSON
    #[arg(long)]
    filter: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch all items of a collection, page by page if the server caps page sizes
    FetchAll(FetchAllArgs),

    /// Show the items an O2M interface would display for a record
    Display(DisplayArgs),

    /// Generate markdown documentation for o2m-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for o2m-runner
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for o2m-runner
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
