use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use supabase_crm::kanban::{format_elapsed, time_in_column, DragEnd, DragOutcome, DraggableLocation};
use supabase_crm::prelude::*;

#[derive(Parser)]
#[command(
    name = "crm-kanban",
    about = "Manage CRM leads and kanban columns stored in Supabase",
    version,
    propagate_version = true
)]
struct Cli {
    /// Supabase project URL
    #[arg(long, global = true, env = "SUPABASE_URL")]
    url: Option<String>,

    /// Supabase anonymous API key
    #[arg(long, global = true, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the board: columns, cards and time in column
    Board,

    /// Manage leads
    Leads {
        #[command(subcommand)]
        subcommand: LeadsSubcommand,
    },

    /// Manage kanban columns
    Columns {
        #[command(subcommand)]
        subcommand: ColumnsSubcommand,
    },
}

#[derive(Subcommand)]
enum LeadsSubcommand {
    /// Create a lead
    Add {
        name: String,
        email: String,
        phone: String,
        /// Initial column (defaults to the first pipeline stage)
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Where the lead came from (e.g. landing, whatsapp)
        #[arg(long)]
        source: Option<String>,
    },
    /// Edit a lead's fields
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Move a lead to another column, as a drag on the board would
    Move { id: String, column: String },
    /// Delete a lead
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ColumnsSubcommand {
    /// List columns in board order
    List,
    /// Append a column
    Add { name: String },
    /// Rename a column; its leads follow
    Rename { id: String, name: String },
    /// Move a column to a zero-based position
    Move { id: String, index: usize },
    /// Delete a column (refused while it holds leads unless told otherwise)
    Delete {
        id: String,
        /// Move the column's leads to this column first
        #[arg(long, conflicts_with = "orphan")]
        reassign_to: Option<String>,
        /// Delete even if leads remain; they become unassigned
        #[arg(long)]
        orphan: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let notifier = Arc::new(RecordingNotifier::new());

    let result = run(cli, notifier.clone()).await;

    let mut failed = false;
    for notice in notifier.take() {
        if notice.is_error() {
            failed = true;
            eprintln!("{}", notice);
        } else {
            println!("{}", notice);
        }
    }

    match result {
        Ok(true) if !failed => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

fn connect(cli: &Cli) -> Result<Crm> {
    let config = match (&cli.url, &cli.anon_key) {
        (Some(url), Some(key)) => {
            let mut config = CrmConfig::new(url, key)?;
            if let Ok(token) = std::env::var("SUPABASE_ACCESS_TOKEN") {
                config = config.with_access_token(&token);
            }
            config
        }
        _ => CrmConfig::from_env()?,
    };
    Crm::new(config, ClientOptions::default())
}

/// Ok(false) means the operation failed and a notice says why
async fn run(cli: Cli, notifier: Arc<RecordingNotifier>) -> Result<bool> {
    let crm = connect(&cli)?;
    match cli.command {
        Commands::Board => {
            print_board(&crm.board().await?);
            Ok(true)
        }
        Commands::Leads { subcommand } => run_leads(&crm, subcommand, notifier).await,
        Commands::Columns { subcommand } => run_columns(&crm, subcommand, notifier).await,
    }
}

async fn run_leads(
    crm: &Crm,
    subcommand: LeadsSubcommand,
    notifier: Arc<RecordingNotifier>,
) -> Result<bool> {
    let ops = crm.lead_operations(notifier);
    let done = match subcommand {
        LeadsSubcommand::Add {
            name,
            email,
            phone,
            status,
            notes,
            source,
        } => {
            let status = status.unwrap_or_else(|| crm.options.default_status.clone());
            let mut lead = NewLead::new(&name, &email, &phone).with_status(&status);
            if let Some(notes) = notes {
                lead = lead.with_notes(&notes);
            }
            if let Some(source) = source {
                lead = lead.with_source(&source);
            }
            lead.check()?;
            ops.create(lead).await
        }
        LeadsSubcommand::Update {
            id,
            name,
            email,
            phone,
            notes,
            status,
        } => {
            let mut update = LeadUpdate::new();
            if let Some(v) = name {
                update = update.name(&v);
            }
            if let Some(v) = email {
                update = update.email(&v);
            }
            if let Some(v) = phone {
                update = update.phone(&v);
            }
            if let Some(v) = notes {
                update = update.notes(&v);
            }
            if let Some(v) = status {
                update = update.status(&v);
            }
            ops.update(&id, update).await
        }
        LeadsSubcommand::Move { id, column } => {
            let board = crm.board().await?;
            let event = synthetic_drag(&board, &id, &column)?;
            let reconciler = crm.reconciler(ops);
            match reconciler.handle_drag_end(&event).await {
                DragOutcome::Moved { .. } => true,
                DragOutcome::Ignored(reason) => {
                    println!("Nothing to do ({:?})", reason);
                    true
                }
                DragOutcome::Failed { .. } => false,
            }
        }
        LeadsSubcommand::Delete { id, yes } => {
            ops.delete(&id, || yes || confirm(&format!("Delete lead {}?", id)))
                .await
        }
    };
    Ok(done)
}

async fn run_columns(
    crm: &Crm,
    subcommand: ColumnsSubcommand,
    notifier: Arc<RecordingNotifier>,
) -> Result<bool> {
    let ops = crm.column_operations(notifier);
    // Failures below have already been reported as notices.
    let done = match subcommand {
        ColumnsSubcommand::List => {
            for column in ops.list().await? {
                println!("{:>3}  {:<12} {}", column.position, column.id, column.name);
            }
            true
        }
        ColumnsSubcommand::Add { name } => ops.create(&name).await.is_ok(),
        ColumnsSubcommand::Rename { id, name } => ops.rename(&id, &name).await.is_ok(),
        ColumnsSubcommand::Move { id, index } => ops.reorder(&id, index).await.is_ok(),
        ColumnsSubcommand::Delete {
            id,
            reassign_to,
            orphan,
        } => {
            let policy = match (reassign_to, orphan) {
                (Some(to), _) => DeletePolicy::Reassign { to },
                (None, true) => DeletePolicy::Orphan,
                (None, false) => DeletePolicy::Block,
            };
            ops.delete(&id, policy).await.is_ok()
        }
    };
    Ok(done)
}

/// The drag a user would make to carry `lead_id` to the end of `column`
fn synthetic_drag(board: &Board, lead_id: &str, column: &str) -> Result<DragEnd> {
    let source = match board.locate(lead_id) {
        Some(source) => source,
        None => {
            let lead = board
                .unassigned
                .iter()
                .find(|l| l.id == lead_id)
                .ok_or_else(|| Error::not_found(format!("lead {}", lead_id)))?;
            DraggableLocation::new(&lead.status, 0)
        }
    };
    let index = board.column(column).map(|c| c.leads.len()).unwrap_or(0);
    Ok(DragEnd::new(
        lead_id,
        source,
        Some(DraggableLocation::new(column, index)),
    ))
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_board(board: &Board) {
    let now = chrono::Utc::now();
    for column in &board.columns {
        println!("== {} ({}) ==", column.column.name, column.leads.len());
        for lead in &column.leads {
            println!(
                "  {:<12} {:<28} {:<28} {}",
                lead.id,
                lead.name,
                lead.email,
                format_elapsed(time_in_column(lead, now))
            );
        }
    }
    if !board.unassigned.is_empty() {
        println!("== unassigned ({}) ==", board.unassigned.len());
        for lead in &board.unassigned {
            println!("  {:<12} {:<28} status: {}", lead.id, lead.name, lead.status);
        }
    }
}
