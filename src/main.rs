use clap::{Parser, Subcommand};
use invoice_reconcile::models::{
    display_amount, format_currency, InvoiceField, InvoiceRecord, PurchaseOrder, RegisterRequest,
    SyncOutcome,
};
use invoice_reconcile::service::{LookupState, PoResolver};
use invoice_reconcile::{
    ApiClient, AppConfig, DashboardAggregator, Error, InvoiceBackend, ReviewSession, SessionManager,
    SessionState,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

const DEFAULT_SESSION_FILE: &str = ".invoice-reconcile/session.json";

#[derive(Parser)]
#[command(name = "invoice-reconcile")]
#[command(author, version, about = "Review vendor invoices, match them to ERP purchase orders and sync")]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (TOML); RECONCILE__* environment variables override it
    #[arg(short, long, default_value = "reconcile.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        /// Defaults to the part of the email before '@'
        #[arg(long)]
        username: Option<String>,
    },

    /// Log in and store the access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Forget the stored access token
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Upload an invoice file (PDF, PNG, JPG) for extraction
    Upload { file: PathBuf },

    /// List invoices
    List,

    /// Show one invoice and the purchase order detected on it
    Show { id: i64 },

    /// Update one field of an invoice
    Edit {
        id: i64,
        /// invoice_number, vendor_name, invoice_date, due_date, subtotal, tax_amount, total_amount
        field: InvoiceField,
        value: String,
    },

    /// Look up a purchase order in the ERP
    Po { number: String },

    /// Match an invoice to a purchase order and sync it to the ERP
    Sync {
        id: i64,
        /// PO number to use instead of the one detected on the invoice
        #[arg(long)]
        po: Option<String>,
    },

    /// Show invoice counts and totals
    Dashboard {
        /// Compute from the invoice list instead of the server summary
        #[arg(long)]
        local: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Unauthorized) => {
            eprintln!("Your session has expired. Run `invoice-reconcile login` to sign in again.");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> invoice_reconcile::Result<()> {
    let config = AppConfig::load(Some(cli.config.as_path()))?;
    info!("Using API at {}", config.api.base_url);

    let session_path = config
        .session
        .store_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));
    let session = Arc::new(SessionManager::persistent(session_path));
    watch_session(&session);

    let client = Arc::new(ApiClient::new(&config.api, session.clone())?);
    let backend: Arc<dyn InvoiceBackend> = client.clone();

    match cli.command {
        Commands::Register {
            email,
            password,
            full_name,
            username,
        } => {
            let request = RegisterRequest::new(&email, &password, &full_name, username.as_deref());
            client.register(&request).await?;
            println!("Registered {} (username {})", request.email, request.username);
        }
        Commands::Login { email, password } => {
            let user = client.login(&email, &password).await?;
            println!("Logged in as {}", user.email);
        }
        Commands::Logout => {
            client.logout();
            println!("Logged out");
        }
        Commands::Whoami => {
            let user = client.current_user().await?;
            println!(
                "{} <{}>{}",
                user.full_name.as_deref().unwrap_or("-"),
                user.email,
                if user.is_active { "" } else { " (inactive)" }
            );
        }
        Commands::Upload { file } => {
            let review = ReviewSession::with_debounce(backend, Duration::ZERO);
            let record = review.upload(&file).await?;
            print_invoice(&record);
            print_lookup(&review.wait_for_lookup().await);
        }
        Commands::List => {
            let invoices = backend.list_invoices().await?;
            if invoices.is_empty() {
                println!("No invoices yet");
            }
            for inv in &invoices {
                println!(
                    "{:>6}  {:<18} {:<28} {:>14}  {}",
                    inv.id,
                    inv.invoice_number,
                    inv.vendor_name,
                    display_amount(inv.total_amount.as_ref()),
                    inv.status
                );
            }
        }
        Commands::Show { id } => {
            let review = ReviewSession::with_debounce(backend, Duration::ZERO);
            let record = review.open(id).await?;
            print_invoice(&record);
            print_lookup(&review.wait_for_lookup().await);
        }
        Commands::Edit { id, field, value } => {
            let review = ReviewSession::with_debounce(backend, Duration::ZERO);
            review.open(id).await?;
            let record = review.edit(field, &value).await?;
            print_invoice(&record);
        }
        Commands::Po { number } => {
            let resolver = PoResolver::new(backend, Duration::ZERO);
            if let Some(state) = resolver.set_input(&number).await? {
                print_lookup(&state);
            }
        }
        Commands::Sync { id, po } => {
            let review = ReviewSession::with_debounce(backend, Duration::ZERO);
            review.open(id).await?;
            match po {
                Some(po) => {
                    review.set_po_input(&po).await?;
                }
                None => {
                    review.wait_for_lookup().await;
                }
            }
            print_lookup(&review.lookup());

            match review.sync().await? {
                SyncOutcome::Succeeded { message, record } => {
                    println!("✓ {message}");
                    if let Some(record) = record {
                        println!("Invoice {} is now {}", record.id, record.status);
                    }
                }
                SyncOutcome::Failed { message } => {
                    println!("✗ {message}");
                    return Err(Error::Conflict(message));
                }
            }
        }
        Commands::Dashboard { local } => {
            let aggregator = DashboardAggregator::new(backend);
            let summary = if local {
                aggregator.from_invoices().await?
            } else {
                aggregator.fetch().await?
            };
            println!("Total invoices: {}", summary.total);
            println!("Pending sync:   {}", summary.pending_sync);
            println!("Synced:         {}", summary.synced);
            println!("Failed:         {}", summary.failed);
            println!("Total amount:   {}", format_currency(&summary.total_amount));
            if let Some(rate) = summary.sync_success_rate {
                println!("Sync success:   {rate:.1}%");
            }
            for (status, n) in &summary.by_status {
                println!("  {status:<10} {n}");
            }
            if !summary.recent.is_empty() {
                println!("Recent:");
                for inv in &summary.recent {
                    println!("  #{} {} {} [{}]", inv.id, inv.invoice_number, inv.vendor_name, inv.status);
                }
            }
        }
    }

    Ok(())
}

/// 会话过期时提示重新登录
fn watch_session(session: &Arc<SessionManager>) {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if *rx.borrow_and_update() == SessionState::Expired {
                eprintln!("Session expired; stored credentials were cleared.");
            }
        }
    });
}

fn print_invoice(inv: &InvoiceRecord) {
    println!("Invoice #{} [{}]", inv.id, inv.status);
    println!("  Number:     {}", inv.invoice_number);
    println!("  Vendor:     {}", inv.vendor_name);
    println!(
        "  Dates:      {} / due {}",
        inv.invoice_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
        inv.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
    );
    println!("  Subtotal:   {}", display_amount(inv.subtotal.as_ref()));
    println!("  Tax:        {}", display_amount(inv.tax_amount.as_ref()));
    println!("  Total:      {}", display_amount(inv.total_amount.as_ref()));
    if let Some(score) = inv.confidence_score {
        println!("  Confidence: {score:.1}%");
    }
    if !inv.po_numbers.is_empty() {
        println!("  Detected PO numbers: {}", inv.po_numbers.join(", "));
    }
    if let Some(name) = inv.file_name() {
        println!("  File:       {name}");
    }
}

fn print_lookup(state: &LookupState) {
    match state {
        LookupState::Idle => println!("No PO number entered"),
        LookupState::Loading { po_number } => println!("Loading purchase order {po_number}..."),
        LookupState::Failed { po_number, message } => println!("PO {po_number}: {message}"),
        LookupState::Resolved(po) => print_purchase_order(po),
    }
}

fn print_purchase_order(po: &PurchaseOrder) {
    println!(
        "PO {} [{}] {} {}",
        po.po_number,
        po.status_label(),
        display_amount(po.total_amount.as_ref()),
        po.currency_code
    );
    if let Some(vendor) = &po.vendor_name {
        println!("  Vendor: {vendor}");
    }
    for line in &po.line_items {
        println!(
            "  {:>3}  {:<14} {:<30} {:>8} {:>12} {:>12}",
            line.line_number,
            line.part_number_label(),
            line.description_label(),
            line.quantity,
            display_amount(line.unit_price.as_ref()),
            display_amount(line.line_total.as_ref())
        );
    }
}
