use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use menuflow::application::orchestrator::{OrderCreationOrchestrator, SettlementReport};
use menuflow::application::payment_client::{PaymentGatewayClient, PollPolicy};
use menuflow::application::poller::{Bucket, LiveStatusPoller, PollerConfig};
use menuflow::application::receiver::{ClickAction, NotificationReceiver};
use menuflow::application::shutdown;
use menuflow::config::{self, AppConfig};
use menuflow::domain::order::{Customer, OrderId, VendorAction};
use menuflow::domain::payment::IntentStatus;
use menuflow::domain::ports::{OrderStore, OrderStoreRef, PaymentCallbackHandler};
use menuflow::infrastructure::http::{HttpOrderStore, HttpPaymentGateway};
use menuflow::infrastructure::in_memory::{
    InMemoryNotificationCenter, InMemoryOrderStore, InMemoryWindows,
};
#[cfg(feature = "storage-rocksdb")]
use menuflow::infrastructure::rocksdb::RocksDbOrderStore;
use menuflow::infrastructure::simulated_gateway::SimulatedGateway;
use menuflow::interfaces::csv::cart_reader::CartReader;
use menuflow::interfaces::csv::queue_writer::QueueWriter;
use menuflow::telemetry;
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CustomerArgs {
    /// Customer name
    #[arg(long)]
    name: String,

    /// Customer mobile number
    #[arg(long)]
    phone: String,

    #[arg(long)]
    email: Option<String>,

    /// Table the order is served to
    #[arg(long)]
    table: Option<String>,
}

impl From<CustomerArgs> for Customer {
    fn from(args: CustomerArgs) -> Self {
        Customer {
            name: args.name,
            phone: args.phone,
            email: args.email,
            table_number: args.table,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Success,
    Failure,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a cart and print where the customer pays
    Checkout {
        /// Cart CSV file
        #[arg(long)]
        cart: PathBuf,
        #[command(flatten)]
        customer: CustomerArgs,
    },
    /// Print the current status of a payment
    Verify { txn: String },
    /// Poll a payment until it settles or attempts run out
    AwaitPayment { txn: String },
    /// Fetch the live order queues once and print them as CSV
    Queue {
        /// Only this queue (pending, accepted or running)
        #[arg(long)]
        status: Option<Bucket>,
    },
    /// Keep the order queues refreshed until interrupted
    Watch,
    /// Issue a vendor command (accept, reject, start, ready, complete)
    Transition {
        order_id: u64,
        action: String,
        /// Required when rejecting
        #[arg(long)]
        reason: Option<String>,
    },
    /// Decode a push payload file and print the notification it produces
    Notify {
        file: PathBuf,
        /// Also route a click on the notification
        #[arg(long)]
        click: bool,
    },
    /// Run checkout, settlement and the order queue offline
    Demo {
        /// Cart CSV file
        #[arg(long)]
        cart: PathBuf,
        #[command(flatten)]
        customer: CustomerArgs,
        #[arg(long, value_enum, default_value_t = Outcome::Success)]
        outcome: Outcome,
        /// Deliver the settlement callback a second time
        #[arg(long)]
        redeliver: bool,
        /// Accept the new order once it shows up
        #[arg(long)]
        accept: bool,
        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();
    telemetry::init();
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Command::Checkout { cart, customer } => {
            let orchestrator = OrderCreationOrchestrator::new(Arc::new(remote_payments(&config)?));
            let items = CartReader::new(File::open(cart).into_diagnostic()?)
                .read_cart()
                .into_diagnostic()?;
            let redirect = orchestrator
                .submit_order(items, customer.into(), config.vendor_id)
                .await
                .into_diagnostic()?;
            println!("payment_url: {}", redirect.payment_url);
            println!("gateway_txn_id: {}", redirect.gateway_txn_id);
        }
        Command::Verify { txn } => {
            let snapshot = remote_payments(&config)?
                .verify(&txn)
                .await
                .into_diagnostic()?;
            println!("status: {}", snapshot.status);
            if let Some(tx) = snapshot.transaction {
                println!("amount: {}", tx.amount);
            }
        }
        Command::AwaitPayment { txn } => {
            let orchestrator = OrderCreationOrchestrator::new(Arc::new(remote_payments(&config)?));
            let report =
                observe_until_interrupted(&orchestrator, &txn, config.poll_policy()).await?;
            println!("{}", report.message());
        }
        Command::Queue { status } => {
            let mut poller_config = config.poller_config().into_diagnostic()?;
            if let Some(bucket) = status {
                poller_config.buckets = vec![bucket];
            }
            let poller = LiveStatusPoller::new(remote_orders(&config)?, poller_config);
            poller.refresh_all().await;
            write_queues(&poller)?;
        }
        Command::Watch => {
            let poller = Arc::new(LiveStatusPoller::new(
                remote_orders(&config)?,
                config.poller_config().into_diagnostic()?,
            ));
            let mut updates = poller.subscribe();
            let handle = poller.clone().spawn();
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        let mut writer = QueueWriter::new(io::stdout().lock());
                        writer.write_snapshot(&snapshot).into_diagnostic()?;
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            handle.stop().await;
        }
        Command::Transition {
            order_id,
            action,
            reason,
        } => {
            let action = VendorAction::parse(&action, reason).into_diagnostic()?;
            action.clone().into_command().into_diagnostic()?;
            let poller = LiveStatusPoller::new(
                remote_orders(&config)?,
                config.poller_config().into_diagnostic()?,
            );
            let order = poller
                .apply(OrderId(order_id), action)
                .await
                .into_diagnostic()?;
            println!("Order {} is now {}", order.id, order.status);
        }
        Command::Notify { file, click } => {
            let raw = std::fs::read(file).into_diagnostic()?;
            let receiver = NotificationReceiver::new(
                Arc::new(InMemoryNotificationCenter::new()),
                Arc::new(InMemoryWindows::new()),
            );
            if let Some(messaging) = config.messaging() {
                receiver.configure(messaging);
            }
            let notification = receiver
                .on_push(&raw)
                .await
                .ok_or_else(|| miette!("Push payload was dropped, see log for details"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&notification).into_diagnostic()?
            );
            if click {
                match receiver.on_click(&notification).await.into_diagnostic()? {
                    ClickAction::Navigate { url, window } => {
                        println!("click: opened {url} in window {window}")
                    }
                    ClickAction::Focus(window) => println!("click: focused window {window}"),
                    ClickAction::OpenRoot(window) => {
                        println!("click: opened / in window {window}")
                    }
                }
            }
        }
        Command::Demo {
            cart,
            customer,
            outcome,
            redeliver,
            accept,
            db_path,
        } => {
            let demo = Demo {
                cart,
                customer: customer.into(),
                outcome,
                redeliver,
                accept,
                vendor_id: config.vendor_id,
                policy: PollPolicy {
                    interval: Duration::from_millis(20),
                    ..config.poll_policy()
                },
            };
            match db_path {
                #[cfg(feature = "storage-rocksdb")]
                Some(db_path) => {
                    let store = RocksDbOrderStore::open(db_path).into_diagnostic()?;
                    demo.run(Arc::new(store)).await?;
                }
                #[cfg(not(feature = "storage-rocksdb"))]
                Some(_) => {
                    eprintln!(
                        "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
                    );
                    demo.run(Arc::new(InMemoryOrderStore::new())).await?;
                }
                None => demo.run(Arc::new(InMemoryOrderStore::new())).await?,
            }
        }
    }

    Ok(())
}

fn remote_payments(config: &AppConfig) -> Result<PaymentGatewayClient> {
    let api = config.gateway_api().into_diagnostic()?;
    Ok(PaymentGatewayClient::new(Box::new(HttpPaymentGateway::new(
        api,
    ))))
}

fn remote_orders(config: &AppConfig) -> Result<OrderStoreRef> {
    let api = config.order_api().into_diagnostic()?;
    Ok(Arc::new(HttpOrderStore::new(api)))
}

fn write_queues(poller: &LiveStatusPoller) -> Result<()> {
    let snapshot = poller.snapshot();
    for (bucket, view) in &snapshot.buckets {
        if let Some(error) = &view.last_error {
            warn!(%bucket, %error, "Queue could not be refreshed");
        }
    }
    let mut writer = QueueWriter::new(io::stdout().lock());
    writer.write_snapshot(&snapshot).into_diagnostic()
}

async fn observe_until_interrupted(
    orchestrator: &OrderCreationOrchestrator,
    txn: &str,
    policy: PollPolicy,
) -> Result<SettlementReport> {
    let (trigger, cancelled) = shutdown::channel();
    let observe = orchestrator.observe_settlement(txn, policy, cancelled, |progress| {
        info!(
            attempt = progress.attempt,
            max_attempts = progress.max_attempts,
            status = %progress.status,
            error = progress.error.as_deref().unwrap_or(""),
            "Payment status"
        );
    });
    tokio::pin!(observe);
    let report = tokio::select! {
        report = &mut observe => report,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping payment polling");
            trigger.trigger();
            observe.await
        }
    };
    report.into_diagnostic()
}

struct Demo {
    cart: PathBuf,
    customer: Customer,
    outcome: Outcome,
    redeliver: bool,
    accept: bool,
    vendor_id: u64,
    policy: PollPolicy,
}

impl Demo {
    async fn run<S>(self, store: Arc<S>) -> Result<()>
    where
        S: OrderStore + PaymentCallbackHandler + 'static,
    {
        let gateway = SimulatedGateway::new("https://pay.menuflow.local")
            .with_txn_prefix(format!("DEMO{}-", Utc::now().timestamp_millis()))
            .with_callback_handler(store.clone());
        let orchestrator = OrderCreationOrchestrator::new(Arc::new(PaymentGatewayClient::new(
            Box::new(gateway.clone()),
        )));

        let items = CartReader::new(File::open(&self.cart).into_diagnostic()?)
            .read_cart()
            .into_diagnostic()?;
        let redirect = orchestrator
            .submit_order(items, self.customer, self.vendor_id)
            .await
            .into_diagnostic()?;
        info!(payment_url = %redirect.payment_url, "Customer redirected to payment");

        let settled = match self.outcome {
            Outcome::Success => IntentStatus::Success,
            Outcome::Failure => IntentStatus::Failure,
        };
        gateway.script(
            &redirect.gateway_txn_id,
            [IntentStatus::Scanning, IntentStatus::Pending, settled],
        );
        let report = observe_until_interrupted(&orchestrator, &redirect.gateway_txn_id, self.policy)
            .await?;
        info!(gateway_txn_id = %redirect.gateway_txn_id, "{}", report.message());

        if self.redeliver {
            match gateway.redeliver(&redirect.gateway_txn_id).await {
                Ok(outcome) => info!(?outcome, "Settlement callback redelivered"),
                Err(e) => warn!(error = %e, "Nothing to redeliver"),
            }
        }

        let poller = LiveStatusPoller::new(store, PollerConfig::new(self.vendor_id));
        poller.refresh_all().await;
        if self.accept {
            let newest = poller.snapshot().order_ids(Bucket::Pending).last().copied();
            match newest {
                Some(id) => {
                    poller
                        .apply(id, VendorAction::Accept)
                        .await
                        .into_diagnostic()?;
                }
                None => warn!("No pending order to accept"),
            }
        }
        write_queues(&poller)
    }
}
