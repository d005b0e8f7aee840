//! # Credit Engine
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store adapter
//! - Create the ledger and credit services and the overdue processor
//! - Run the requested command (the long-running `serve`, or a one-shot
//!   operation printed as JSON)

mod config;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use credit_hex::outbound::{FixedRateProvider, HttpRateProvider, LogNotifier, WebhookNotifier};
use credit_hex::{CreditPolicy, CreditService, LedgerService, OverdueProcessor, SweepConfig};
use credit_repo::{Repo, build_repo};
use credit_types::{
    AccountId, AccountStatus, Clock, CreateCreditRequest, CreditId, CreditResponse,
    DepositRequest, Notifier, OpenAccountRequest, RateProvider, ScheduleResponse, SystemClock,
    TransferRequest, UserId, WithdrawRequest,
};

use config::{Config, LogFormat};

#[derive(Parser)]
#[command(name = "credit-engine")]
#[command(author, version, about = "Credit lifecycle and payment enforcement engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the overdue payment processor until Ctrl-C
    Serve,
    /// Run one overdue sweep and print its summary
    Sweep,
    /// Account operations
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },
    /// Deposit funds into an account
    Deposit {
        #[arg(long)]
        account: AccountId,
        /// Amount in rubles, e.g. 1500.50
        #[arg(long)]
        amount: Decimal,
    },
    /// Withdraw funds from an account
    Withdraw {
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: Decimal,
    },
    /// Transfer funds between accounts
    Transfer {
        #[arg(long)]
        from: AccountId,
        #[arg(long)]
        to: AccountId,
        #[arg(long)]
        amount: Decimal,
    },
    /// Credit operations
    Credit {
        #[command(subcommand)]
        action: CreditCommands,
    },
    /// Show an account with its transactions, newest first
    History {
        /// Account ID (UUID)
        account: AccountId,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Open a new account
    Open {
        /// Owner's user ID (UUID)
        #[arg(long)]
        user: UserId,
    },
    /// Get account details
    Show { id: AccountId },
    /// List a user's accounts
    List {
        #[arg(long)]
        user: UserId,
    },
    /// Block an account
    Block { id: AccountId },
    /// Close an account
    Close { id: AccountId },
    /// Re-activate a blocked or closed account
    Activate { id: AccountId },
}

#[derive(Subcommand)]
enum CreditCommands {
    /// Issue a credit and disburse it into an account
    Create {
        #[arg(long)]
        user: UserId,
        /// Funding account (UUID)
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: Decimal,
        /// Term in months (1..=360)
        #[arg(long)]
        term: u32,
    },
    /// Get credit details
    Show { id: CreditId },
    /// Show a credit's payment schedule
    Schedule { id: CreditId },
    /// List a user's credits
    List {
        #[arg(long)]
        user: UserId,
    },
}

/// Everything the commands need, wired over one store.
struct Engine {
    ledger: LedgerService<Repo>,
    credits: CreditService<Repo>,
    processor: OverdueProcessor<Repo>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,credit_hex=debug,credit_app=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays valid JSON
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn build_engine(config: &Config) -> Result<Engine> {
    // Build repository (handles connection and migration)
    let store = Arc::new(build_repo(&config.database_url).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let rates: Arc<dyn RateProvider> = match &config.rate_provider_url {
        Some(url) => {
            info!(url = %url, "Using HTTP rate provider");
            Arc::new(HttpRateProvider::new(
                url.clone(),
                config.rate_provider_timeout,
            )?)
        }
        None => {
            info!(rate = %config.fallback_key_rate, "Using fixed base rate");
            Arc::new(FixedRateProvider::new(config.fallback_key_rate))
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            config.rate_provider_timeout,
        )?),
        None => Arc::new(LogNotifier),
    };

    let ledger = LedgerService::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        config.max_transaction_amount,
    );
    let credits = CreditService::new(
        Arc::clone(&store),
        rates,
        Arc::clone(&clock),
        CreditPolicy {
            bank_margin: config.bank_margin,
            fallback_base_rate: config.fallback_key_rate,
            max_amount: config.max_credit_amount,
        },
    );
    let processor = OverdueProcessor::new(
        store,
        notifier,
        clock,
        SweepConfig {
            interval: config.sweep_interval,
            penalty_rate: config.penalty_rate,
        },
    );

    Ok(Engine {
        ledger,
        credits,
        processor,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(engine: &Engine, config: &Config) -> Result<()> {
    engine.processor.start().await?;
    info!("Overdue processor running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if tokio::time::timeout(config.shutdown_timeout, engine.processor.stop())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Overdue processor did not stop before the deadline"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let engine = build_engine(&config).await?;

    match cli.command {
        Commands::Serve => serve(&engine, &config).await?,

        Commands::Sweep => {
            let summary = engine.processor.run_sweep().await?;
            print_json(&summary)?;
        }

        Commands::Account { action } => {
            let account = match action {
                AccountCommands::Open { user } => {
                    engine
                        .ledger
                        .open_account(OpenAccountRequest {
                            user_id: user,
                            currency: Default::default(),
                        })
                        .await?
                }
                AccountCommands::Show { id } => engine.ledger.get_account(id).await?,
                AccountCommands::List { user } => {
                    let accounts = engine.ledger.list_accounts(user).await?;
                    return print_json(&accounts);
                }
                AccountCommands::Block { id } => {
                    engine
                        .ledger
                        .set_account_status(id, AccountStatus::Blocked)
                        .await?
                }
                AccountCommands::Close { id } => {
                    engine
                        .ledger
                        .set_account_status(id, AccountStatus::Closed)
                        .await?
                }
                AccountCommands::Activate { id } => {
                    engine
                        .ledger
                        .set_account_status(id, AccountStatus::Active)
                        .await?
                }
            };
            print_json(&account)?;
        }

        Commands::Deposit { account, amount } => {
            let response = engine
                .ledger
                .deposit(DepositRequest {
                    account_id: account,
                    amount,
                })
                .await?;
            print_json(&response)?;
        }

        Commands::Withdraw { account, amount } => {
            let response = engine
                .ledger
                .withdraw(WithdrawRequest {
                    account_id: account,
                    amount,
                })
                .await?;
            print_json(&response)?;
        }

        Commands::Transfer { from, to, amount } => {
            let response = engine
                .ledger
                .transfer(TransferRequest {
                    from_account_id: from,
                    to_account_id: to,
                    amount,
                })
                .await?;
            print_json(&response)?;
        }

        Commands::Credit { action } => match action {
            CreditCommands::Create {
                user,
                account,
                amount,
                term,
            } => {
                let credit = engine
                    .credits
                    .create_credit(CreateCreditRequest {
                        user_id: user,
                        account_id: account,
                        amount,
                        term_months: term,
                    })
                    .await?;
                print_json(&CreditResponse::from(credit))?;
            }
            CreditCommands::Show { id } => {
                let credit = engine.credits.get_credit(id).await?;
                print_json(&CreditResponse::from(credit))?;
            }
            CreditCommands::Schedule { id } => {
                let credit = engine.credits.get_credit(id).await?;
                let entries = engine.credits.get_schedule(id).await?;
                print_json(&ScheduleResponse {
                    credit: credit.into(),
                    entries,
                })?;
            }
            CreditCommands::List { user } => {
                let credits: Vec<CreditResponse> = engine
                    .credits
                    .list_credits(user)
                    .await?
                    .into_iter()
                    .map(Into::into)
                    .collect();
                print_json(&credits)?;
            }
        },

        Commands::History { account } => {
            let history = engine.ledger.history(account).await?;
            print_json(&history)?;
        }
    }

    Ok(())
}
