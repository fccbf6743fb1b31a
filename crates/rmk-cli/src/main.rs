use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rmk_config::PricingSettings;

mod commands;

#[derive(Parser)]
#[command(name = "rmk")]
#[command(about = "Rewards marketplace catalog and pricing CLI", long_about = None)]
struct Cli {
    /// YAML config layers in merge order (base -> env -> overrides).
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Staging review: variant matching and reconciliation decisions
    Review {
        #[command(subcommand)]
        cmd: ReviewCmd,
    },

    /// Merchant margin rules
    Margin {
        #[command(subcommand)]
        cmd: MarginCmd,
    },

    /// Loyalty partner point conversion rates
    Rate {
        #[command(subcommand)]
        cmd: RateCmd,
    },

    /// Points needed to pay an amount at a given rate (no database).
    Points {
        #[arg(long)]
        amount_minor: i64,
        /// Currency units per point, e.g. 0.25
        #[arg(long)]
        rate: String,
        #[arg(long)]
        currency: Option<String>,
    },

    /// Settlement price for a list price and margin percentage (no database).
    Settle {
        #[arg(long)]
        price_minor: i64,
        /// Margin percentage, e.g. 4.75
        #[arg(long)]
        margin: String,
    },

    /// Quote an offer against the stored margin and rate rules.
    Quote {
        #[arg(long)]
        merchant_id: i64,
        #[arg(long)]
        brand_id: Option<i64>,
        #[arg(long = "category-id")]
        category_ids: Vec<i64>,
        #[arg(long)]
        price_minor: i64,
        #[arg(long)]
        partner_id: Option<i64>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Merchant offer maintenance
    Offer {
        #[command(subcommand)]
        cmd: OfferCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while staging products await
    /// review unless --yes is provided.
    Migrate {
        /// Acknowledge that reviewers may be mid-decision on open staging products.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ReviewCmd {
    /// Propose a staging-to-master variant mapping.
    Match {
        #[arg(long)]
        staging_id: i64,
        #[arg(long)]
        master_product_id: i64,
    },

    /// Validate and commit a reconciliation decision read from a JSON file.
    Decide {
        #[arg(long)]
        staging_id: i64,
        /// JSON decision, tagged by "action".
        #[arg(long)]
        decision_file: String,
        #[arg(long)]
        currency: Option<String>,
    },
}

#[derive(Subcommand)]
enum MarginCmd {
    Resolve {
        #[arg(long)]
        merchant_id: i64,
        #[arg(long)]
        brand_id: Option<i64>,
        #[arg(long)]
        category_id: Option<i64>,
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    Add {
        #[arg(long)]
        merchant_id: i64,
        #[arg(long)]
        brand_id: Option<i64>,
        #[arg(long)]
        category_id: Option<i64>,
        /// Margin percentage in [0, 100] with up to two decimals.
        #[arg(long)]
        margin: String,
        #[arg(long)]
        valid_from: Option<DateTime<Utc>>,
        #[arg(long)]
        valid_to: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum RateCmd {
    Resolve {
        #[arg(long)]
        partner_id: i64,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Post a new rate; active rates for the partner and currency are closed.
    Post {
        #[arg(long)]
        partner_id: i64,
        #[arg(long)]
        rate: String,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        valid_from: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum OfferCmd {
    /// Recompute an offer's settlement price and log it when it changed.
    Reprice {
        #[arg(long)]
        offer_id: i64,
        #[arg(long)]
        partner_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = commands::connect(&cli.config_paths).await?;
            match cmd {
                DbCmd::Status => {
                    let s = rmk_db::status(&pool).await?;
                    println!("db_ok={} has_catalog_tables={}", s.ok, s.has_catalog_tables);
                    if s.has_catalog_tables {
                        println!("open_staging={}", rmk_db::count_open_staging(&pool).await?);
                    }
                }
                DbCmd::Migrate { yes } => {
                    let st = rmk_db::status(&pool).await?;
                    let n = if st.has_catalog_tables {
                        rmk_db::count_open_staging(&pool).await?
                    } else {
                        0
                    };
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: {} staging product(s) awaiting review. Re-run with: `rmk db migrate --yes`",
                            n
                        );
                    }

                    rmk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rmk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Review { cmd } => match cmd {
            ReviewCmd::Match {
                staging_id,
                master_product_id,
            } => {
                commands::review::match_cmd(&cli.config_paths, staging_id, master_product_id)
                    .await?
            }
            ReviewCmd::Decide {
                staging_id,
                decision_file,
                currency,
            } => {
                commands::review::decide_cmd(
                    &cli.config_paths,
                    staging_id,
                    &decision_file,
                    currency.as_deref(),
                )
                .await?
            }
        },

        Commands::Margin { cmd } => match cmd {
            MarginCmd::Resolve {
                merchant_id,
                brand_id,
                category_id,
                as_of,
            } => {
                let pool = commands::connect(&cli.config_paths).await?;
                commands::pricing::margin_resolve(
                    &pool,
                    merchant_id,
                    brand_id,
                    category_id,
                    as_of.unwrap_or_else(Utc::now),
                )
                .await?
            }
            MarginCmd::Add {
                merchant_id,
                brand_id,
                category_id,
                margin,
                valid_from,
                valid_to,
            } => {
                let pool = commands::connect(&cli.config_paths).await?;
                let new = commands::pricing::new_margin_rule(
                    merchant_id,
                    brand_id,
                    category_id,
                    &margin,
                    valid_from.unwrap_or_else(Utc::now),
                    valid_to,
                )?;
                let rule_id = rmk_db::insert_margin_rule(&pool, &new).await?;
                println!("margin_rule_id={}", rule_id);
                println!("margin_percentage={}", new.margin);
            }
        },

        Commands::Rate { cmd } => {
            let cfg = commands::load_config(&cli.config_paths)?;
            let settings = PricingSettings::from_config(&cfg.config_json)?;
            let pool = commands::connect_with(&cfg).await?;
            match cmd {
                RateCmd::Resolve {
                    partner_id,
                    currency,
                    as_of,
                } => {
                    let currency = commands::currency(&settings, currency.as_deref())?;
                    commands::pricing::rate_resolve(
                        &pool,
                        partner_id,
                        currency,
                        as_of.unwrap_or_else(Utc::now),
                    )
                    .await?
                }
                RateCmd::Post {
                    partner_id,
                    rate,
                    currency,
                    valid_from,
                } => {
                    let currency = commands::currency(&settings, currency.as_deref())?;
                    commands::pricing::rate_post(&pool, partner_id, currency, &rate, valid_from)
                        .await?
                }
            }
        }

        Commands::Points {
            amount_minor,
            rate,
            currency,
        } => {
            let settings = commands::pricing_settings(&cli.config_paths)?;
            let currency = commands::currency(&settings, currency.as_deref())?;
            commands::pricing::points(amount_minor, &rate, currency)?
        }

        Commands::Settle {
            price_minor,
            margin,
        } => commands::pricing::settle(price_minor, &margin)?,

        Commands::Quote {
            merchant_id,
            brand_id,
            category_ids,
            price_minor,
            partner_id,
            currency,
            as_of,
        } => {
            let cfg = commands::load_config(&cli.config_paths)?;
            let settings = PricingSettings::from_config(&cfg.config_json)?;
            let currency = commands::currency(&settings, currency.as_deref())?;
            let pool = commands::connect_with(&cfg).await?;
            let req = rmk_pricing::QuoteRequest {
                merchant_id,
                brand_id,
                category_ids: category_ids.into_iter().collect(),
                price_minor,
                currency,
                partner_id,
                as_of: as_of.unwrap_or_else(Utc::now),
            };
            commands::pricing::quote(&pool, &req).await?
        }

        Commands::Offer { cmd } => match cmd {
            OfferCmd::Reprice {
                offer_id,
                partner_id,
            } => {
                let pool = commands::connect(&cli.config_paths).await?;
                let r = rmk_db::reprice_offer(&pool, offer_id, partner_id, Utc::now()).await?;
                println!("offer_id={}", r.offer_id);
                println!("changed={}", r.changed);
                commands::pricing::print_quote(&r.quote);
            }
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
