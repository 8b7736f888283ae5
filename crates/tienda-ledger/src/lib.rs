//! # tienda-ledger: Ledger Engines for Tienda POS
//!
//! Every multi-step write of the back office lives here. The rules come
//! from `tienda-core`; the statements from `tienda-db`. An engine owns the
//! transaction that ties them together.
//!
//! ## Engines
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleEngine::create                                                     │
//! │     ├── StockLedger      stock pre-check, decrement + sale movements   │
//! │     └── RegisterEngine   open register total (write-through)           │
//! │                                                                         │
//! │  SaleEngine::cancel                                                     │
//! │     ├── StockLedger      restock + return movements                    │
//! │     └── RegisterEngine   total back off the register (best effort)     │
//! │                                                                         │
//! │  CreditEngine            interest and balance recomputed on read       │
//! │  DistributorEngine ×2    wholesale and retail settlement tracks        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tienda_ledger::{Ledger, LedgerConfig};
//!
//! let config = LedgerConfig::from_env()?;
//! tienda_ledger::telemetry::init_tracing(&config);
//!
//! let ledger = Ledger::open(config).await?;
//! let register = ledger.registers().open(10_000, "admin").await?;
//! // ...
//! ledger.close().await;
//! ```

pub mod clock;
pub mod config;
pub mod credit;
pub mod distributor;
pub mod error;
pub mod register;
pub mod sales;
pub mod stock;
pub mod telemetry;

use std::sync::Arc;

use tienda_core::distributor::Channel;
use tienda_db::Database;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, LedgerConfig};
pub use credit::{CreditAccount, CreditEngine, PaymentReceipt};
pub use distributor::DistributorEngine;
pub use error::{ErrorKind, ErrorReport, LedgerError, LedgerResult};
pub use register::{RegisterEngine, RegisterSummary};
pub use sales::{DailySummary, SaleEngine};
pub use stock::{StockCheck, StockLedger};

/// All engines over one database, sharing a clock.
#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    db: Database,
    stock: StockLedger,
    sales: SaleEngine,
    credit: CreditEngine,
    registers: RegisterEngine,
    wholesale: DistributorEngine,
    retail: DistributorEngine,
}

impl Ledger {
    pub fn new(db: Database, config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Ledger {
            stock: StockLedger::new(db.clone(), clock.clone()),
            sales: SaleEngine::new(db.clone(), &config, clock.clone()),
            credit: CreditEngine::new(db.clone(), &config, clock.clone()),
            registers: RegisterEngine::new(db.clone(), clock.clone()),
            wholesale: DistributorEngine::new(db.clone(), clock.clone(), Channel::Wholesale),
            retail: DistributorEngine::new(db.clone(), clock, Channel::Retail),
            config,
            db,
        }
    }

    /// Connects to the configured database, runs migrations and reads
    /// time from the local wall clock.
    pub async fn open(config: LedgerConfig) -> LedgerResult<Self> {
        let db = Database::new(config.db_config()).await?;
        tracing::info!(path = %config.database_path.display(), "Ledger opened");
        Ok(Ledger::new(db, config, Arc::new(SystemClock)))
    }

    pub fn stock(&self) -> &StockLedger {
        &self.stock
    }

    pub fn sales(&self) -> &SaleEngine {
        &self.sales
    }

    pub fn credit(&self) -> &CreditEngine {
        &self.credit
    }

    pub fn registers(&self) -> &RegisterEngine {
        &self.registers
    }

    pub fn wholesale(&self) -> &DistributorEngine {
        &self.wholesale
    }

    pub fn retail(&self) -> &DistributorEngine {
        &self.retail
    }

    /// The engine for a channel.
    pub fn distributors(&self, channel: Channel) -> &DistributorEngine {
        match channel {
            Channel::Wholesale => &self.wholesale,
            Channel::Retail => &self.retail,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Closes the pool once in-flight calls finish. Every engine of this
    /// ledger fails afterwards.
    pub async fn close(&self) {
        self.db.close().await;
        tracing::info!("Ledger closed");
    }
}
