//! # Fair Price
//!
//! A price-verification assistant. Given a free-text query such as
//! `"iphone 12 for 12000 rs in pune"`, it works out what the item is, what
//! was quoted, and whether that quote is fair, using the local history of
//! past quotes and live web evidence.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   query ───────▶│    query     │ item, claimed price, location
//!                 └──────┬───────┘
//!            ┌───────────┴────────────┐
//!            ▼                        ▼
//!     ┌─────────────┐   ┌──────────────────────────────┐
//!     │ similarity  │   │ evidence ─▶ resolver         │
//!     │ (history)   │   │ search+read   oracle+extract │
//!     └──────┬──────┘   └──────────────┬───────────────┘
//!            └───────────┬─────────────┘
//!                        ▼
//!                 ┌──────────────┐   ┌────────────┐
//!                 │   verdict    │──▶│ confidence │──▶ PriceReport
//!                 └──────────────┘   └────────────┘
//! ```
//!
//! Every collaborator that talks to the outside world sits behind a trait
//! ([`store::Store`], [`embedding::Embedder`], [`oracle::Oracle`],
//! [`websearch::WebSearcher`], [`reader::PageReader`]) so the pipeline runs
//! unchanged against SQLite and live APIs or against in-memory stubs.
//!
//! ## Quick Start
//!
//! ```bash
//! fairprice init
//! fairprice check "iphone 12 for 12000 rs"
//! fairprice check "macbook air m1 price" --deep --json
//! fairprice serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`query`] | Query parsing |
//! | [`extract`] | Regex and selector price extraction |
//! | [`websearch`] | Web search providers |
//! | [`reader`] | Page readers |
//! | [`oracle`] | Language-model client and JSON reply parsing |
//! | [`evidence`] | Search, filtering, and deep reads |
//! | [`resolver`] | Attaching prices to evidence |
//! | [`similarity`] | Semantic price history |
//! | [`verdict`] | Verdict synthesis and fallback |
//! | [`confidence`] | Confidence score |
//! | [`pipeline`] | Request orchestration |
//! | [`server`] | HTTP API |
//! | [`check_cmd`], [`entries`], [`sources`], [`logs`] | CLI commands |

pub mod check_cmd;
pub mod confidence;
pub mod config;
pub mod db;
pub mod embedding;
pub mod entries;
pub mod evidence;
pub mod extract;
pub mod logs;
pub mod migrate;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod query;
pub mod reader;
pub mod resolver;
pub mod server;
pub mod similarity;
pub mod sources;
pub mod store;
pub mod verdict;
pub mod websearch;
