//! CLI smoke entry point.
//!
//! # Responsibility
//! - Load an optional JSON config (first argument), start logging, open the
//!   catalog database and build the membership engine it describes.
//! - Print deterministic status lines for quick local sanity checks.

use postercat_core::db::migrations::current_user_version;
use postercat_core::{
    core_version, init_logging_from, open_catalog_db, CatalogConfig, ListRepository,
    MembershipEngine, SqliteCatalogRepository, SqliteMembershipStore,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_exit module=cli status=error error={err}");
            eprintln!("postercat: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => CatalogConfig::load(path)?,
        None => CatalogConfig::default(),
    };
    let logging_active = init_logging_from(&config)?;

    let conn = open_catalog_db(&config)?;
    let catalog = SqliteCatalogRepository::try_new(&conn)?;
    let engine = MembershipEngine::from_config(SqliteMembershipStore::try_new(&conn)?, &config);

    println!("postercat_core version={}", core_version());
    println!("schema_version={}", current_user_version(&conn)?);
    println!("root_list_id={}", catalog.root_id()?);
    println!("gap_policy={:?}", engine.gap_policy());
    println!("logging={}", if logging_active { "on" } else { "off" });
    Ok(())
}
