//! # Reliquary Sample
//!
//! Catalogues a few books into a collection, attaches a scan, reorders the
//! shelf and withdraws a book, logging each step.
//!
//! - **[model]**: typed views ([`Book`], [`Collection`]) over stored resources
//! - **[clients]**: the domain API the demo drives
//! - **[lifecycle]**: assembles adapters and decorators from [`ReliquaryConfig`]
//!
//! ```bash
//! RUST_LOG=info cargo run
//! RUST_LOG=debug RELIQUARY_SEARCH_PAGE_SIZE=1 cargo run
//! ```

use reliquary::tracing::setup_tracing;
use reliquary::ReliquaryConfig;
use reliquary_sample::error::CatalogError;
use reliquary_sample::lifecycle::RepositorySystem;
use reliquary_sample::model::{Book, BookCreate, Collection};
use tracing::{error, info};

fn main() -> Result<(), CatalogError> {
    setup_tracing();

    let config = match ReliquaryConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid configuration, using defaults");
            ReliquaryConfig::default()
        }
    };
    let system = RepositorySystem::new(&config)?;
    let catalog = &system.catalog;

    let shelf = catalog.create_collection("Earthsea")?;
    let mut books = Vec::new();
    for (title, pages) in [
        ("A Wizard of Earthsea", 183),
        ("The Tombs of Atuan", 163),
        ("The Farthest Shore", 197),
    ] {
        let params = BookCreate {
            creators: vec!["Ursula K. Le Guin".to_string()],
            pages: Some(pages),
            ..BookCreate::new(title)
        };
        books.push(catalog.create_book(&params, Some(&shelf.id))?);
    }
    info!(books = catalog.count_books()?, "Catalogued");

    let scan = system
        .files
        .attach(&books[0].id, "cover.tiff", &mut "II*\0".as_bytes())?;
    info!(file_set = %scan.id, files = scan.file_ids.len(), "Attached scan");

    catalog.reorder(&shelf.id, &books[2].id, 0)?;
    log_shelf(&catalog.collection(&shelf.id)?, &catalog.books_in(&shelf.id)?);

    let current = catalog.book(&books[1].id)?;
    catalog.retitle(&current, "The Tombs of Atuan (1971)")?;
    if let Err(err) = catalog.retitle(&current, "A stale edit") {
        info!(error = %err, "Rejected edit from an outdated copy");
    }

    catalog.withdraw(&books[0].id)?;
    log_shelf(&catalog.collection(&shelf.id)?, &catalog.books_in(&shelf.id)?);

    info!("Sample completed");
    Ok(())
}

fn log_shelf(collection: &Collection, books: &[Book]) {
    let titles: Vec<&str> = books.iter().map(|book| book.title.as_str()).collect();
    info!(collection = %collection.title, ?titles, "Shelf order");
}
