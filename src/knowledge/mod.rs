//! Knowledge acquisition services: multi-source smart search, source
//! health/quality curation, deep scraping, and the researcher's disk cache.

mod cache;
mod curator;
mod scraper;
mod smart_search;

pub use cache::DiskCache;
pub use curator::SourceCurator;
pub use scraper::{DeepScraper, ScrapedPage};
pub use smart_search::{QueryDeduplicator, SmartSearchService, SourceEntry, dedup_by_url};
