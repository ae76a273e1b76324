//! Infrastructure layer: rendering sessions, parsing, image download,
//! spreadsheet output and the ambient configuration/logging stack.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the infrastructure/ directory
//! - Public exports are defined here for convenience

pub mod auth;
pub mod chromium_session;
pub mod config; // Configuration file and defaults
pub mod identifier_source;
pub mod image_fetcher;
pub mod logging; // Logging infrastructure
pub mod page_readiness;
pub mod parsing;
pub mod render_session;
pub mod row_assembler;
pub mod sheet_writer;
pub mod simple_http_client;
pub mod url_normalizer;

// Re-export commonly used items
pub use auth::{AccountPageProbe, AuthState};
pub use chromium_session::ChromiumSession;
pub use config::{AppConfig, ConfigError, ConfigManager};
pub use identifier_source::load_identifier_list;
pub use image_fetcher::{ImageFetcher, ImageRejection, ImageSource};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use page_readiness::{PageReadinessController, ReadinessFailure, ReadyPage};
pub use render_session::{RenderSession, SessionError};
pub use row_assembler::{ColumnPlanUpdate, ColumnSpec, RowAssembler, SheetRow};
pub use sheet_writer::{SheetSink, SinkError, XlsxSheetWriter};
pub use simple_http_client::{HttpClient, HttpClientConfig};
