//! Testdrive Web
//!
//! Serves resolved test files to browsers and supervises server startup.

pub mod html;
pub mod inline;
pub mod resources;
pub mod server;
pub mod startup;

pub use html::HtmlWriter;
pub use inline::{FileScheme, InlineFileEmitter, InlinePolicy};
pub use resources::{DeliveryOutcome, MimeTable, ResourceDeliveryHandler};
pub use server::{HttpServerFactory, HttpTestServer, WebServer, WebServerConfig};
pub use startup::{HealthCheckPolicy, LifecycleState, ServerFactory, ServerStartup, TestServer};
