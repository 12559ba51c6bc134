//! `testdrive serve`: resolve the configuration and serve it to browsers

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Args;
use testdrive_common::{DiskFileLoader, TestCaseStore};
use testdrive_web::{HttpServerFactory, ServerStartup, WebServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::ResolveArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Port to serve on
    #[arg(long, env = "TESTDRIVE_PORT", default_value_t = 4224)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Read every file into memory before the server starts
    #[arg(long)]
    pub preload_files: bool,

    /// Id the resolved files are registered under
    #[arg(long, default_value = "default")]
    pub case_id: String,
}

pub async fn execute(args: ServeArgs, config_path: &Path) -> anyhow::Result<()> {
    let flags = args.resolve.flags(Some(args.port), args.preload_files);
    let config = args.resolve.resolve(config_path, &flags)?;

    let case = config.to_test_case(args.case_id.clone());
    let store = Arc::new(TestCaseStore::new());
    store.add_case(case.clone());

    let web_cfg = WebServerConfig {
        doc_type: config.doc_type(),
        ..WebServerConfig::with_prefix(flags.handler_prefix.clone())
    };
    let factory = HttpServerFactory::new(args.host, web_cfg);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Received ctrl-c, shutting down");
        signal.cancel();
    });

    let mut startup = ServerStartup::new(
        args.port,
        store,
        flags.preload_files,
        Arc::new(DiskFileLoader),
        Arc::new(factory),
    )
    .with_cancellation(shutdown.clone());
    let mut server = startup.run(&[case]).await?;

    output::print_success(&format!(
        "Serving {} files on port {}",
        config.files_list().len() + config.tests().len(),
        server.port()
    ));
    output::print_info(&format!("Server: {}", config.server()));
    output::print_info(&format!("Capture: {}", config.capture_address()));
    if let Some(base) = server.base_url() {
        output::print_info(&format!("Runner: {}/runner/{}", base, args.case_id));
    }

    shutdown.cancelled().await;
    server.stop().await?;
    Ok(())
}
