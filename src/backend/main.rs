/**
 * PeerChat Server Entry Point
 *
 * Loads configuration, installs tracing and serves the realtime core until
 * Ctrl-C. On shutdown the broadcast router is closed so every connection's
 * writer task ends.
 */

#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use peerchat::backend::server::create_app;
    use peerchat::shared::config::ServerConfig;
    use tracing_subscriber::EnvFilter;

    dotenv::dotenv().ok();

    let config = ServerConfig::load()?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!("[Startup] Server initialization started");

    let addr = config.listen_addr();
    let (app, state) = create_app(config).await;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("[Startup] Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[Startup] Could not listen for Ctrl-C: {}", e);
            }
            tracing::info!("[Startup] Shutting down");
            state.router.shutdown();
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "ssr"))]
fn main() {
    eprintln!("Server requires the 'ssr' feature to be enabled.");
    eprintln!("Run with: cargo run --bin peerchat-server --features ssr");
    std::process::exit(1);
}
