use carmine::config_handler::ConfigHandler;
use carmine::server;
use carmine::state_manager::ServerState;
use log::info;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let state = ServerState::new();
    let config_handler = ConfigHandler::new(state.clone());

    config_handler.load_config().await?;
    config_handler.configure_db().await?;

    let port = config_handler.effective_port().await;
    config_handler.configure_replication(port).await?;

    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("listening on port {}", port);

    server::run(listener, state).await;
    Ok(())
}
