/// Entry point of the Creo Poller.
///
/// Configured through `CREO_POLLER_*` environment variables (see [`creo_poller::config`]),
/// logging through `RUST_LOG`.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info CREO_POLLER_INTERVAL_SECS=2 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_poller::run().await
}
