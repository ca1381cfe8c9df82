//! Binary entrypoint for `flowctl`.

#[tokio::main]
async fn main() {
    std::process::exit(flowctl_cli::run().await);
}
