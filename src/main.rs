use whois_rs::{Settings, WhoisClient};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::prelude::*;

const USAGE: &str = "Usage: whois-rs <resource> [host] [port]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Settings::load()?.into_config()?;
    let mut args = std::env::args().skip(1);
    let resource = args.next().ok_or(USAGE)?;
    let host = args.next();
    let port = args
        .next()
        .map(|p| p.parse::<i64>().map_err(|e| format!("Invalid port {p:?}: {e}")))
        .transpose()?;
    if args.next().is_some() {
        return Err(USAGE.into());
    }

    let client = WhoisClient::new(config);
    let response = match (host, port) {
        (Some(host), Some(port)) => client.query_host_port(&resource, &host, port),
        (Some(host), None) => client.query_host(&resource, &host),
        (None, _) => client.query(&resource),
    }
    .inspect_err(|e| error!("Query for {} failed: {}", resource, e))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
