//! deskstream server binary
//!
//! Run with: deskstream [BIND_ADDR]
//!
//! Examples:
//!   deskstream                    # binds to 0.0.0.0:8080
//!   deskstream localhost          # binds to 127.0.0.1:8080
//!   deskstream 0.0.0.0:9000      # binds to 0.0.0.0:9000
//!
//! Viewers negotiate through `POST /offer`; `GET /stats` and `GET /sessions`
//! expose diagnostics. Requires `ffmpeg` on PATH and, on unix, a reachable
//! X display.

use std::net::SocketAddr;

use deskstream::{RelayServer, ServerConfig};

/// Parse a bind address argument.
///
/// Accepts "localhost", a bare IP, or IP:PORT.
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "invalid bind address: '{}'. Expected IP, IP:PORT, or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: deskstream [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deskstream=info")),
        )
        .init();

    let bind_addr = match args.get(1) {
        Some(arg) => match parse_bind_addr(arg) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:8080".parse()?,
    };

    let config = ServerConfig::default().bind(bind_addr);
    let server = RelayServer::new(config);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_addr() {
        assert_eq!(
            parse_bind_addr("localhost").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_addr("0.0.0.0:9000").unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_bind_addr("not-an-addr").is_err());
    }
}
