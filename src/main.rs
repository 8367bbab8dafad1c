use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tkey_exchange::{ClientConfig, ExchangeRequest, ExchangeResult, TkeyClient, TkeyMode};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Negotiate a shared key with a nameserver using TKEY
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Nameserver host name or address
    #[arg(short, long)]
    server: String,

    /// Name of the key to negotiate
    #[arg(short, long)]
    key_name: String,

    /// TKEY algorithm name
    #[arg(short, long, default_value = "gss-tsig.")]
    algorithm: String,

    /// TKEY mode: server, dh, gss, resolver, delete or a number
    #[arg(short, long, default_value = "gss", value_parser = parse_mode)]
    mode: u16,

    /// Requested key lifetime in seconds
    #[arg(short, long, default_value = "3600")]
    lifetime: u32,

    /// Key exchange data as hex
    #[arg(long, conflicts_with = "key_base64")]
    key_hex: Option<String>,

    /// Key exchange data as base64
    #[arg(long)]
    key_base64: Option<String>,

    /// TSIG key name used to sign the query
    #[arg(long, requires_all = ["tsig_algorithm", "tsig_secret"])]
    tsig_name: Option<String>,

    /// TSIG algorithm, e.g. hmac-sha256
    #[arg(long)]
    tsig_algorithm: Option<String>,

    /// TSIG shared secret (base64)
    #[arg(long)]
    tsig_secret: Option<String>,

    /// Nameserver port
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect and read timeout (milliseconds)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// TOML file with client settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Mode names are mapped to their values; unknown numbers pass through so
/// the exchange itself can reject them.
fn parse_mode(value: &str) -> Result<u16, String> {
    if let Some(mode) = TkeyMode::from_name(value) {
        return Ok(mode.value());
    }
    value
        .parse::<u16>()
        .map_err(|_| format!("unknown TKEY mode '{}'", value))
}

fn client_config(args: &Args) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    layered_config(args, |name| std::env::var(name).ok())
}

/// Defaults, then the TOML file, then `TKEY_*` variables, then CLI flags.
fn layered_config(
    args: &Args,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    }
    .overlay_vars(env)?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ms) = args.timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
        config.read_timeout = Duration::from_millis(ms);
    }
    config.validate()?;
    Ok(config)
}

fn exchange_request(args: &Args) -> Result<ExchangeRequest, Box<dyn std::error::Error>> {
    let key_material = match (&args.key_hex, &args.key_base64) {
        (Some(hex_key), _) => hex::decode(hex_key.trim())?,
        (None, Some(b64)) => BASE64.decode(b64.trim())?,
        (None, None) => Vec::new(),
    };

    let mut request = ExchangeRequest::new(&args.server, &args.key_name, &args.algorithm, args.mode)
        .with_lifetime(args.lifetime)
        .with_key_material(key_material);
    request.tsig_key_name = args.tsig_name.clone();
    request.tsig_algorithm = args.tsig_algorithm.clone();
    request.tsig_secret = args.tsig_secret.clone();
    Ok(request)
}

fn print_text_result(result: &ExchangeResult) {
    let tkey = &result.tkey;
    println!("Key name:   {}", tkey.name);
    println!("Algorithm:  {}", tkey.algorithm);
    match TkeyMode::try_from(tkey.mode) {
        Ok(mode) => println!("Mode:       {}", mode),
        Err(value) => println!("Mode:       {}", value),
    }
    println!("Inception:  {}", tkey.inception);
    println!("Expiration: {}", tkey.expiration);
    println!("Key ({} bytes): {}", tkey.key_size, tkey.key);
    if tkey.other_size > 0 {
        println!("Other data ({} bytes): {}", tkey.other_size, tkey.other_data);
    }
    for record in &result.additional_records {
        println!("Additional: {}", record);
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = client_config(args)?;
    let request = exchange_request(args)?;

    let result = TkeyClient::new(config).exchange(&request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text_result(&result);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("TKEY exchange failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
