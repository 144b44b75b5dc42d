use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use portal_otp_relay::config::{Config, ConfigLoader};
use portal_otp_relay::cookies::CookieProvisioner;
use portal_otp_relay::error::RelayError;
use portal_otp_relay::output::{JsonOutput, LoginReport};
use portal_otp_relay::pipeline::FetchPipeline;
use portal_otp_relay::relay::{OtpRelay, SmsQuery};
use portal_otp_relay::server::RelayServer;
use portal_otp_relay::session::PortalSession;
use portal_otp_relay::transport::HttpPortalTransport;

#[derive(Parser)]
#[command(name = "otp-relay")]
#[command(about = "Relay SMS/OTP records from the portal through a JSON endpoint")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./otp-relay.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Serve the query endpoint")]
    Serve(ServeArgs),
    #[command(about = "Run one query and print the JSON result")]
    Fetch(FetchArgs),
    #[command(about = "Check that the provisioned cookies still log in")]
    Login,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    listen: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    /// Numbers queried per range
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct FetchArgs {
    /// Start date, DD/MM/YYYY (defaults to today)
    #[arg(long)]
    date: Option<String>,

    /// End date, DD/MM/YYYY
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(relay) = report.downcast_ref::<RelayError>() {
            return ExitCode::from(map_exit_code(relay));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RelayError) -> u8 {
    match error {
        RelayError::ConfigRead(_)
        | RelayError::ConfigParse(_)
        | RelayError::CookiesNotFound(_)
        | RelayError::CookieParse { .. } => 2,
        RelayError::AuthenticationFailed(_)
        | RelayError::NotAuthenticated
        | RelayError::SessionExpired
        | RelayError::PortalHttp(_)
        | RelayError::PortalStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => run_serve(args, config),
        Commands::Fetch(args) => run_fetch(args, config),
        Commands::Login => run_login(config),
    }
}

fn build_relay(
    config: &Config,
    limit: Option<usize>,
) -> Result<OtpRelay<HttpPortalTransport>, RelayError> {
    let transport = HttpPortalTransport::new(&config.portal)?;
    let session = PortalSession::new(transport, CookieProvisioner::from_settings(&config.cookies));
    let pipeline = FetchPipeline::new(limit.or(config.relay.numbers_per_range))
        .with_budget(config.relay.budget());
    Ok(OtpRelay::new(session, pipeline))
}

fn run_serve(args: ServeArgs, config: Config) -> miette::Result<()> {
    let relay = build_relay(&config, args.limit)?;
    if !relay.login() {
        tracing::warn!("starting without a portal session; queries will retry login");
    }
    let listen = args.listen.unwrap_or_else(|| config.relay.listen.clone());
    let workers = args.workers.unwrap_or(config.relay.workers);
    RelayServer::bind(&listen, relay)?.serve(workers)?;
    Ok(())
}

fn run_fetch(args: FetchArgs, config: Config) -> miette::Result<()> {
    let relay = build_relay(&config, args.limit)?;
    let date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().format("%d/%m/%Y").to_string());
    let response = relay.sms(&SmsQuery {
        date: Some(date),
        to: args.to,
    });
    JsonOutput::print_response(&response).into_diagnostic()?;
    match response.status {
        200 => Ok(()),
        401 => Err(RelayError::NotAuthenticated.into()),
        status => Err(miette::Report::msg(format!("query failed with status {status}"))),
    }
}

fn run_login(config: Config) -> miette::Result<()> {
    let relay = build_relay(&config, None)?;
    let authenticated = relay.login();
    JsonOutput::print_login(&LoginReport {
        authenticated,
        cookies: relay.cookie_count(),
    })
    .into_diagnostic()?;
    if authenticated {
        Ok(())
    } else {
        Err(RelayError::AuthenticationFailed("see log output for the cause".to_string()).into())
    }
}
